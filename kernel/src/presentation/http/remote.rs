use std::net::SocketAddr;

use http::HeaderMap;
use serde::Serialize;

/// The client on the other end of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Remote {
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub origin: Option<String>,
    pub agent: Option<String>,
}

impl Remote {
    /// Resolves the client address from `CF-Connecting-IP`, then the first
    /// `X-Forwarded-For` hop, then the socket peer.
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut ip_address = header("cf-connecting-ip");
        if ip_address.is_none() {
            ip_address = header("x-forwarded-for")
                .and_then(|xff| xff.split(',').next().map(sanitize_ip))
                .filter(|ip| !ip.is_empty());
        }
        if ip_address.is_none() {
            ip_address = peer.map(|p| p.ip().to_string());
        }

        Self {
            ip_address,
            port: peer.map(|p| p.port()),
            origin: header("referer"),
            agent: header("user-agent"),
        }
    }
}

fn sanitize_ip(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| matches!(c, 'a'..='f' | '0'..='9' | '.' | ':'))
        .collect()
}
