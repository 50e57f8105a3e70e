use std::net::{IpAddr, Ipv4Addr};

use once_cell::sync::Lazy;
use regex::Regex;

static WEB_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z0-9\-]+\.)?[a-z0-9\-]+(\.[a-z]{2,8})?\.[a-z]{2,8}$").expect("valid regex")
});
static HOSTNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9\-]+(\.[a-z0-9\-]+)*$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

pub fn is_valid_web_domain(domain: &str) -> bool {
    WEB_DOMAIN_RE.is_match(domain)
}

/// Returns the normalised hostname (lowercased domain or canonical IP) when valid.
pub fn is_valid_hostname(hostname: &str) -> Option<String> {
    if hostname.is_empty() {
        return None;
    }
    let hostname = hostname.to_lowercase();
    if HOSTNAME_RE.is_match(&hostname) {
        return Some(hostname);
    }
    hostname.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}

pub fn is_valid_ip(ip: &str, allow_v6: bool) -> bool {
    if allow_v6 {
        ip.parse::<IpAddr>().is_ok()
    } else {
        ip.parse::<Ipv4Addr>().is_ok()
    }
}

pub fn is_valid_timestamp(ts: i64) -> bool {
    ts > 0x3B9A_CA00
}

/// Word characters and whitespace, plus any character listed in `allow`.
pub fn is_ascii(value: &str, allow: Option<&str>) -> bool {
    let allow = allow.unwrap_or("");
    value.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '_' || c.is_ascii_whitespace() || allow.contains(c)
    })
}

/// True when the value carries multi-byte characters.
pub fn is_utf8(value: &str) -> bool {
    value.len() != value.chars().count()
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_are_normalised() {
        assert_eq!(is_valid_hostname("DB.Example.com").as_deref(), Some("db.example.com"));
        assert_eq!(is_valid_hostname("127.0.0.1").as_deref(), Some("127.0.0.1"));
        assert_eq!(is_valid_hostname("::1").as_deref(), Some("::1"));
        assert!(is_valid_hostname("bad host").is_none());
        assert!(is_valid_hostname("").is_none());
    }

    #[test]
    fn ip_versions() {
        assert!(is_valid_ip("10.0.0.1", false));
        assert!(!is_valid_ip("fe80::1", false));
        assert!(is_valid_ip("fe80::1", true));
    }

    #[test]
    fn misc_checks() {
        assert!(is_valid_web_domain("example.com"));
        assert!(is_valid_web_domain("www.example.co.uk"));
        assert!(!is_valid_web_domain("localhost"));
        assert!(is_valid_timestamp(1_600_000_000));
        assert!(!is_valid_timestamp(1000));
        assert!(is_ascii("hello world_1", None));
        assert!(!is_ascii("hello-world", None));
        assert!(is_ascii("hello-world", Some("-")));
        assert!(is_utf8("héllo"));
        assert!(!is_utf8("hello"));
        assert!(is_valid_email("admin@example.com"));
        assert!(!is_valid_email("admin@"));
    }
}
