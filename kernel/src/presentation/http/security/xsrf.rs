//! Session-bound XSRF tokens.
//!
//! The token lives in the `xsrf` bag of the session meta: its hex
//! `entropy`, the issuing `timestamp`, an optional `ttl` and, for
//! IP-sensitive tokens, the issuing `ip_addr`.

use chrono::Utc;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::domain::session::{Bag, Session};

const BAG: &str = "xsrf";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum XsrfError {
    #[error("XSRF token does not match; Possible CSRF/XSRF breach attempt")]
    TokenMismatch,
    #[error("XSRF token has expired; Try refreshing the page")]
    TokenExpired,
    #[error("XSRF token is IP sensitive; IP address \"{0}\" is not authorized")]
    TokenIpMismatch(String),
    #[error("XSRF token was not set in session")]
    TokenNotSet,
}

impl XsrfError {
    pub fn code(&self) -> u16 {
        match self {
            XsrfError::TokenMismatch => 0x0a,
            XsrfError::TokenExpired => 0x14,
            XsrfError::TokenIpMismatch(_) => 0x1e,
            XsrfError::TokenNotSet => 0x28,
        }
    }
}

pub struct Xsrf<'a> {
    session: &'a mut Session,
    remote_ip: Option<&'a str>,
}

impl<'a> Xsrf<'a> {
    pub fn new(session: &'a mut Session, remote_ip: Option<&'a str>) -> Self {
        Self { session, remote_ip }
    }

    fn bag(&self) -> Option<&Bag> {
        self.session.meta().bag(BAG)
    }

    /// The current token, if one was generated.
    pub fn token(&self) -> Option<String> {
        self.bag()?.get_str("entropy").map(str::to_string)
    }

    /// Issues a new token. `ttl` is only recorded when positive.
    pub fn generate(&mut self, ttl: Option<i64>, ip_sensitive: bool) -> String {
        let mut entropy = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut entropy);
        let token = hex::encode(entropy);

        let ip = self.remote_ip.map(str::to_string);
        let bag = self.session.meta_mut().bag_mut(BAG);
        bag.clear();
        bag.set("entropy", token.clone())
            .set("timestamp", Utc::now().timestamp());
        if let Some(ttl) = ttl.filter(|t| *t > 0) {
            bag.set("ttl", ttl);
        }
        if ip_sensitive {
            bag.set("ip_addr", ip);
        }
        token
    }

    pub fn verify(&self, token: &str) -> Result<(), XsrfError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Checks, in order: presence, value, age and bound IP address.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<(), XsrfError> {
        let bag = self.bag().ok_or(XsrfError::TokenNotSet)?;
        let entropy = bag
            .get_str("entropy")
            .filter(|e| !e.is_empty())
            .ok_or(XsrfError::TokenNotSet)?;

        let given = token.trim().to_lowercase();
        if !bool::from(entropy.as_bytes().ct_eq(given.as_bytes())) {
            return Err(XsrfError::TokenMismatch);
        }

        if let (Some(ttl), Some(issued)) = (bag.get_i64("ttl"), bag.get_i64("timestamp")) {
            if ttl > 0 && now - issued >= ttl {
                return Err(XsrfError::TokenExpired);
            }
        }

        if let Some(bound) = bag.get_str("ip_addr").filter(|ip| !ip.is_empty()) {
            let current = self.remote_ip.unwrap_or_default();
            if bound != current {
                return Err(XsrfError::TokenIpMismatch(current.to_string()));
            }
        }
        Ok(())
    }
}
