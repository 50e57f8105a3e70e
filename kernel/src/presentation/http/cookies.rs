use http::HeaderMap;
use http::header::COOKIE;

use crate::bootstrap::config::HttpCookiesConfig;

pub const DEFAULT_EXPIRE: u64 = 604_800;

/// Attributes applied to every cookie the kernel sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookies {
    expire: u64,
    path: String,
    domain: String,
    secure: bool,
    http_only: bool,
}

impl Default for Cookies {
    fn default() -> Self {
        Self {
            expire: DEFAULT_EXPIRE,
            path: "/".into(),
            domain: String::new(),
            secure: true,
            http_only: true,
        }
    }
}

impl Cookies {
    /// Applies the configured attributes; the domain defaults to `.<site domain>`.
    pub fn from_config(cfg: &HttpCookiesConfig, site_domain: &str) -> Self {
        Self {
            expire: cfg.expire,
            path: cfg.path.clone(),
            domain: cfg
                .domain
                .clone()
                .unwrap_or_else(|| format!(".{site_domain}")),
            secure: cfg.secure,
            http_only: cfg.http_only,
        }
    }

    /// Default attributes scoped to `.<site domain>`, secure on HTTPS sites.
    pub fn for_site(site_domain: &str, https: bool) -> Self {
        Self::default()
            .domain(format!(".{site_domain}"))
            .secure(https)
    }

    pub fn expire(mut self, seconds: u64) -> Self {
        self.expire = seconds;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn secure(mut self, https: bool) -> Self {
        self.secure = https;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Builds a `Set-Cookie` header value.
    pub fn set(&self, name: &str, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}",
            name,
            urlencoding::encode(value),
            self.path,
            self.expire
        );
        if !self.domain.is_empty() {
            cookie.push_str("; Domain=");
            cookie.push_str(&self.domain);
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie.push_str("; SameSite=Lax");
        cookie
    }

    /// `Set-Cookie` value that removes `name`.
    pub fn clear(&self, name: &str) -> String {
        self.clone().expire(0).set(name, "")
    }

    /// Reads a request cookie.
    pub fn get(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(|h| get_cookie(h, name))
    }
}

fn get_cookie(cookie_header: &str, name: &str) -> Option<String> {
    for part in cookie_header.split(';') {
        let kv = part.trim();
        if let Some((k, v)) = kv.split_once('=') {
            if k.trim() == name {
                let v = v.trim();
                return Some(
                    urlencoding::decode(v)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| v.to_string()),
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn builds_set_cookie() {
        let cfg = HttpCookiesConfig {
            expire: 3600,
            path: "/app".into(),
            domain: None,
            secure: false,
            http_only: true,
        };
        let cookies = Cookies::from_config(&cfg, "example.com");
        assert_eq!(
            cookies.set("SID", "a b"),
            "SID=a%20b; Path=/app; Max-Age=3600; Domain=.example.com; HttpOnly; SameSite=Lax"
        );
        assert!(cookies.clear("SID").contains("Max-Age=0"));
    }

    #[test]
    fn defaults() {
        let c = Cookies::default();
        assert_eq!(c.set("x", "1"), "x=1; Path=/; Max-Age=604800; Secure; HttpOnly; SameSite=Lax");
    }

    #[test]
    fn site_defaults_carry_the_domain() {
        let c = Cookies::for_site("example.com", false);
        assert_eq!(
            c.set("x", "1"),
            "x=1; Path=/; Max-Age=604800; Domain=.example.com; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn reads_request_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("lang=en; SID=abc%2B1"));
        assert_eq!(Cookies::get(&headers, "SID").as_deref(), Some("abc+1"));
        assert_eq!(Cookies::get(&headers, "lang").as_deref(), Some("en"));
        assert_eq!(Cookies::get(&headers, "none"), None);
    }
}
