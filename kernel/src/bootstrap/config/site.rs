use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::node::Node;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\-@!~]+(\s+[\w.\-@!~]+)*$").expect("valid regex"));
pub(crate) static DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9\-]+(\.[a-z0-9\-]+)*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub title: String,
    pub domain: String,
    pub https: bool,
    pub url: String,
}

impl SiteConfig {
    pub(crate) fn from_node(node: Node<'_>) -> Result<Self, String> {
        let title = node.string("title")?;
        if !TITLE_RE.is_match(&title) {
            return Err("Invalid site title".into());
        }

        let domain = node.string("domain")?.to_lowercase();
        let domain = domain
            .strip_prefix("www.")
            .map(str::to_string)
            .unwrap_or(domain);
        if !DOMAIN_RE.is_match(&domain) {
            return Err("Invalid site domain".into());
        }

        let https = node.boolean("https")?;
        let url = format!("{}://{}/", if https { "https" } else { "http" }, domain);

        Ok(Self {
            title,
            domain,
            https,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Result<SiteConfig, String> {
        SiteConfig::from_node(Node::from_value(&v).unwrap())
    }

    #[test]
    fn strips_www_and_builds_url() {
        let site = parse(json!({"title": "My Site", "domain": "WWW.Example.com", "https": true})).unwrap();
        assert_eq!(site.domain, "example.com");
        assert_eq!(site.url, "https://example.com/");

        let site = parse(json!({"title": "x", "domain": "local.test", "https": false})).unwrap();
        assert_eq!(site.url, "http://local.test/");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(json!({"title": "bad  <title>", "domain": "a.com", "https": true})).is_err());
        assert!(parse(json!({"title": "ok", "domain": "bad domain", "https": true})).is_err());
        assert!(parse(json!({"title": "ok", "domain": "a.com", "https": "yes"})).is_err());
    }
}
