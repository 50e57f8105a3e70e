use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::node::{Node, type_name};
use super::site::DOMAIN_RE;
use crate::bootstrap::validator;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid regex"));
static LANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\-]+$").expect("valid regex"));
static COOKIE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[\w\-.]*)+$").expect("valid regex"));
static CIPHER_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w{2,16}$").expect("valid regex"));
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*([smhdw])$").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub cache: Option<CacheConfig>,
    pub sessions: Option<SessionsConfig>,
    pub http: Option<HttpConfig>,
    pub mailer: Option<MailerConfig>,
    pub cipher: Option<CipherConfig>,
    pub translator: Option<TranslatorConfig>,
}

impl ServicesConfig {
    pub(crate) fn from_node(node: Node<'_>) -> Result<Self, String> {
        Ok(Self {
            cache: node.node("cache").map(CacheConfig::from_node).transpose()?,
            sessions: node
                .node("sessions")
                .map(SessionsConfig::from_node)
                .transpose()?,
            http: node.node("http").map(HttpConfig::from_node).transpose()?,
            mailer: node.node("mailer").map(MailerConfig::from_node).transpose()?,
            cipher: node.node("cipher").map(CipherConfig::from_node).transpose()?,
            translator: node
                .node("translator")
                .map(TranslatorConfig::from_node)
                .transpose()?,
        })
    }

    pub fn cache(&self) -> Option<&CacheConfig> {
        self.cache.as_ref()
    }

    pub fn sessions(&self) -> Option<&SessionsConfig> {
        self.sessions.as_ref()
    }

    pub fn http(&self) -> Option<&HttpConfig> {
        self.http.as_ref()
    }

    pub fn mailer(&self) -> Option<&MailerConfig> {
        self.mailer.as_ref()
    }

    pub fn cipher(&self) -> Option<&CipherConfig> {
        self.cipher.as_ref()
    }

    pub fn translator(&self) -> Option<&TranslatorConfig> {
        self.translator.as_ref()
    }
}

// --- cache ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEngine {
    Redis,
    Memcached,
}

impl CacheEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEngine::Redis => "redis",
            CacheEngine::Memcached => "memcached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub engine: CacheEngine,
    pub host: String,
    pub port: u16,
    pub timeout: Option<u64>,
}

impl CacheConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let engine = match node.string("engine")?.to_lowercase().as_str() {
            "redis" => CacheEngine::Redis,
            "memcached" => CacheEngine::Memcached,
            _ => return Err("Invalid cache engine/store".into()),
        };
        let host = validator::is_valid_hostname(&node.string("host")?)
            .ok_or_else(|| "Cache hostname is invalid".to_string())?;
        let port = node.integer("port")?;
        if !(1024..=65535).contains(&port) {
            return Err("Port must be between 1024-65535".into());
        }
        let timeout = node.opt_integer("timeout")?;
        if let Some(t) = timeout {
            if !(1..=30).contains(&t) {
                return Err("Timeout value must be between 1-30 seconds".into());
            }
        }

        Ok(Self {
            engine,
            host,
            port: port as u16,
            timeout: timeout.map(|t| t as u64),
        })
    }
}

// --- sessions ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsConfig {
    pub cookie: Option<String>,
    /// Idle seconds after which a stored session can no longer be resumed.
    pub expire: Option<u64>,
}

impl SessionsConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let cookie = node.opt_string("cookie")?;
        if let Some(c) = &cookie {
            if !WORD_RE.is_match(c) {
                return Err("Invalid sessions cookie name".into());
            }
        }
        let expire = match node.get("expire") {
            None => None,
            Some(v) => {
                let secs = seconds(v, "expire")?;
                if !(60..=2_592_000).contains(&secs) {
                    return Err("Session expire value must be between 1m to 30d".into());
                }
                Some(secs as u64)
            }
        };
        Ok(Self { cookie, expire })
    }
}

// --- http ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub cookies: Option<HttpCookiesConfig>,
}

impl HttpConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        Ok(Self {
            cookies: node
                .node("cookies")
                .map(HttpCookiesConfig::from_node)
                .transpose()?,
        })
    }

    pub fn cookies(&self) -> Option<&HttpCookiesConfig> {
        self.cookies.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCookiesConfig {
    pub expire: u64,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl HttpCookiesConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let expire = match node.get("expire") {
            None => return Err("Missing value for prop \"expire\"".into()),
            Some(v) => seconds(v, "expire")?,
        };
        if !(3600..=2_592_000).contains(&expire) {
            return Err("Cookie expire value must be between 1h to 30d".into());
        }

        let path = node.string("path")?;
        if !COOKIE_PATH_RE.is_match(&path) {
            return Err("Invalid cookie path".into());
        }

        let domain = node.opt_string("domain")?.map(|d| d.to_lowercase());
        if let Some(d) = &domain {
            if !DOMAIN_RE.is_match(d) {
                return Err("Invalid cookie domain".into());
            }
        }

        Ok(Self {
            expire: expire as u64,
            path,
            domain,
            secure: node.boolean("secure")?,
            http_only: node.boolean("http_only")?,
        })
    }
}

/// Accepts plain seconds or a duration string such as `"12h"` or `"7d"`.
fn seconds(value: &Value, prop: &str) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("Value for prop \"{prop}\" must be of type integer")),
        Value::String(s) => {
            let caps = DURATION_RE
                .captures(s.trim())
                .ok_or_else(|| format!("Invalid duration for prop \"{prop}\""))?;
            let amount: i64 = caps[1]
                .parse()
                .map_err(|_| format!("Invalid duration for prop \"{prop}\""))?;
            let unit = match &caps[2] {
                "s" => 1,
                "m" => 60,
                "h" => 3600,
                "d" => 86_400,
                _ => 604_800,
            };
            Ok(amount.saturating_mul(unit))
        }
        other => Err(format!(
            "Value for prop \"{prop}\" must be of type integer, got {}",
            type_name(other)
        )),
    }
}

// --- mailer ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailerAgent {
    Sendmail,
    Smtp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailerConfig {
    pub agent: MailerAgent,
    pub sender_name: String,
    pub sender_email: String,
    pub smtp: Option<SmtpConfig>,
}

impl MailerConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let agent = node
            .opt_string("agent")
            .ok()
            .flatten()
            .filter(|a| a.chars().any(|c| c.is_alphanumeric() || c == '_'))
            .ok_or_else(|| "Invalid agent value for mailer service".to_string())?;
        let agent = match agent.to_lowercase().as_str() {
            "sendmail" => MailerAgent::Sendmail,
            "smtp" => MailerAgent::Smtp,
            _ => return Err("No such mailer agent is supported".into()),
        };

        let sender = node
            .node("sender")
            .ok_or_else(|| "Mailer sender is not configured".to_string())?;
        let sender_name = sender
            .opt_string("name")
            .ok()
            .flatten()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| "Mailer sender name is invalid".to_string())?;
        let sender_email = sender
            .opt_string("email")
            .ok()
            .flatten()
            .map(|e| e.trim().to_string())
            .filter(|e| validator::is_valid_email(e))
            .ok_or_else(|| "Invalid mailer sender e-mail address".to_string())?;

        Ok(Self {
            agent,
            sender_name,
            sender_email,
            smtp: node.node("smtp").map(SmtpConfig::from_node).transpose()?,
        })
    }

    pub fn smtp(&self) -> Option<&SmtpConfig> {
        self.smtp.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpAuth {
    Plain,
    Login,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub tls: bool,
    pub auth: Option<SmtpAuth>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_name: Option<String>,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("tls", &self.tls)
            .field("auth", &self.auth)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl SmtpConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let host = validator::is_valid_hostname(&node.string("host")?)
            .ok_or_else(|| "Mailer SMTP hostname is invalid".to_string())?;
        let port = node.integer("port")?;
        if !(1..=65535).contains(&port) {
            return Err("SMTP port is out of range".into());
        }
        let timeout = node.integer("timeout")?;
        if !(1..=30).contains(&timeout) {
            return Err("SMTP timeout value is out of range".into());
        }
        let auth = match node.opt_string("auth")?.map(|a| a.to_lowercase()).as_deref() {
            None => None,
            Some("plain") => Some(SmtpAuth::Plain),
            Some("login") => Some(SmtpAuth::Login),
            Some(_) => return Err("Invalid SMTP auth mechanism".into()),
        };
        let username = node.opt_string("username")?;
        if username.as_ref().is_some_and(|u| !(3..=64).contains(&u.len())) {
            return Err("SMTP username length error".into());
        }
        let password = node.opt_string("password")?;
        if password.as_ref().is_some_and(|p| !(3..=64).contains(&p.len())) {
            return Err("SMTP password length error".into());
        }
        let server_name = node.opt_string("server_name")?.map(|s| s.to_lowercase());
        if server_name.as_ref().is_some_and(|s| !DOMAIN_RE.is_match(s)) {
            return Err("Invalid SMTP server name".into());
        }

        Ok(Self {
            host,
            port: port as u16,
            timeout: timeout as u64,
            tls: node.boolean("tls")?,
            auth,
            username,
            password,
            server_name,
        })
    }
}

// --- cipher ---

/// Labelled 256-bit key material. 64 hex characters are used verbatim,
/// any other string is hashed with SHA-256.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    keys: BTreeMap<String, String>,
}

impl std::fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CipherConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let mut keys = BTreeMap::new();
        let Some(entries) = node.node("keys") else {
            return Ok(Self { keys });
        };
        for (pos, (label, entropy)) in entries.entries().enumerate() {
            if !CIPHER_LABEL_RE.is_match(label) {
                return Err(format!(
                    "Invalid label for cipher key at position # {}",
                    pos + 1
                ));
            }
            let Value::String(entropy) = entropy else {
                return Err(format!(
                    "Cipher key for \"{label}\" must be of type string, got \"{}\"",
                    type_name(entropy)
                ));
            };
            let is_hex = entropy.len() == 64 && entropy.chars().all(|c| c.is_ascii_hexdigit());
            let hexits = if is_hex {
                entropy.to_lowercase()
            } else {
                hex::encode(Sha256::digest(entropy.as_bytes()))
            };
            keys.insert(label.to_lowercase(), hexits);
        }
        Ok(Self { keys })
    }

    pub fn get(&self, label: &str) -> Option<[u8; 32]> {
        let hexits = self.keys.get(&label.to_lowercase())?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(hexits, &mut out).ok()?;
        Some(out)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

// --- translator ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub cookie: Option<String>,
    pub fallback: Option<String>,
    pub caching: bool,
}

impl TranslatorConfig {
    fn from_node(node: Node<'_>) -> Result<Self, String> {
        let cookie = node.opt_string("cookie")?;
        if cookie.as_ref().is_some_and(|c| !WORD_RE.is_match(c)) {
            return Err("Invalid translator cookie name".into());
        }
        let fallback = node.opt_string("fallback")?;
        if fallback.as_ref().is_some_and(|f| !LANG_RE.is_match(f)) {
            return Err("Invalid translator fallback language".into());
        }
        Ok(Self {
            cookie,
            fallback,
            caching: node.flag("caching")?,
        })
    }
}
