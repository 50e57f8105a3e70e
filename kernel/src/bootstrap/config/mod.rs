//! Per-environment application configuration.
//!
//! `<config>/env/<env>.yml` is read through the `config` crate, layered with
//! `APP__SECTION__KEY` environment overrides, and then validated into typed
//! blocks. A validated [`Config`] can be cached as base64-encoded JSON in the
//! cache directory so later boots skip YAML parsing.

mod database;
mod node;
mod services;
mod site;

pub use database::{DbConfig, DbDriver};
pub use services::{
    CacheConfig, CacheEngine, CipherConfig, HttpConfig, HttpCookiesConfig, MailerAgent,
    MailerConfig, ServicesConfig, SessionsConfig, SmtpAuth, SmtpConfig, TranslatorConfig,
};
pub use site::SiteConfig;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::application::error_handler::{ErrorHandler, ErrorLevel};
use crate::bootstrap::directories::Directories;
use crate::bootstrap::error::KernelError;
use database::DB_TAG_RE;
use node::Node;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    env: String,
    time_zone: String,
    site: SiteConfig,
    databases: BTreeMap<String, DbConfig>,
    services: ServicesConfig,
}

impl Config {
    /// Reads and validates `<config>/env/<env>.yml`.
    pub fn load(dirs: &Directories, env: &str, errors: &ErrorHandler) -> Result<Self, KernelError> {
        let path = dirs.config()?.join("env").join(format!("{env}.yml"));
        let raw = read_yaml_with_env(&path).map_err(|e| {
            if errors.dev() {
                errors.error_to_warning("YamlException", &e);
            }
            KernelError::Config("Failed to parse app YAML configuration files".into())
        })?;
        debug!(path = %path.display(), "config_file_parsed");
        Self::from_value(env, &raw)
    }

    /// Validates an already parsed configuration tree.
    pub fn from_value(env: &str, raw: &Value) -> Result<Self, KernelError> {
        let root = Node::from_value(raw).ok_or_else(|| {
            KernelError::Config("Failed to parse app YAML configuration files".into())
        })?;

        let time_zone = match root.get("time_zone") {
            Some(Value::String(tz)) if !tz.is_empty() => tz.clone(),
            _ => return Err(KernelError::Config("Invalid configuration time zone".into())),
        };

        let site = root
            .node("site")
            .ok_or_else(|| KernelError::Config("Configuration node \"site\" not found".into()))?;
        let site = SiteConfig::from_node(site).map_err(KernelError::Config)?;

        let mut databases = BTreeMap::new();
        if let Some(blocks) = root.node("databases") {
            for (pos, (tag, block)) in blocks.entries().enumerate() {
                if !DB_TAG_RE.is_match(tag) {
                    return Err(KernelError::Config(format!(
                        "Invalid database block prop/tag at pos {}",
                        pos + 1
                    )));
                }
                let tag = tag.to_lowercase();
                let block = Node::from_value(block).ok_or_else(|| {
                    KernelError::Config(format!("Database \"{tag}\" block is invalid"))
                })?;
                let db = DbConfig::from_node(block)
                    .map_err(|e| KernelError::Config(format!("[Database:[{tag}]] {e}")))?;
                databases.insert(tag, db);
            }
        }

        let services = match root.node("services") {
            Some(node) => ServicesConfig::from_node(node).map_err(KernelError::Config)?,
            None => ServicesConfig::default(),
        };

        Ok(Self {
            env: env.to_string(),
            time_zone,
            site,
            databases,
            services,
        })
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn db(&self, tag: &str) -> Option<&DbConfig> {
        self.databases.get(&tag.to_lowercase())
    }

    pub fn databases(&self) -> impl Iterator<Item = (&str, &DbConfig)> {
        self.databases.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn services(&self) -> &ServicesConfig {
        &self.services
    }

    pub fn cache_file_name(env: &str) -> String {
        format!("bootstrap.config.env_{env}.json.cache")
    }

    /// Reads a previously cached configuration. A missing file yields `None`
    /// silently; any other problem is reported as a warning and also yields
    /// `None` so the caller falls back to parsing YAML.
    pub fn read_cached(dirs: &Directories, env: &str, errors: &ErrorHandler) -> Option<Self> {
        let file_name = Self::cache_file_name(env);
        let dir = match dirs.cache() {
            Ok(dir) => dir,
            Err(e) => {
                errors.trigger(e.to_string(), ErrorLevel::Warning);
                return None;
            }
        };

        let encoded = match std::fs::read_to_string(dir.join(&file_name)) {
            Ok(encoded) => encoded,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                errors.trigger(
                    format!(
                        "Cached configuration file \"{file_name}\" is not readable in cache directory"
                    ),
                    ErrorLevel::Warning,
                );
                return None;
            }
            Err(e) => {
                errors.trigger_if_debug(e.to_string(), ErrorLevel::Warning);
                errors.trigger(
                    "An error occurred while reading cached configuration",
                    ErrorLevel::Warning,
                );
                return None;
            }
        };

        let decoded = B64
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Config>(&bytes).ok())
            .filter(|cfg| cfg.env == env);
        match decoded {
            Some(cfg) => {
                info!(env = %env, "config_loaded_from_cache");
                Some(cfg)
            }
            None => {
                errors.trigger("Failed to unserialize cached config", ErrorLevel::Warning);
                None
            }
        }
    }

    /// Writes this configuration into the cache directory. Failures are
    /// recorded as warnings.
    pub fn write_cache(&self, dirs: &Directories, errors: &ErrorHandler) {
        let dir = match dirs.cache() {
            Ok(dir) => dir,
            Err(_) => {
                errors.trigger(
                    "Cache directory is not writable; Cannot cache configuration",
                    ErrorLevel::Warning,
                );
                return;
            }
        };

        let encoded = match serde_json::to_vec(self) {
            Ok(json) => B64.encode(json),
            Err(e) => {
                errors.trigger_if_debug(e.to_string(), ErrorLevel::Warning);
                errors.trigger("Failed to write cached configuration file", ErrorLevel::Warning);
                return;
            }
        };

        match std::fs::write(dir.join(Self::cache_file_name(&self.env)), encoded) {
            Ok(()) => debug!(env = %self.env, "config_cache_written"),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => errors.trigger(
                "Cache directory is not writable; Cannot cache configuration",
                ErrorLevel::Warning,
            ),
            Err(e) => {
                errors.trigger_if_debug(e.to_string(), ErrorLevel::Warning);
                errors.trigger("Failed to write cached configuration file", ErrorLevel::Warning);
            }
        }
    }
}

/// Parses one YAML file into a JSON tree.
pub fn read_yaml(path: &Path) -> Result<Value, config::ConfigError> {
    config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml).required(true))
        .build()?
        .try_deserialize::<Value>()
}

/// Like [`read_yaml`], layered with `APP__SECTION__KEY` environment overrides.
pub fn read_yaml_with_env(path: &Path) -> Result<Value, config::ConfigError> {
    config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml).required(true))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<Value>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::directories::DirectoryLayout;
    use serde_json::json;
    use tempfile::TempDir;

    fn base() -> Value {
        json!({
            "timeZone": "Europe/London",
            "site": {"title": "Test Site", "domain": "www.example.com", "https": true},
        })
    }

    fn err(v: Value) -> String {
        Config::from_value("test", &v).unwrap_err().to_string()
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = Config::from_value("test", &base()).unwrap();
        assert_eq!(cfg.time_zone(), "Europe/London");
        assert_eq!(cfg.site().url, "https://example.com/");
        assert!(cfg.services().cache().is_none());
        assert!(cfg.db("primary").is_none());
    }

    #[test]
    fn root_level_errors() {
        assert_eq!(
            err(json!({"site": base()["site"].clone()})),
            "Invalid configuration time zone"
        );
        assert_eq!(
            err(json!({"time_zone": "", "site": {}})),
            "Invalid configuration time zone"
        );
        assert_eq!(
            err(json!({"time_zone": "UTC"})),
            "Configuration node \"site\" not found"
        );
    }

    #[test]
    fn database_blocks() {
        let mut v = base();
        v["databases"] = json!({
            "Primary": {"driver": "mysql", "host": "localhost", "name": "app"},
        });
        let cfg = Config::from_value("test", &v).unwrap();
        assert_eq!(cfg.db("PRIMARY").unwrap().driver, DbDriver::Mysql);

        v["databases"] = json!({"a": {"driver": "mysql", "host": "h", "name": "x"}});
        assert_eq!(err(v.clone()), "Invalid database block prop/tag at pos 1");

        v["databases"] = json!({"logs": "nope"});
        assert_eq!(err(v.clone()), "Database \"logs\" block is invalid");

        v["databases"] = json!({"logs": {"driver": "oracle", "host": "h", "name": "x"}});
        assert_eq!(
            err(v),
            "[Database:[logs]] Database driver is invalid or not supported"
        );
    }

    fn project() -> (TempDir, Directories, ErrorHandler) {
        let tmp = TempDir::new().unwrap();
        for d in ["config/env", "cache"] {
            std::fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        let errors = ErrorHandler::new(true, tmp.path());
        let dirs = Directories::new(
            tmp.path().to_path_buf(),
            DirectoryLayout::default(),
            errors.clone(),
        );
        (tmp, dirs, errors)
    }

    #[test]
    fn loads_yaml_file() {
        let (tmp, dirs, errors) = project();
        std::fs::write(
            tmp.path().join("config/env/web.yml"),
            "time_zone: UTC\nsite:\n  title: Yaml Site\n  domain: yaml.test\n  https: false\n",
        )
        .unwrap();
        let cfg = Config::load(&dirs, "web", &errors).unwrap();
        assert_eq!(cfg.env(), "web");
        assert_eq!(cfg.site().url, "http://yaml.test/");
    }

    #[test]
    fn missing_yaml_is_a_config_error() {
        let (_tmp, dirs, errors) = project();
        let e = Config::load(&dirs, "absent", &errors).unwrap_err();
        assert_eq!(e.to_string(), "Failed to parse app YAML configuration files");
        assert_eq!(errors.errors().triggered().len(), 1);
    }

    #[test]
    fn cache_round_trip_and_corruption() {
        let (tmp, dirs, errors) = project();
        assert!(Config::read_cached(&dirs, "test", &errors).is_none());
        assert!(errors.errors().is_empty());

        let cfg = Config::from_value("test", &base()).unwrap();
        cfg.write_cache(&dirs, &errors);
        assert_eq!(Config::read_cached(&dirs, "test", &errors), Some(cfg));

        std::fs::write(
            tmp.path().join("cache").join(Config::cache_file_name("test")),
            "not base64!",
        )
        .unwrap();
        assert!(Config::read_cached(&dirs, "test", &errors).is_none());
        assert_eq!(errors.errors().triggered().len(), 1);
    }
}
