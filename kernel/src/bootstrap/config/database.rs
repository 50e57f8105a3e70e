use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::node::Node;
use crate::bootstrap::validator;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid regex"));
pub(crate) static DB_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-]{2,16}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbDriver {
    Mysql,
    Pgsql,
    Sqlite,
}

impl DbDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbDriver::Mysql => "mysql",
            DbDriver::Pgsql => "pgsql",
            DbDriver::Sqlite => "sqlite",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub driver: DbDriver,
    pub host: String,
    pub port: Option<u16>,
    pub name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DbConfig {
    pub(crate) fn from_node(node: Node<'_>) -> Result<Self, String> {
        let driver = match node.string("driver")?.to_lowercase().as_str() {
            "mysql" => DbDriver::Mysql,
            "pgsql" => DbDriver::Pgsql,
            "sqlite" => DbDriver::Sqlite,
            _ => return Err("Database driver is invalid or not supported".into()),
        };

        let host = validator::is_valid_hostname(&node.string("host")?)
            .ok_or_else(|| "Database hostname is invalid".to_string())?;

        let port = match node.opt_integer("port")? {
            None => None,
            Some(p) => Some(
                u16::try_from(p)
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| "Database port is out of range".to_string())?,
            ),
        };

        let name = node.string("name")?;
        if !WORD_RE.is_match(&name) {
            return Err("Invalid database name".into());
        }

        let username = node.opt_string("username")?;
        if let Some(u) = &username {
            if !WORD_RE.is_match(u) {
                return Err("Invalid database username".into());
            }
        }

        let password = node.opt_string("password")?;
        if let Some(p) = &password {
            if !(6..=64).contains(&p.len()) {
                return Err("Database password must be NULL or between 6-64 bytes".into());
            }
        }

        Ok(Self {
            driver,
            host,
            port,
            name,
            username,
            password,
        })
    }
}
