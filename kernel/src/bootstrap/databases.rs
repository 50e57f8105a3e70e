use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bootstrap::config::{Config, DbDriver};
use crate::bootstrap::directories::Directories;
use crate::bootstrap::error::KernelError;
use crate::infrastructure::db::{self, Database};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\-]{2,16}$").expect("valid regex"));

pub const DEFAULT_TAG: &str = "primary";

/// Tagged database pools, built on first use from the `databases` config block.
#[derive(Debug)]
pub struct Databases {
    config: Arc<Config>,
    dirs: Arc<Directories>,
    pools: Mutex<HashMap<String, Arc<Database>>>,
}

impl Databases {
    pub fn new(config: Arc<Config>, dirs: Arc<Directories>) -> Self {
        Self {
            config,
            dirs,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn primary(&self) -> Result<Arc<Database>, KernelError> {
        self.get(DEFAULT_TAG)
    }

    pub fn get(&self, tag: &str) -> Result<Arc<Database>, KernelError> {
        if !TAG_RE.is_match(tag) {
            return Err(KernelError::InvalidArgument("Invalid database tag".into()));
        }
        let tag = tag.to_lowercase();

        let mut pools = self.pools.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(db) = pools.get(&tag) {
            return Ok(db.clone());
        }

        let cfg = self.config.db(&tag).ok_or_else(|| {
            KernelError::Config(format!("Database with tag \"{tag}\" is not configured"))
        })?;
        let storage = match cfg.driver {
            DbDriver::Sqlite => Some(self.dirs.storage()?),
            _ => None,
        };
        let db = Arc::new(db::connect_lazy(&tag, cfg, storage)?);
        tracing::info!(tag = %tag, driver = cfg.driver.as_str(), host = %cfg.host, "database_pool_created");
        pools.insert(tag, db.clone());
        Ok(db)
    }

    /// Tags of the pools created so far.
    pub fn connected(&self) -> Vec<String> {
        let pools = self.pools.lock().unwrap_or_else(|p| p.into_inner());
        let mut tags: Vec<String> = pools.keys().cloned().collect();
        tags.sort();
        tags
    }
}
