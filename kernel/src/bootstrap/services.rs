use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::application::ports::cache::Cache;
use crate::application::ports::session_store::SessionStore;
use crate::bootstrap::config::{CacheEngine, Config};
use crate::bootstrap::directories::Directories;
use crate::bootstrap::error::KernelError;
use crate::infrastructure::cache::RedisCache;
use crate::infrastructure::mailer::Mailer;
use crate::infrastructure::sessions::FsSessionStore;
use crate::infrastructure::translator::Translator;

const DEFAULT_CACHE_TIMEOUT: u64 = 1;

/// Lazily built service adapters configured under `services`.
pub struct Services {
    config: Arc<Config>,
    dirs: Arc<Directories>,
    cache: tokio::sync::OnceCell<Arc<dyn Cache>>,
    sessions: OnceCell<Arc<dyn SessionStore>>,
    mailer: OnceCell<Arc<Mailer>>,
    translator: OnceCell<Arc<Translator>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("cache", &self.cache.initialized())
            .field("sessions", &self.sessions.get().is_some())
            .field("mailer", &self.mailer.get().is_some())
            .field("translator", &self.translator.get().is_some())
            .finish()
    }
}

impl Services {
    pub fn new(config: Arc<Config>, dirs: Arc<Directories>) -> Self {
        Self {
            config,
            dirs,
            cache: tokio::sync::OnceCell::new(),
            sessions: OnceCell::new(),
            mailer: OnceCell::new(),
            translator: OnceCell::new(),
        }
    }

    pub async fn cache(&self) -> Result<Arc<dyn Cache>, KernelError> {
        self.cache
            .get_or_try_init(|| self.connect_cache())
            .await
            .cloned()
    }

    async fn connect_cache(&self) -> Result<Arc<dyn Cache>, KernelError> {
        let cfg = self.config.services().cache().ok_or_else(|| {
            KernelError::ServiceNotConfigured("Cache service is not configured".into())
        })?;
        match cfg.engine {
            CacheEngine::Redis => {
                let timeout = Duration::from_secs(cfg.timeout.unwrap_or(DEFAULT_CACHE_TIMEOUT));
                let cache = RedisCache::connect(&cfg.host, cfg.port, timeout)
                    .await
                    .map_err(KernelError::Cache)?;
                Ok(Arc::new(cache))
            }
            CacheEngine::Memcached => Err(KernelError::ServiceNotConfigured(format!(
                "Cache engine \"{}\" is not available",
                cfg.engine.as_str()
            ))),
        }
    }

    pub fn sessions(&self) -> Result<Arc<dyn SessionStore>, KernelError> {
        let cfg = self.config.services().sessions().ok_or_else(|| {
            KernelError::ServiceNotConfigured("Sessions service is not configured".into())
        })?;
        self.sessions
            .get_or_try_init(|| {
                let dir = self.dirs.sessions()?;
                Ok::<_, KernelError>(Arc::new(FsSessionStore::new(dir, cfg.expire)) as Arc<dyn SessionStore>)
            })
            .cloned()
    }

    pub fn mailer(&self) -> Result<Arc<Mailer>, KernelError> {
        self.mailer
            .get_or_try_init(|| {
                let cfg = self.config.services().mailer().ok_or_else(|| {
                    KernelError::ServiceNotConfigured("Mailer service is not configured".into())
                })?;
                Mailer::from_config(cfg).map(Arc::new)
            })
            .cloned()
    }

    pub fn translator(&self) -> Result<Arc<Translator>, KernelError> {
        self.translator
            .get_or_try_init(|| {
                let cfg = self.config.services().translator().ok_or_else(|| {
                    KernelError::ServiceNotConfigured("Translator service is not configured".into())
                })?;
                let mut translator = Translator::new(self.dirs.langs()?);
                if cfg.caching {
                    translator = translator.caching(self.dirs.cache()?);
                }
                if let Some(fallback) = &cfg.fallback {
                    translator = translator.fallback(fallback)?;
                }
                if let Some(cookie) = &cfg.cookie {
                    translator = translator.cookie(cookie.clone());
                }
                Ok(Arc::new(translator))
            })
            .cloned()
    }
}
