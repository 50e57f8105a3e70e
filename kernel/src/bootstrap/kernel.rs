use std::sync::Arc;

use chrono_tz::Tz;
use once_cell::sync::OnceCell;
use serde_json::json;
use tracing::{info, warn};

use crate::application::error_handler::ErrorHandler;
use crate::application::events::{Events, KERNEL_BOOTSTRAPPED};
use crate::application::memory::Memory;
use crate::application::ports::cache::Cache;
use crate::bootstrap::bootstrapper::Bootstrapper;
use crate::bootstrap::cipher_keys::CipherKeys;
use crate::bootstrap::config::Config;
use crate::bootstrap::databases::Databases;
use crate::bootstrap::directories::Directories;
use crate::bootstrap::error::KernelError;
use crate::bootstrap::services::Services;
use crate::domain::session::Session;
use crate::infrastructure::mailer::Mailer;
use crate::presentation::http::Http;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entries kept per list in the process-level error log.
pub const KERNEL_LOG_LIMIT: usize = 100;

static INSTANCE: OnceCell<Arc<AppKernel>> = OnceCell::new();

/// Process-level state: configuration, directories and service locators.
pub struct AppKernel {
    name: String,
    dev: bool,
    time_zone: Tz,
    config: Arc<Config>,
    dirs: Arc<Directories>,
    errors: ErrorHandler,
    events: Events,
    databases: Databases,
    cipher_keys: CipherKeys,
    services: Services,
    http: OnceCell<Http>,
    memory_cache: tokio::sync::OnceCell<Option<Arc<dyn Cache>>>,
}

impl std::fmt::Debug for AppKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKernel")
            .field("name", &self.name)
            .field("env", &self.config.env())
            .field("dev", &self.dev)
            .field("time_zone", &self.time_zone)
            .finish_non_exhaustive()
    }
}

impl AppKernel {
    /// Builds the kernel and installs it as the process instance.
    pub fn bootstrap(bs: Bootstrapper) -> Result<Arc<Self>, KernelError> {
        if INSTANCE.get().is_some() {
            return Err(KernelError::AlreadyBootstrapped);
        }
        let kernel = Self::build(bs)?;
        INSTANCE
            .set(kernel.clone())
            .map_err(|_| KernelError::AlreadyBootstrapped)?;
        Ok(kernel)
    }

    pub fn instance() -> Result<Arc<Self>, KernelError> {
        INSTANCE.get().cloned().ok_or(KernelError::NotBootstrapped)
    }

    pub fn is_bootstrapped() -> bool {
        INSTANCE.get().is_some()
    }

    /// Builds a kernel without installing it as the process instance.
    pub fn build(bs: Bootstrapper) -> Result<Arc<Self>, KernelError> {
        let dev = bs.is_dev();
        let errors = ErrorHandler::bounded(dev, bs.root(), KERNEL_LOG_LIMIT);
        let dirs = Arc::new(Directories::new(
            bs.root().to_path_buf(),
            bs.directory_layout().clone(),
            errors.clone(),
        ));

        let env = bs
            .env_name()
            .ok_or_else(|| KernelError::Bootstrap("No value for bootstrap prop \"env\"".into()))?;

        let cached = if bs.cached_config() {
            Config::read_cached(&dirs, env, &errors)
        } else {
            None
        };
        let config = match cached {
            Some(config) => config,
            None => {
                let config = Config::load(&dirs, env, &errors)?;
                if bs.cached_config() {
                    config.write_cache(&dirs, &errors);
                }
                config
            }
        };
        let config = Arc::new(config);

        let events = Events::new();
        for (name, listener) in bs.listeners() {
            let listener = listener.clone();
            events.listen(name, move |payload| listener(payload))?;
        }
        let time_zone: Tz = config
            .time_zone()
            .parse()
            .map_err(|_| KernelError::Config("Invalid timezone".into()))?;

        let kernel = Arc::new(Self {
            name: bs.app_name().to_string(),
            dev,
            time_zone,
            databases: Databases::new(config.clone(), dirs.clone()),
            cipher_keys: CipherKeys::new(config.clone()),
            services: Services::new(config.clone(), dirs.clone()),
            config,
            dirs,
            errors,
            events,
            http: OnceCell::new(),
            memory_cache: tokio::sync::OnceCell::new(),
        });

        kernel.events.trigger(
            KERNEL_BOOTSTRAPPED,
            &json!({"env": kernel.config.env(), "dev": dev}),
        )?;
        info!(
            name = %kernel.name,
            env = %kernel.config.env(),
            dev,
            version = VERSION,
            "kernel_bootstrapped"
        );
        Ok(kernel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dev(&self) -> bool {
        self.dev
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn dirs(&self) -> &Arc<Directories> {
        &self.dirs
    }

    /// Kernel-level error log, capped at [`KERNEL_LOG_LIMIT`] entries per
    /// list. Requests and scripts work on a [`scoped`](ErrorHandler::scoped) copy.
    pub fn error_handler(&self) -> &ErrorHandler {
        &self.errors
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn databases(&self) -> &Databases {
        &self.databases
    }

    pub fn cipher_keys(&self) -> &CipherKeys {
        &self.cipher_keys
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn http(&self) -> &Http {
        self.http.get_or_init(|| Http::new(self.config.clone()))
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub async fn cache(&self) -> Result<Arc<dyn Cache>, KernelError> {
        self.services.cache().await
    }

    pub fn mailer(&self) -> Result<Arc<Mailer>, KernelError> {
        self.services.mailer()
    }

    /// Resumes session `id`, or starts a new one. A failed resume is
    /// reported into the kernel-level log; request handlers go through
    /// [`session_with`](Self::session_with).
    pub async fn session(&self, id: Option<&str>) -> Result<Session, KernelError> {
        self.session_with(id, &self.errors).await
    }

    /// Like [`session`](Self::session), reporting a failed resume into `errors`.
    pub async fn session_with(
        &self,
        id: Option<&str>,
        errors: &ErrorHandler,
    ) -> Result<Session, KernelError> {
        let store = self.services.sessions()?;
        if let Some(id) = id {
            match store.resume(id).await {
                Ok(session) => return Ok(session),
                Err(e) => errors.error_to_warning("SessionException", &e),
            }
        }
        Ok(store.start().await?)
    }

    /// Fresh run-time object memory for one request or script run, reporting
    /// into `errors`. The cache service is attached when it is configured and
    /// reachable; reachability is checked once per process.
    pub async fn memory(&self, errors: &ErrorHandler) -> Memory {
        let memory = Memory::new(errors.clone());
        let cache = self
            .memory_cache
            .get_or_init(|| async {
                self.config.services().cache()?;
                match self.services.cache().await {
                    Ok(cache) => Some(cache),
                    Err(e) => {
                        warn!(error = %e, "memory_cache_unavailable");
                        None
                    }
                }
            })
            .await;
        match cache {
            Some(cache) => memory.caching(cache.clone()),
            None => memory,
        }
    }
}
