use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::application::events::Listener;
use crate::bootstrap::directories::DirectoryLayout;
use crate::bootstrap::error::KernelError;

static ENV_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{3,16}$").expect("valid regex"));

pub const DEFAULT_APP_NAME: &str = "App Kernel";

/// Inputs required to construct an [`AppKernel`](crate::bootstrap::kernel::AppKernel).
#[derive(Clone)]
pub struct Bootstrapper {
    root: PathBuf,
    name: String,
    env: Option<String>,
    dev: bool,
    load_cached_config: bool,
    layout: DirectoryLayout,
    listeners: Vec<(String, Listener)>,
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<&str> = self.listeners.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Bootstrapper")
            .field("root", &self.root)
            .field("name", &self.name)
            .field("env", &self.env)
            .field("dev", &self.dev)
            .field("load_cached_config", &self.load_cached_config)
            .field("layout", &self.layout)
            .field("listeners", &events)
            .finish()
    }
}

impl Bootstrapper {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, KernelError> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|_| KernelError::Bootstrap("Invalid root directory path".into()))?;
        if !root.is_dir() {
            return Err(KernelError::Bootstrap("Invalid root directory path".into()));
        }

        Ok(Self {
            root,
            name: DEFAULT_APP_NAME.to_string(),
            env: None,
            dev: false,
            load_cached_config: false,
            layout: DirectoryLayout::default(),
            listeners: Vec::new(),
        })
    }

    pub fn env(mut self, env: &str) -> Result<Self, KernelError> {
        if !ENV_NAME_RE.is_match(env) {
            return Err(KernelError::Bootstrap("Invalid environment name".into()));
        }
        self.env = Some(env.to_string());
        Ok(self)
    }

    pub fn dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn load_cached_config(mut self, cached: bool) -> Self {
        self.load_cached_config = cached;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn layout(mut self, layout: DirectoryLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Registers a listener before the kernel is built, so it also sees
    /// `kernel.bootstrapped`.
    pub fn on_event<F>(mut self, name: &str, listener: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.push((name.to_string(), Arc::new(listener)));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_name(&self) -> &str {
        &self.name
    }

    pub fn env_name(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn cached_config(&self) -> bool {
        self.load_cached_config
    }

    pub fn directory_layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn listeners(&self) -> &[(String, Listener)] {
        &self.listeners
    }
}
