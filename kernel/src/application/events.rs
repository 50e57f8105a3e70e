use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::bootstrap::error::KernelError;

static EVENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-]{2,64}$").expect("valid regex"));

pub const KERNEL_BOOTSTRAPPED: &str = "kernel.bootstrapped";
pub const HTTP_REQUEST_FINISHED: &str = "http.request.finished";

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Named events with listeners called in registration order.
#[derive(Default)]
pub struct Events {
    listeners: RwLock<BTreeMap<String, Vec<Listener>>>,
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .listeners
            .read()
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("Events").field("registered", &names).finish()
    }
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen<F>(&self, name: &str, listener: F) -> Result<(), KernelError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let name = validate(name)?;
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(name)
            .or_default()
            .push(Arc::new(listener));
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&name.to_lowercase())
            .is_some_and(|l| !l.is_empty())
    }

    /// Calls every listener of `name`; returns how many were called.
    pub fn trigger(&self, name: &str, payload: &Value) -> Result<usize, KernelError> {
        let name = validate(name)?;
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&name)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener(payload);
        }
        tracing::trace!(event = %name, listeners = listeners.len(), "event_triggered");
        Ok(listeners.len())
    }

    pub fn clear(&self, name: &str) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&name.to_lowercase());
    }
}

fn validate(name: &str) -> Result<String, KernelError> {
    if EVENT_RE.is_match(name) {
        Ok(name.to_lowercase())
    } else {
        Err(KernelError::InvalidArgument("Invalid event name".into()))
    }
}
