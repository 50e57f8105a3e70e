//! In-memory capture of run-time notices and warnings.
//!
//! Each captured message is also emitted as a `tracing` event. What ends up
//! in responses depends on the mode: development shows every entry,
//! production only the ones explicitly `triggered`.

mod log;

pub use log::{ErrorLevel, ErrorList, ErrorLog, ErrorMsg};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Inner {
    dev: bool,
    root: PathBuf,
    limit: Option<usize>,
    log: Mutex<ErrorLog>,
}

#[derive(Debug, Clone)]
pub struct ErrorHandler {
    inner: Arc<Inner>,
}

impl ErrorHandler {
    pub fn new(dev: bool, root: &Path) -> Self {
        Self::build(dev, root, None)
    }

    /// A handler that keeps only the newest `limit` entries per list. Used
    /// for logs that live as long as the process.
    pub fn bounded(dev: bool, root: &Path, limit: usize) -> Self {
        Self::build(dev, root, Some(limit))
    }

    fn build(dev: bool, root: &Path, limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dev,
                root: root.to_path_buf(),
                limit,
                log: Mutex::new(ErrorLog::default()),
            }),
        }
    }

    /// A handler with an empty log that shares mode and root, for one request or script run.
    pub fn scoped(&self) -> Self {
        Self::new(self.inner.dev, &self.inner.root)
    }

    pub fn dev(&self) -> bool {
        self.inner.dev
    }

    /// Records a user-visible error at the caller's location.
    #[track_caller]
    pub fn trigger(&self, message: impl Into<String>, level: ErrorLevel) {
        self.record(message.into(), level, true, Location::caller());
    }

    /// Records an error that is only user-visible in development mode.
    #[track_caller]
    pub fn trigger_if_debug(&self, message: impl Into<String>, level: ErrorLevel) {
        let dev = self.inner.dev;
        self.record(message.into(), level, dev, Location::caller());
    }

    /// Converts any error into a triggered warning: `[Kind] message`.
    #[track_caller]
    pub fn error_to_warning(&self, kind: &str, err: &dyn std::error::Error) {
        self.record(
            format!("[{kind}] {err}"),
            ErrorLevel::Warning,
            true,
            Location::caller(),
        );
    }

    pub fn errors(&self) -> ErrorLog {
        self.lock().clone()
    }

    /// Every entry in development mode, only triggered entries otherwise.
    pub fn display_errors(&self) -> Vec<ErrorMsg> {
        let log = self.lock();
        if self.inner.dev {
            log.all()
        } else {
            log.triggered().to_vec()
        }
    }

    pub fn flush(&self) {
        self.lock().flush();
    }

    fn record(&self, message: String, level: ErrorLevel, triggered: bool, at: &Location<'_>) {
        match level {
            ErrorLevel::Notice => tracing::info!(file = at.file(), line = at.line(), "{message}"),
            ErrorLevel::Warning | ErrorLevel::Deprecated => {
                tracing::warn!(file = at.file(), line = at.line(), "{message}")
            }
        }

        let mut error = ErrorMsg::new(level, message);
        error.file = self.relative(at.file());
        error.line = at.line();
        error.triggered = triggered;
        let mut log = self.lock();
        log.append(error);
        if let Some(limit) = self.inner.limit {
            log.truncate_front(limit);
        }
    }

    fn relative(&self, file: &str) -> String {
        Path::new(file)
            .strip_prefix(&self.inner.root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| file.to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ErrorLog> {
        // A poisoned log still holds valid entries.
        self.inner
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
