use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::application::error_handler::{ErrorHandler, ErrorLevel};
use crate::bootstrap::error::KernelError;

/// Relative location of each well-known directory inside the project root.
/// A `None` slot means the application does not use that directory.
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    pub config: Option<PathBuf>,
    pub storage: Option<PathBuf>,
    pub uploads: Option<PathBuf>,
    pub langs: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub logs: Option<PathBuf>,
    pub sessions: Option<PathBuf>,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            config: Some("config".into()),
            storage: Some("storage".into()),
            uploads: Some("uploads".into()),
            langs: Some("langs".into()),
            templates: Some("templates".into()),
            cache: Some("cache".into()),
            compiler: Some("compiler".into()),
            logs: Some("logs".into()),
            sessions: Some("sessions".into()),
        }
    }
}

impl DirectoryLayout {
    /// A layout with no directories mapped.
    pub fn empty() -> Self {
        Self {
            config: None,
            storage: None,
            uploads: None,
            langs: None,
            templates: None,
            cache: None,
            compiler: None,
            logs: None,
            sessions: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    ReadWrite,
}

/// Lazily resolved, permission-checked project directories.
#[derive(Debug)]
pub struct Directories {
    root: PathBuf,
    layout: DirectoryLayout,
    errors: ErrorHandler,
    config: OnceCell<PathBuf>,
    storage: OnceCell<PathBuf>,
    uploads: OnceCell<PathBuf>,
    langs: OnceCell<PathBuf>,
    templates: OnceCell<PathBuf>,
    cache: OnceCell<PathBuf>,
    compiler: OnceCell<PathBuf>,
    logs: OnceCell<PathBuf>,
    sessions: OnceCell<PathBuf>,
}

impl Directories {
    pub fn new(root: PathBuf, layout: DirectoryLayout, errors: ErrorHandler) -> Self {
        Self {
            root,
            layout,
            errors,
            config: OnceCell::new(),
            storage: OnceCell::new(),
            uploads: OnceCell::new(),
            langs: OnceCell::new(),
            templates: OnceCell::new(),
            cache: OnceCell::new(),
            compiler: OnceCell::new(),
            logs: OnceCell::new(),
            sessions: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.config, "config", self.layout.config.as_deref(), Access::Read)
    }

    pub fn storage(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.storage, "storage", self.layout.storage.as_deref(), Access::Read)
    }

    pub fn uploads(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.uploads, "uploads", self.layout.uploads.as_deref(), Access::ReadWrite)
    }

    pub fn langs(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.langs, "langs", self.layout.langs.as_deref(), Access::Read)
    }

    pub fn templates(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.templates, "templates", self.layout.templates.as_deref(), Access::Read)
    }

    pub fn cache(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.cache, "cache", self.layout.cache.as_deref(), Access::ReadWrite)
    }

    pub fn compiler(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.compiler, "compiler", self.layout.compiler.as_deref(), Access::ReadWrite)
    }

    pub fn logs(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.logs, "logs", self.layout.logs.as_deref(), Access::ReadWrite)
    }

    pub fn sessions(&self) -> Result<&Path, KernelError> {
        self.resolve(&self.sessions, "sessions", self.layout.sessions.as_deref(), Access::ReadWrite)
    }

    fn resolve<'a>(
        &self,
        cell: &'a OnceCell<PathBuf>,
        slot: &str,
        relative: Option<&Path>,
        access: Access,
    ) -> Result<&'a Path, KernelError> {
        cell.get_or_try_init(|| self.check(slot, relative, access))
            .map(PathBuf::as_path)
    }

    fn check(
        &self,
        slot: &str,
        relative: Option<&Path>,
        access: Access,
    ) -> Result<PathBuf, KernelError> {
        let label = slot.to_uppercase();
        let relative = relative.ok_or_else(|| {
            KernelError::Directory(format!("No directory const defined for {label}"))
        })?;
        let path = self.root.join(relative);

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KernelError::Directory(format!(
                    "Directory defined for {label} does not exist in project root"
                )));
            }
            Err(e) => return Err(self.load_failure(&label, &e)),
        };
        if !meta.is_dir() {
            return Err(KernelError::Directory(format!(
                "Directory defined for {label} does not exist in project root"
            )));
        }

        if let Err(e) = fs::read_dir(&path) {
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(KernelError::Directory(format!(
                    "Directory for {label} is not readable"
                )));
            }
            return Err(self.load_failure(&label, &e));
        }

        if matches!(access, Access::ReadWrite) && !is_writable(&path) {
            return Err(KernelError::Directory(format!(
                "Directory for {label} is not writable"
            )));
        }

        tracing::debug!(slot = %slot, path = %path.display(), "directory_resolved");
        Ok(path)
    }

    fn load_failure(&self, label: &str, e: &std::io::Error) -> KernelError {
        self.errors
            .trigger_if_debug(format!("[IOError] {e}"), ErrorLevel::Warning);
        KernelError::Directory(format!("Failed to load directory for {label}"))
    }
}

fn is_writable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => false,
        Ok(_) => tempfile::tempfile_in(path).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dirs(root: &Path, layout: DirectoryLayout) -> Directories {
        Directories::new(root.to_path_buf(), layout, ErrorHandler::new(false, root))
    }

    #[test]
    fn resolves_existing_directories_once() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("cache")).unwrap();
        let d = dirs(temp.path(), DirectoryLayout::default());
        let first = d.cache().unwrap().to_path_buf();
        std::fs::remove_dir_all(temp.path().join("cache")).unwrap();
        // memoised: the second call does not hit the filesystem
        assert_eq!(d.cache().unwrap(), first.as_path());
    }

    #[test]
    fn missing_directory_is_reported() {
        let temp = TempDir::new().unwrap();
        let d = dirs(temp.path(), DirectoryLayout::default());
        let err = d.logs().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Directory defined for LOGS does not exist in project root"
        );
    }

    #[test]
    fn unmapped_slot_is_reported() {
        let temp = TempDir::new().unwrap();
        let d = dirs(temp.path(), DirectoryLayout::empty());
        let err = d.sessions().unwrap_err();
        assert_eq!(err.to_string(), "No directory const defined for SESSIONS");
    }

    #[test]
    fn file_in_place_of_directory_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("storage"), b"x").unwrap();
        let d = dirs(temp.path(), DirectoryLayout::default());
        assert!(d.storage().is_err());
    }
}
