use crate::application::ports::session_store::SessionError;

/// Errors raised while bootstrapping the kernel or resolving one of its services.
#[derive(thiserror::Error, Debug)]
pub enum KernelError {
    #[error("{0}")]
    Bootstrap(String),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Directory(String),
    #[error("{0}")]
    ServiceNotConfigured(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("App kernel has not been bootstrapped")]
    NotBootstrapped,
    #[error("App kernel has already been bootstrapped; use instance() instead")]
    AlreadyBootstrapped,
    #[error("Cache error: {0}")]
    Cache(#[source] anyhow::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Mailer error: {0}")]
    Mailer(#[source] anyhow::Error),
    #[error("Translator error: {0}")]
    Translator(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl KernelError {
    /// Short type name used in developer-facing payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::Bootstrap(_) => "AppBootstrapException",
            KernelError::Config(_) => "AppConfigException",
            KernelError::Directory(_) => "AppDirectoryException",
            KernelError::ServiceNotConfigured(_) => "ServiceNotConfiguredException",
            KernelError::InvalidArgument(_) => "InvalidArgumentException",
            KernelError::NotBootstrapped | KernelError::AlreadyBootstrapped => "RuntimeException",
            KernelError::Cache(_) => "CacheException",
            KernelError::Database(_) => "DatabaseException",
            KernelError::Mailer(_) => "MailerException",
            KernelError::Translator(_) => "TranslatorException",
            KernelError::Session(_) => "SessionsException",
        }
    }
}
