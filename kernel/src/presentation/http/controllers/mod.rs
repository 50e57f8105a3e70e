//! Controller traits and their axum mounting helpers.

pub mod api;
pub mod generic;

pub use api::ApiController;
pub use generic::GenericHttpController;

use std::error::Error as StdError;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::routing::{MethodRouter, any};
use serde_json::{Value, json};

use crate::application::ports::session_store::SessionError;
use crate::bootstrap::error::KernelError;
use crate::bootstrap::kernel::AppKernel;
use crate::presentation::http::security::XsrfError;

/// Error surfaced to the client by a controller, optionally pointing at an
/// input parameter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ControllerError {
    message: String,
    param: Option<String>,
    code: Option<u16>,
    kind: &'static str,
    chain: Vec<String>,
}

impl ControllerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            param: None,
            code: None,
            kind: "AppControllerException",
            chain: Vec::new(),
        }
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn param_name(&self) -> Option<&str> {
        self.param.as_deref()
    }

    pub fn error_code(&self) -> Option<u16> {
        self.code
    }

    /// Short type name of the underlying error.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Messages of the underlying error's sources, outermost first.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    fn caught(kind: &'static str, err: &(dyn StdError + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(e) = source {
            chain.push(e.to_string());
            source = e.source();
        }
        Self {
            message: err.to_string(),
            param: None,
            code: None,
            kind,
            chain,
        }
    }

    /// Developer-facing details added to payloads in development mode.
    pub(crate) fn details(&self) -> Value {
        json!({
            "caught": self.kind,
            "code": self.code,
            "chain": self.chain,
        })
    }
}

impl From<KernelError> for ControllerError {
    fn from(e: KernelError) -> Self {
        Self::caught(e.kind(), &e)
    }
}

impl From<SessionError> for ControllerError {
    fn from(e: SessionError) -> Self {
        Self::caught("SessionsException", &e)
    }
}

impl From<XsrfError> for ControllerError {
    fn from(e: XsrfError) -> Self {
        let code = e.code();
        Self::caught("XSRF_Exception", &e).code(code)
    }
}

/// Mounts an [`ApiController`] for every HTTP method.
pub fn api_route<C: ApiController>(controller: C) -> MethodRouter<Arc<AppKernel>> {
    let controller = Arc::new(controller);
    any(move |State(kernel): State<Arc<AppKernel>>, req: Request| {
        let controller = controller.clone();
        async move { api::dispatch(controller.as_ref(), kernel, req).await }
    })
}

/// Mounts a [`GenericHttpController`] for every HTTP method.
pub fn http_route<C: GenericHttpController>(controller: C) -> MethodRouter<Arc<AppKernel>> {
    let controller = Arc::new(controller);
    any(move |State(kernel): State<Arc<AppKernel>>, req: Request| {
        let controller = controller.clone();
        async move { generic::dispatch(controller.as_ref(), kernel, req).await }
    })
}

pub(crate) fn unsupported_method(method: &http::Method) -> ControllerError {
    ControllerError::new(format!("Endpoint does not support {method} method"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xsrf_errors_keep_their_code() {
        let err = ControllerError::from(XsrfError::TokenExpired);
        assert_eq!(err.error_code(), Some(0x14));
        assert_eq!(err.message(), "XSRF token has expired; Try refreshing the page");
        assert_eq!(err.kind(), "XSRF_Exception");
    }

    #[test]
    fn kernel_errors_carry_kind_and_chain() {
        let err = ControllerError::from(KernelError::Cache(
            anyhow::anyhow!("connection refused").context("redis_connect"),
        ));
        assert_eq!(err.kind(), "CacheException");
        assert_eq!(err.message(), "Cache error: redis_connect");
        assert_eq!(err.chain(), ["redis_connect".to_string(), "connection refused".to_string()]);
    }

    #[test]
    fn param_is_attached() {
        let err = ControllerError::new("Invalid e-mail address").param("email");
        assert_eq!(err.param_name(), Some("email"));
        assert_eq!(err.details()["caught"], "AppControllerException");
    }
}
