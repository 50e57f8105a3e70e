//! HTTP request plumbing shared by every controller.

pub mod context;
pub mod controllers;
pub mod cookies;
pub mod error_screen;
pub mod health;
pub mod page;
pub mod remote;
pub mod security;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use http::HeaderMap;
use once_cell::sync::OnceCell;
use tower_http::trace::TraceLayer;

use crate::bootstrap::config::Config;
use crate::bootstrap::error::KernelError;
use crate::bootstrap::kernel::AppKernel;
use cookies::Cookies;
use remote::Remote;

/// Server-level HTTP facts derived from configuration.
#[derive(Debug)]
pub struct Http {
    config: Arc<Config>,
    cookies: OnceCell<Cookies>,
}

impl Http {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cookies: OnceCell::new(),
        }
    }

    pub fn cookies(&self) -> Result<&Cookies, KernelError> {
        self.cookies.get_or_try_init(|| {
            let cfg = self
                .config
                .services()
                .http()
                .and_then(|http| http.cookies())
                .ok_or_else(|| {
                    KernelError::ServiceNotConfigured("Http cookies not configured".into())
                })?;
            Ok(Cookies::from_config(cfg, &self.config.site().domain))
        })
    }

    /// Configured cookie attributes, or the site defaults when
    /// `services.http.cookies` is absent.
    pub fn cookies_or_default(&self) -> Cookies {
        match self.cookies() {
            Ok(cookies) => cookies.clone(),
            Err(_) => {
                let site = self.config.site();
                Cookies::for_site(&site.domain, site.https)
            }
        }
    }

    pub fn remote(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Remote {
        Remote::from_parts(headers, peer)
    }
}

/// Mounts the built-in endpoints next to `app` and adds request tracing.
pub fn router(kernel: Arc<AppKernel>, app: Router<Arc<AppKernel>>) -> Router {
    app.merge(health::routes(kernel.dev()))
        .with_state(kernel)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        )
}
