use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use tracing::info;

use crate::application::error_handler::ErrorHandler;
use crate::bootstrap::kernel::AppKernel;
use crate::presentation::http;

use super::AppScript;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// `serve [addr]`: HTTP server with the built-in endpoints.
#[derive(Debug, Default)]
pub struct Serve;

#[async_trait]
impl AppScript for Serve {
    fn name(&self) -> &'static str {
        "serve"
    }

    async fn exec(&self, kernel: Arc<AppKernel>, _errors: &ErrorHandler, args: &[String]) -> anyhow::Result<()> {
        let addr: SocketAddr = args
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_BIND)
            .parse()
            .context("invalid_bind_address")?;

        let app = http::router(kernel, Router::new());
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "http_listening");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("http_shutdown");
            })
            .await?;
        Ok(())
    }
}

/// `config`: prints the loaded configuration without credentials.
#[derive(Debug, Default)]
pub struct ConfigSummary;

#[async_trait]
impl AppScript for ConfigSummary {
    fn name(&self) -> &'static str {
        "config"
    }

    async fn exec(&self, kernel: Arc<AppKernel>, _errors: &ErrorHandler, _args: &[String]) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(&summary(&kernel))?);
        Ok(())
    }
}

pub fn summary(kernel: &AppKernel) -> serde_json::Value {
    let config = kernel.config();
    let services = config.services();
    let databases: Vec<_> = config
        .databases()
        .map(|(tag, db)| {
            json!({
                "tag": tag,
                "driver": db.driver.as_str(),
                "host": db.host,
                "name": db.name,
            })
        })
        .collect();

    json!({
        "env": config.env(),
        "dev": kernel.dev(),
        "timeZone": config.time_zone(),
        "site": {
            "title": config.site().title,
            "url": config.site().url,
        },
        "databases": databases,
        "services": {
            "cache": services.cache().map(|c| c.engine.as_str()),
            "sessions": services.sessions().is_some(),
            "httpCookies": services.http().and_then(|h| h.cookies()).is_some(),
            "mailer": services.mailer().map(|m| m.sender_email.as_str()),
            "cipherKeys": services
                .cipher()
                .map(|c| c.labels().collect::<Vec<_>>())
                .unwrap_or_default(),
            "translator": services.translator().and_then(|t| t.fallback.as_deref()),
        },
    })
}

pub fn builtin() -> Vec<Box<dyn AppScript>> {
    vec![Box::new(Serve), Box::new(ConfigSummary)]
}
