use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::bootstrap::kernel::{AppKernel, VERSION};

#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub status: &'static str,
    pub databases: Vec<DatabaseHealth>,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub tag: String,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct KernelInfo {
    pub name: String,
    pub version: &'static str,
    pub env: String,
    pub dev: bool,
    pub time_zone: String,
}

/// Pings every configured database; any failure degrades the status.
pub async fn health(State(kernel): State<Arc<AppKernel>>) -> Json<HealthResp> {
    let mut databases = Vec::new();
    for (tag, _) in kernel.config().databases() {
        let ok = match kernel.databases().get(tag) {
            Ok(db) => db.ping().await.is_ok(),
            Err(_) => false,
        };
        databases.push(DatabaseHealth {
            tag: tag.to_string(),
            ok,
        });
    }
    let status = if databases.iter().all(|d| d.ok) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResp { status, databases })
}

pub async fn kernel_info(State(kernel): State<Arc<AppKernel>>) -> Json<KernelInfo> {
    Json(KernelInfo {
        name: kernel.name().to_string(),
        version: VERSION,
        env: kernel.config().env().to_string(),
        dev: kernel.dev(),
        time_zone: kernel.time_zone().name().to_string(),
    })
}

/// `/kernel` exposes environment details and is only mounted in dev mode.
pub fn routes(dev: bool) -> Router<Arc<AppKernel>> {
    let router = Router::new().route("/health", get(health));
    if dev {
        router.route("/kernel", get(kernel_info))
    } else {
        router
    }
}
