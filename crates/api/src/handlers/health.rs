use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub checked_at: DateTime<Utc>,
}

/// 存活探针，不访问数据库
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        service: "recon-dispatcher",
        version: env!("CARGO_PKG_VERSION"),
        checked_at: Utc::now(),
    })
}
