//! # Recon API
//!
//! 编排核心的HTTP入口，基于Axum构建。
//!
//! ## API 端点
//!
//! ### Workers服务
//! - `POST /api/v1/workers/join` - 使用 `X-API-Key` 注册Worker，返回Worker id与令牌
//! - `POST /api/v1/workers/alive` - 心跳流，请求和响应都是 NDJSON
//!
//! ### JobsRegistry服务
//! - `POST /api/v1/jobs/next` - 拉取下一个任务
//! - `POST /api/v1/jobs/{id}/result` - 提交任务结果
//!
//! ### 其他
//! - `POST /api/v1/events` - 发布领域事件（`X-API-Key`）
//! - `POST /api/v1/asset-group-workflows/{id}/run` - 立即执行资产组工作流（`X-API-Key`）
//! - `GET /health` - 健康检查
//!
//! Worker的调用都在 `Authorization: Bearer <token>` 请求头里携带令牌，不放在请求体中。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::{extract::DefaultBodyLimit, Router};
use recon_core::config::ApiConfig;
use recon_dispatcher::Dispatcher;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(dispatcher: Dispatcher, config: &ApiConfig) -> Router {
    let state = AppState { dispatcher };

    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(DefaultBodyLimit::max(config.max_request_size_mb * 1024 * 1024))
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if config.cors_enabled {
        router.layer(cors_layer(config))
    } else {
        router
    }
}
