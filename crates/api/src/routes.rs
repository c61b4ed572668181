use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use recon_dispatcher::Dispatcher;

use crate::auth::{api_key_auth, worker_auth};
use crate::handlers::{
    asset_groups::run_asset_group_workflow,
    events::publish_event,
    health::health_check,
    jobs::{next_job, submit_result},
    workers::{alive, join},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    // Worker令牌保护的调用
    let worker_routes = Router::new()
        .route("/api/v1/workers/alive", post(alive))
        .route("/api/v1/jobs/next", post(next_job))
        .route("/api/v1/jobs/{id}/result", post(submit_result))
        .route_layer(middleware::from_fn_with_state(state.clone(), worker_auth));

    // API Key保护的调用
    let admin_routes = Router::new()
        .route("/api/v1/events", post(publish_event))
        .route(
            "/api/v1/asset-group-workflows/{id}/run",
            post(run_asset_group_workflow),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/workers/join", post(join))
        .merge(worker_routes)
        .merge(admin_routes)
        .with_state(state)
}
