use axum::{extract::State, http::StatusCode, Json};
use recon_domain::{DomainEvent, EventBus, EventPayload};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ApiResult, routes::AppState};

/// CRUD层发布的领域事件
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    /// `<entityKind>.<action>`，例如 `target.created`
    pub topic: String,
    #[serde(default)]
    pub payload: EventPayload,
}

#[derive(Debug, Serialize)]
pub struct PublishEventResponse {
    pub topic: String,
}

pub async fn publish_event(
    State(state): State<AppState>,
    Json(mut request): Json<PublishEventRequest>,
) -> ApiResult<(StatusCode, Json<PublishEventResponse>)> {
    // 来源只由工作流触发器内部设置，外部事件一律视为无来源
    request.payload.source = None;
    let event = DomainEvent::from_topic(&request.topic, request.payload)?;
    let topic = event.topic();
    state.dispatcher.event_bus.publish(event).await?;
    info!(event.topic = %topic, "已接收领域事件");

    Ok((StatusCode::ACCEPTED, Json(PublishEventResponse { topic })))
}
