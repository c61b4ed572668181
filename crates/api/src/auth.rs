//! 请求认证
//!
//! Worker调用 Alive / Next / Result 时在 `Authorization: Bearer <token>` 里携带Join签发的令牌；
//! Join、事件写入和手动执行资产组用 `X-API-Key`。

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use recon_dispatcher::WorkerIdentity;
use tracing::warn;

use crate::{error::ApiError, routes::AppState};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("缺少认证令牌")]
    MissingToken,
    #[error("缺少API Key")]
    MissingApiKey,
    #[error("Authorization请求头格式错误")]
    MalformedHeader,
}

/// 已认证的Worker，由 [`worker_auth`] 放入请求扩展
#[derive(Debug, Clone)]
pub struct AuthenticatedWorker(pub WorkerIdentity);

impl<S> FromRequestParts<S> for AuthenticatedWorker
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedWorker>()
            .cloned()
            .ok_or(ApiError::Authentication(AuthError::MissingToken))
    }
}

pub fn extract_api_key(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AuthError::MissingApiKey)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;
    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MalformedHeader)
}

/// 校验Worker令牌
pub async fn worker_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(req.headers())?.to_string();
    let identity = match state.dispatcher.sessions.authenticate(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Worker认证失败: {}", e);
            return Err(e.into());
        }
    };
    req.extensions_mut().insert(AuthenticatedWorker(identity));
    Ok(next.run(req).await)
}

/// 校验长期API Key
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(req.headers())?;
    if let Err(e) = state.dispatcher.sessions.verify_api_key(api_key) {
        warn!(path = %req.uri().path(), "API Key认证失败");
        return Err(e.into());
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MalformedHeader)
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        assert!(extract_api_key(&headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        assert!(extract_api_key(&headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("worker-key"));
        assert_eq!(extract_api_key(&headers).unwrap(), "worker-key");
    }
}
