//! Worker会话：注册（Join）、令牌签发与校验、心跳
//!
//! Join用长期有效的API Key换取Worker身份和短期令牌。令牌是HS256签名的JWT，
//! 携带Worker id与类型；之后的 Alive / Next / Result 请求都在请求头里带上它。

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use recon_core::{
    config::AuthConfig,
    models::{HeartbeatAck, HeartbeatFrame, JoinResponse, Worker},
    traits::{JobRepository, WorkerRepository},
    ReconError, ReconResult,
};
use recon_infrastructure::StructuredLogger;

/// Worker令牌中的声明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerClaims {
    /// Worker id
    pub sub: String,
    /// Worker类型
    pub name: String,
    pub exp: i64,
    pub iat: i64,
}

/// 已认证的Worker身份
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerIdentity {
    pub worker_id: Uuid,
    pub name: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            ttl_seconds,
        }
    }

    pub fn issue(&self, worker: &Worker, now: DateTime<Utc>) -> ReconResult<String> {
        let claims = WorkerClaims {
            sub: worker.id.to_string(),
            name: worker.name.clone(),
            exp: (now + Duration::seconds(self.ttl_seconds)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ReconError::Internal(format!("签发令牌失败: {e}")))
    }

    pub fn validate(&self, token: &str) -> ReconResult<WorkerIdentity> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<WorkerClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| ReconError::Authentication(format!("无效的Worker令牌: {e}")))?
            .claims;
        let worker_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ReconError::Authentication("令牌中的Worker id无效".to_string()))?;
        Ok(WorkerIdentity {
            worker_id,
            name: claims.name,
        })
    }
}

/// API Key以 SHA-256 摘要的形式保存和比较
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

pub struct WorkerSessions {
    workers: Arc<dyn WorkerRepository>,
    jobs: Arc<dyn JobRepository>,
    api_key_hashes: Vec<String>,
    tokens: TokenService,
}

impl WorkerSessions {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        jobs: Arc<dyn JobRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            workers,
            jobs,
            api_key_hashes: config.api_keys.iter().map(|k| hash_api_key(k)).collect(),
            tokens: TokenService::new(&config.jwt_secret, config.token_ttl_seconds),
        }
    }

    /// 校验长期API Key
    pub fn verify_api_key(&self, api_key: &str) -> ReconResult<()> {
        let hashed = hash_api_key(api_key);
        if self.api_key_hashes.iter().any(|h| *h == hashed) {
            Ok(())
        } else {
            Err(ReconError::Authentication("无效的API Key".to_string()))
        }
    }

    /// 用API Key注册一个Worker
    pub async fn join(&self, api_key: &str, name: &str) -> ReconResult<JoinResponse> {
        if let Err(e) = self.verify_api_key(api_key) {
            warn!(worker.name = name, "Worker使用了无效的API Key");
            return Err(e);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(ReconError::Validation("Worker类型不能为空".to_string()));
        }

        let mut worker = Worker::new(name);
        worker.token = self.tokens.issue(&worker, Utc::now())?;
        self.workers.register(&worker).await?;
        StructuredLogger::log_worker_joined(worker.id, &worker.name);

        Ok(JoinResponse {
            worker_id: worker.id,
            token: worker.token,
        })
    }

    /// 校验令牌，并确认Worker仍然登记在册
    pub async fn authenticate(&self, token: &str) -> ReconResult<WorkerIdentity> {
        let identity = self.tokens.validate(token)?;
        if self.workers.get_by_id(identity.worker_id).await?.is_none() {
            return Err(ReconError::Authentication(format!(
                "Worker {} 未注册",
                identity.worker_id
            )));
        }
        Ok(identity)
    }

    /// 处理一帧心跳：刷新存活时间；帧里带有任务时把它推进到 RUNNING
    pub async fn heartbeat(
        &self,
        worker_id: Uuid,
        frame: &HeartbeatFrame,
        now: DateTime<Utc>,
    ) -> ReconResult<HeartbeatAck> {
        if !self.workers.touch(worker_id, now).await? {
            return Err(ReconError::WorkerNotFound { id: worker_id });
        }

        if let Some(job_id) = frame.job_id {
            if self.jobs.mark_running(job_id, worker_id).await? {
                debug!(job.id = %job_id, worker.id = %worker_id, "任务开始运行");
            }
        }

        Ok(HeartbeatAck {
            worker_id,
            received_at: now,
        })
    }
}
