use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 身份提供方确认过的用户，由认证中间件放入请求扩展
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token rejected by identity provider")]
    InvalidToken,
    #[error("identity provider returned no user")]
    MissingUser,
    #[error("identity provider unavailable: {0}")]
    Upstream(String),
}

/// 令牌校验。每次受保护请求调用一次，不做缓存。
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError>;
}
