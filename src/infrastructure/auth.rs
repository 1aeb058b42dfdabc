use async_trait::async_trait;
use reqwest::StatusCode;

use super::identity::{TokenVerifier, VerifiedUser, VerifyError};

/// 通过 Supabase Auth 的 `/auth/v1/user` 接口校验令牌
#[derive(Clone)]
pub struct SupabaseAuthVerifier {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuthVerifier {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl TokenVerifier for SupabaseAuthVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| VerifyError::Upstream(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(VerifyError::InvalidToken);
            }
            // Supabase 对已删除用户的令牌返回 404
            StatusCode::NOT_FOUND => return Err(VerifyError::MissingUser),
            status => {
                return Err(VerifyError::Upstream(format!(
                    "unexpected status {}",
                    status
                )));
            }
        }

        let user: Option<VerifiedUser> = response
            .json()
            .await
            .map_err(|e| VerifyError::Upstream(e.to_string()))?;

        match user {
            Some(user) if !user.id.is_empty() => Ok(user),
            _ => Err(VerifyError::MissingUser),
        }
    }
}
