use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    cache::{CounterStore, StoreError, keys::rate_limit_key},
    config::{Config, PolicyConfig},
    error::AppError,
    utils::client_ip,
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// 命名的限流策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(name: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            name,
            max_requests,
            window,
        }
    }

    fn from_config(name: &'static str, config: &PolicyConfig) -> Self {
        Self::new(name, config.max_requests, config.window())
    }

    pub fn api(config: &Config) -> Self {
        Self::from_config("api", &config.api_limit)
    }

    pub fn auth(config: &Config) -> Self {
        Self::from_config("auth", &config.auth_limit)
    }

    pub fn upload(config: &Config) -> Self {
        Self::from_config("upload", &config.upload_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(Quota),
    Limited(Quota),
}

/// 固定窗口限流器，计数交给外部存储
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    fail_open: bool,
    trusted_proxy_hops: usize,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, fail_open: bool) -> Self {
        Self {
            store,
            fail_open,
            trusted_proxy_hops: 0,
        }
    }

    /// 部署在 N 层反向代理之后时，按 `X-Forwarded-For` 右数第 N 项识别客户端
    pub fn with_trusted_proxy_hops(mut self, hops: usize) -> Self {
        self.trusted_proxy_hops = hops;
        self
    }

    pub async fn check(
        &self,
        policy: &RateLimitPolicy,
        client: &str,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = rate_limit_key(policy.name, client);
        let counted = self.store.increment(&key, policy.window).await?;

        let limit = policy.max_requests;
        let quota = Quota {
            limit,
            remaining: (limit as u64).saturating_sub(counted.count) as u32,
            reset_at: counted.reset_at,
            retry_after_secs: counted.seconds_until_reset(Utc::now()),
        };

        if counted.count <= limit as u64 {
            Ok(RateLimitDecision::Allowed(quota))
        } else {
            Ok(RateLimitDecision::Limited(quota))
        }
    }
}

/// 中间件状态：限流器加上该路由组使用的策略
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub policy: RateLimitPolicy,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, policy: RateLimitPolicy) -> Self {
        Self { limiter, policy }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: &'static str,
    retry_after: u64,
}

// 多个策略叠加时保留剩余额度更少的那一组头，相等时保留先写入的（内层）
fn attach_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    let existing = headers
        .get(&X_RATELIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u32>().ok());
    if matches!(existing, Some(remaining) if remaining <= quota.remaining) {
        return;
    }

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_at.timestamp()));
}

pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(&req, guard.limiter.trusted_proxy_hops);

    let decision = match guard.limiter.check(&guard.policy, &client).await {
        Ok(decision) => decision,
        Err(e) if guard.limiter.fail_open => {
            tracing::warn!(policy = guard.policy.name, error = %e, "rate limit store failed, admitting request");
            return Ok(next.run(req).await);
        }
        Err(e) => return Err(AppError::RateLimiterUnavailable(e)),
    };

    match decision {
        RateLimitDecision::Allowed(quota) => {
            let mut response = next.run(req).await;
            attach_quota_headers(response.headers_mut(), &quota);
            Ok(response)
        }
        RateLimitDecision::Limited(quota) => {
            tracing::warn!(
                policy = guard.policy.name,
                client = %client,
                retry_after = quota.retry_after_secs,
                "rate limit exceeded"
            );
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitedBody {
                    error: "Too many requests",
                    retry_after: quota.retry_after_secs,
                }),
            )
                .into_response();
            let headers = response.headers_mut();
            attach_quota_headers(headers, &quota);
            headers.insert(RETRY_AFTER, HeaderValue::from(quota.retry_after_secs));
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCounterStore, WindowCount};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn increment(&self, key: &str, _window: Duration) -> Result<WindowCount, StoreError> {
            Err(StoreError::Corrupt(key.to_string()))
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), true)
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let limiter = limiter();
        let policy = RateLimitPolicy::new("api", 3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            match limiter.check(&policy, "1.2.3.4").await.unwrap() {
                RateLimitDecision::Allowed(q) => assert_eq!(q.remaining, expected_remaining),
                other => panic!("expected allowed, got {:?}", other),
            }
        }
        match limiter.check(&policy, "1.2.3.4").await.unwrap() {
            RateLimitDecision::Limited(q) => {
                assert_eq!(q.remaining, 0);
                assert_eq!(q.limit, 3);
                assert!(q.retry_after_secs >= 1 && q.retry_after_secs <= 60);
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn policies_and_clients_count_separately() {
        let limiter = limiter();
        let api = RateLimitPolicy::new("api", 1, Duration::from_secs(60));
        let upload = RateLimitPolicy::new("upload", 1, Duration::from_secs(60));

        assert!(matches!(limiter.check(&api, "a").await.unwrap(), RateLimitDecision::Allowed(_)));
        assert!(matches!(limiter.check(&upload, "a").await.unwrap(), RateLimitDecision::Allowed(_)));
        assert!(matches!(limiter.check(&api, "b").await.unwrap(), RateLimitDecision::Allowed(_)));
        assert!(matches!(limiter.check(&api, "a").await.unwrap(), RateLimitDecision::Limited(_)));
    }

    #[tokio::test]
    async fn store_errors_propagate_from_check() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore), false);
        let policy = RateLimitPolicy::new("api", 1, Duration::from_secs(1));
        assert!(limiter.check(&policy, "a").await.is_err());
    }

    #[test]
    fn tighter_quota_headers_win() {
        let reset_at = Utc::now();
        let tight = Quota {
            limit: 20,
            remaining: 2,
            reset_at,
            retry_after_secs: 1,
        };
        let loose = Quota {
            limit: 100,
            remaining: 90,
            reset_at,
            retry_after_secs: 1,
        };
        let mut headers = HeaderMap::new();
        attach_quota_headers(&mut headers, &tight);
        attach_quota_headers(&mut headers, &loose);
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "20");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "2");
    }

    #[test]
    fn exhausted_inner_quota_keeps_its_headers() {
        let inner_reset = Utc::now() + chrono::Duration::seconds(10);
        let outer_reset = Utc::now() + chrono::Duration::seconds(50);
        let inner = Quota {
            limit: 20,
            remaining: 0,
            reset_at: inner_reset,
            retry_after_secs: 10,
        };
        let outer = Quota {
            limit: 100,
            remaining: 0,
            reset_at: outer_reset,
            retry_after_secs: 50,
        };
        let mut headers = HeaderMap::new();
        attach_quota_headers(&mut headers, &inner);
        attach_quota_headers(&mut headers, &outer);
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "20");
        assert_eq!(
            headers[&X_RATELIMIT_RESET],
            inner_reset.timestamp().to_string().as_str()
        );
    }
}
