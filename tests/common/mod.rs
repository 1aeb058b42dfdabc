#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, body::Body, http::Response};
use http_body_util::BodyExt;
use pubhub_edge::{
    AppState,
    cache::{CounterStore, MemoryCounterStore, StoreError, WindowCount},
    config::Config,
    infrastructure::{TokenVerifier, VerifiedUser, VerifyError},
    middleware::RateLimiter,
    router::create_router,
    storage::{BucketDescriptor, BucketInfo, SignedUpload, StorageApi, StorageError},
};
use tokio::sync::Mutex;

pub const BASE: &str = "/make-server-19ccd85e";
pub const FRONTEND: &str = "https://app.pubhub.test";
pub const GOOD_TOKEN: &str = "good-token";

/// 按令牌查表的校验器，记录调用次数
#[derive(Default)]
pub struct StaticVerifier {
    users: HashMap<String, VerifiedUser>,
    pub calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn with_user(token: &str, id: &str) -> Self {
        let mut users = HashMap::new();
        users.insert(
            token.to_string(),
            VerifiedUser {
                id: id.to_string(),
                email: Some(format!("{}@pubhub.test", id)),
                role: Some("authenticated".into()),
            },
        );
        Self {
            users,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .get(token)
            .cloned()
            .ok_or(VerifyError::InvalidToken)
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub buckets: Mutex<Vec<BucketInfo>>,
    pub signed: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageApi for FakeStorage {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        Ok(self.buckets.lock().await.clone())
    }

    async fn create_bucket(&self, bucket: &BucketDescriptor) -> Result<(), StorageError> {
        let mut buckets = self.buckets.lock().await;
        if buckets.iter().any(|b| b.name == bucket.name) {
            return Err(StorageError::AlreadyExists);
        }
        buckets.push(BucketInfo {
            id: bucket.name.clone(),
            name: bucket.name.clone(),
            public: bucket.public,
        });
        Ok(())
    }

    async fn create_signed_upload(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<SignedUpload, StorageError> {
        self.signed.lock().await.push(path.to_string());
        Ok(SignedUpload {
            path: path.to_string(),
            signed_url: format!(
                "https://storage.test/storage/v1/object/upload/sign/{}/{}?token=t",
                bucket, path
            ),
            token: Some("t".into()),
        })
    }
}

pub struct BrokenStore;

#[async_trait]
impl CounterStore for BrokenStore {
    async fn increment(&self, _key: &str, _window: Duration) -> Result<WindowCount, StoreError> {
        Err(StoreError::Corrupt("store offline".into()))
    }
}

pub fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("SUPABASE_URL", "http://supabase.test"),
        ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
        ("FRONTEND_URL", FRONTEND),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}

pub struct TestApp {
    pub router: Router,
    pub verifier: Arc<StaticVerifier>,
    pub storage: Arc<FakeStorage>,
}

pub fn app_with(config: Config, store: Arc<dyn CounterStore>) -> TestApp {
    let verifier = Arc::new(StaticVerifier::with_user(GOOD_TOKEN, "user-42"));
    let storage = Arc::new(FakeStorage::default());
    let state = AppState {
        limiter: Arc::new(
            RateLimiter::new(store, config.rate_limit_fail_open)
                .with_trusted_proxy_hops(config.trusted_proxy_hops),
        ),
        bucket: Arc::new(BucketDescriptor::uploads(&config.storage_bucket)),
        config: Arc::new(config),
        verifier: verifier.clone(),
        storage: storage.clone(),
    };
    TestApp {
        router: create_router(state),
        verifier,
        storage,
    }
}

pub fn app(extra: &[(&str, &str)]) -> TestApp {
    app_with(config(extra), Arc::new(MemoryCounterStore::new()))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
