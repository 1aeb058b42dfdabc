use std::sync::Arc;

use config::Config;
use infrastructure::TokenVerifier;
use middleware::RateLimiter;
use storage::{BucketDescriptor, StorageApi};

pub mod cache;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod storage;
pub mod utils;

/// 所有依赖都在启动时显式构造后注入，测试中可以替换成假实现
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub limiter: Arc<RateLimiter>,
    pub storage: Arc<dyn StorageApi>,
    pub bucket: Arc<BucketDescriptor>,
}
