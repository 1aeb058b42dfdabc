/// 缓存键模块
pub mod rate_limit_keys;

pub use rate_limit_keys::{RATE_LIMIT_PREFIX, rate_limit_key};
