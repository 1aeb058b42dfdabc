mod auth;
mod error_handler;
mod rate_limit;
mod request_log;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use rate_limit::{
    Quota, RateLimitDecision, RateLimitGuard, RateLimitPolicy, RateLimiter, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET, rate_limit,
};
pub use request_log::{X_REQUEST_ID, request_log};
