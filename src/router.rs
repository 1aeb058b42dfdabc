use std::time::Duration;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{
    AppState,
    config::Config,
    middleware::{
        RateLimitGuard, RateLimitPolicy, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
        X_RATELIMIT_RESET, auth_middleware, log_errors, rate_limit, request_log,
    },
    routes,
};

pub fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET])
        .max_age(Duration::from_secs(600));

    if config.frontend_url.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .frontend_url
        .split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // 通配来源不能和 credentials 同时使用
    cors.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// 组装全部路由和中间件。
///
/// 健康检查不挂限流和认证；其余路由先经过 `api` 策略，再按需叠加
/// `auth`/`upload` 策略，最后才做令牌校验。
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let limiter = state.limiter.clone();

    let auth_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(from_fn_with_state(
            RateLimitGuard::new(limiter.clone(), RateLimitPolicy::auth(&config)),
            rate_limit,
        ));

    let upload_routes = Router::new()
        .route("/storage/upload-url", post(routes::storage::create_upload_url))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(from_fn_with_state(
            RateLimitGuard::new(limiter.clone(), RateLimitPolicy::upload(&config)),
            rate_limit,
        ));

    let storage_routes = Router::new()
        .route("/storage/bucket", get(routes::storage::bucket_info))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let limited_routes = Router::new()
        .merge(auth_routes)
        .merge(upload_routes)
        .merge(storage_routes)
        .route_layer(from_fn_with_state(
            RateLimitGuard::new(limiter.clone(), RateLimitPolicy::api(&config)),
            rate_limit,
        ));

    let public_routes = Router::new().route("/health", get(routes::health::health));

    let api = Router::new().merge(public_routes).merge(limited_routes);
    let router = if config.api_base_uri.is_empty() {
        api
    } else {
        Router::new().nest(&config.api_base_uri, api)
    };

    router
        .fallback(routes::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_log))
                .layer(cors_layer(&config))
                .layer(from_fn(log_errors)),
        )
        .with_state(state)
}
