use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{AppState, error::AppError, infrastructure::VerifyError};

/// 受保护路由的认证中间件。
///
/// 没有 `Authorization` 头时直接返回 401，不访问身份提供方；
/// 否则把 Bearer 令牌交给校验器，成功后把 [`VerifiedUser`](crate::infrastructure::VerifiedUser)
/// 放进请求扩展。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !request.headers().contains_key(AUTHORIZATION) {
        return Err(AppError::MissingAuthorization);
    }

    // 头存在但不是 Bearer 格式，按无效令牌处理
    let token = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::InvalidToken)?;

    let user = match state.verifier.verify(&token).await {
        Ok(user) => user,
        Err(VerifyError::Upstream(reason)) => {
            tracing::warn!(%reason, "identity provider unavailable during token check");
            return Err(AppError::InvalidToken);
        }
        Err(e) => {
            tracing::debug!(error = %e, "token verification failed");
            return Err(AppError::InvalidToken);
        }
    };

    tracing::debug!(user_id = %user.id, "request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
