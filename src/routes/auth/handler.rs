use axum::{Extension, Json};

use super::model::MeResponse;
use crate::infrastructure::VerifiedUser;

// 返回认证中间件校验过的当前用户
pub async fn me(Extension(user): Extension<VerifiedUser>) -> Json<MeResponse> {
    Json(MeResponse { user })
}
