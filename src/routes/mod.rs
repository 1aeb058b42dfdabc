pub mod auth;
pub mod health;
pub mod storage;

use crate::error::AppError;

// 未匹配的路由统一返回 JSON 404
pub async fn not_found() -> AppError {
    AppError::NotFound
}
