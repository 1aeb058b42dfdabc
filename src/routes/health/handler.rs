use axum::Json;

use super::model::HealthResponse;

/// 健康检查，不经过认证和限流
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
