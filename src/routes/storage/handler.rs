use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use uuid::Uuid;

use super::model::{UploadUrlRequest, UploadUrlResponse};
use crate::{
    AppState, error::AppError, infrastructure::VerifiedUser, storage::BucketDescriptor,
    utils::sanitize_file_name,
};

pub async fn bucket_info(State(state): State<AppState>) -> Json<BucketDescriptor> {
    Json(state.bucket.as_ref().clone())
}

fn validate(bucket: &BucketDescriptor, req: &UploadUrlRequest) -> Result<(), AppError> {
    if req.file_name.trim().is_empty() {
        return Err(AppError::BadRequest("fileName is required".into()));
    }
    if !bucket.allows_mime(&req.content_type) {
        return Err(AppError::BadRequest(format!(
            "Unsupported content type: {}",
            req.content_type
        )));
    }
    if req.size == 0 || req.size > bucket.file_size_limit {
        return Err(AppError::BadRequest(format!(
            "File size must be between 1 and {} bytes",
            bucket.file_size_limit
        )));
    }
    Ok(())
}

/// 为当前用户生成一次性的签名上传地址，对象路径以用户 ID 开头
pub async fn create_upload_url(
    State(state): State<AppState>,
    Extension(user): Extension<VerifiedUser>,
    payload: Result<Json<UploadUrlRequest>, JsonRejection>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    validate(&state.bucket, &req)?;

    let path = format!(
        "{}/{}-{}",
        user.id,
        Uuid::new_v4(),
        sanitize_file_name(&req.file_name)
    );
    let signed = state
        .storage
        .create_signed_upload(&state.bucket.name, &path)
        .await?;

    tracing::info!(user_id = %user.id, path = %signed.path, "issued signed upload url");
    Ok(Json(UploadUrlResponse {
        path: signed.path,
        signed_url: signed.signed_url,
        token: signed.token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content_type: &str, size: u64) -> UploadUrlRequest {
        UploadUrlRequest {
            file_name: "cover.png".into(),
            content_type: content_type.into(),
            size,
        }
    }

    #[test]
    fn validation_enforces_bucket_constraints() {
        let bucket = BucketDescriptor::uploads("uploads");
        assert!(validate(&bucket, &request("image/png", 1024)).is_ok());
        assert!(validate(&bucket, &request("image/png", 5_242_880)).is_ok());
        assert!(validate(&bucket, &request("image/png", 5_242_881)).is_err());
        assert!(validate(&bucket, &request("image/png", 0)).is_err());
        assert!(validate(&bucket, &request("text/html", 10)).is_err());
    }
}
