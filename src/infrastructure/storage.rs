use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::storage::{BucketDescriptor, BucketInfo, SignedUpload, StorageApi, StorageError};

/// Supabase Storage REST 客户端，使用 service role 凭证访问
#[derive(Clone)]
pub struct SupabaseStorage {
    http: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

#[derive(Serialize)]
struct CreateBucketBody<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    file_size_limit: u64,
    allowed_mime_types: &'a [String],
}

#[derive(Deserialize)]
struct SignedUploadBody {
    url: String,
    #[serde(default)]
    token: Option<String>,
}

impl SupabaseStorage {
    pub fn new(http: reqwest::Client, base_url: &str, service_role_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.base_url, path)
    }

    // 桶名和对象路径逐段做百分号编码，路径中的 `/` 保留为分隔符
    fn signed_upload_url(&self, bucket: &str, path: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.endpoint("/object/upload/sign"))
            .map_err(|e| StorageError::Decode(format!("invalid storage url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Decode("storage url cannot be a base".into()))?
            .push(bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
    }
}

async fn status_error(response: Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StorageError::Status { status, body }
}

// 存储服务对重复建桶返回 409，旧版本返回 400 + "already exists"
fn is_duplicate(status: StatusCode, body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST
            && (body.contains("already exists") || body.contains("duplicate")))
}

#[async_trait]
impl StorageApi for SupabaseStorage {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let response = self
            .authorized(self.http.get(self.endpoint("/bucket")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))
    }

    async fn create_bucket(&self, bucket: &BucketDescriptor) -> Result<(), StorageError> {
        let body = CreateBucketBody {
            id: &bucket.name,
            name: &bucket.name,
            public: bucket.public,
            file_size_limit: bucket.file_size_limit,
            allowed_mime_types: &bucket.allowed_mime_types,
        };
        let response = self
            .authorized(self.http.post(self.endpoint("/bucket")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        if is_duplicate(status, &text) {
            return Err(StorageError::AlreadyExists);
        }
        Err(StorageError::Status {
            status: status.as_u16(),
            body: text,
        })
    }

    async fn create_signed_upload(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<SignedUpload, StorageError> {
        let url = self.signed_upload_url(bucket, path)?;
        let response = self.authorized(self.http.post(url)).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: SignedUploadBody = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        // 返回的 url 是相对 /storage/v1 的路径
        let signed_url = if body.url.starts_with("http://") || body.url.starts_with("https://") {
            body.url
        } else {
            self.endpoint(&body.url)
        };
        let token = body.token.or_else(|| {
            Url::parse(&signed_url).ok().and_then(|url| {
                url.query_pairs()
                    .find(|(k, _)| k == "token")
                    .map(|(_, v)| v.into_owned())
            })
        });

        Ok(SignedUpload {
            path: path.to_string(),
            signed_url,
            token,
        })
    }
}
