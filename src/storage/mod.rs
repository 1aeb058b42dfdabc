//! 对象存储：桶描述、存储接口和启动时的建桶流程

mod bootstrap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bootstrap::{BucketOutcome, bootstrap_storage, ensure_bucket};

/// 上传文件大小上限，5 MiB
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

/// 上传桶的固定配置，启动时创建一次，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDescriptor {
    pub name: String,
    pub public: bool,
    pub file_size_limit: u64,
    pub allowed_mime_types: Vec<String>,
}

impl BucketDescriptor {
    pub fn uploads(name: &str) -> Self {
        Self {
            name: name.to_string(),
            public: false,
            file_size_limit: MAX_FILE_SIZE,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn allows_mime(&self, content_type: &str) -> bool {
        // 忽略 "image/png; charset=..." 之类的参数
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|m| *m == essence)
    }
}

/// 存储服务返回的桶信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

/// 单个对象路径的签名上传地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpload {
    pub path: String,
    pub signed_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket already exists")]
    AlreadyExists,
    #[error("storage returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected storage response: {0}")]
    Decode(String),
}

/// 存储服务的最小接口，方便替换实现和测试
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError>;

    async fn create_bucket(&self, bucket: &BucketDescriptor) -> Result<(), StorageError>;

    async fn create_signed_upload(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<SignedUpload, StorageError>;
}
