use super::{BucketDescriptor, StorageApi, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOutcome {
    Created,
    AlreadyExists,
}

/// 桶不存在时创建。可以在每次冷启动时重复调用。
pub async fn ensure_bucket(
    storage: &dyn StorageApi,
    bucket: &BucketDescriptor,
) -> Result<BucketOutcome, StorageError> {
    let buckets = storage.list_buckets().await?;
    if buckets.iter().any(|b| b.name == bucket.name) {
        return Ok(BucketOutcome::AlreadyExists);
    }

    match storage.create_bucket(bucket).await {
        Ok(()) => Ok(BucketOutcome::Created),
        // 另一个实例在 list 和 create 之间抢先建好了桶
        Err(StorageError::AlreadyExists) => Ok(BucketOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

/// 启动时调用，失败只记录日志，不影响服务
pub async fn bootstrap_storage(storage: &dyn StorageApi, bucket: &BucketDescriptor) {
    match ensure_bucket(storage, bucket).await {
        Ok(BucketOutcome::Created) => {
            tracing::info!(bucket = %bucket.name, "created storage bucket");
        }
        Ok(BucketOutcome::AlreadyExists) => {
            tracing::debug!(bucket = %bucket.name, "storage bucket already exists");
        }
        Err(e) => {
            tracing::error!(bucket = %bucket.name, error = %e, "storage bootstrap failed, uploads may be unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BucketInfo, SignedUpload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeStorage {
        buckets: Mutex<Vec<BucketInfo>>,
        creates: AtomicUsize,
        fail_list: bool,
        hide_from_list: bool,
    }

    #[async_trait]
    impl StorageApi for FakeStorage {
        async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
            if self.fail_list {
                return Err(StorageError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            if self.hide_from_list {
                return Ok(Vec::new());
            }
            Ok(self.buckets.lock().await.clone())
        }

        async fn create_bucket(&self, bucket: &BucketDescriptor) -> Result<(), StorageError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let mut buckets = self.buckets.lock().await;
            if buckets.iter().any(|b| b.name == bucket.name) {
                return Err(StorageError::AlreadyExists);
            }
            buckets.push(BucketInfo {
                id: bucket.name.clone(),
                name: bucket.name.clone(),
                public: bucket.public,
            });
            Ok(())
        }

        async fn create_signed_upload(
            &self,
            _bucket: &str,
            _path: &str,
        ) -> Result<SignedUpload, StorageError> {
            unreachable!("not used by bootstrap")
        }
    }

    #[tokio::test]
    async fn second_run_leaves_exactly_one_bucket() {
        let storage = FakeStorage::default();
        let bucket = BucketDescriptor::uploads("uploads");

        assert_eq!(ensure_bucket(&storage, &bucket).await.unwrap(), BucketOutcome::Created);
        assert_eq!(
            ensure_bucket(&storage, &bucket).await.unwrap(),
            BucketOutcome::AlreadyExists
        );
        assert_eq!(storage.buckets.lock().await.len(), 1);
        assert_eq!(storage.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_conflict_counts_as_existing() {
        let storage = FakeStorage {
            hide_from_list: true,
            ..Default::default()
        };
        let bucket = BucketDescriptor::uploads("uploads");
        ensure_bucket(&storage, &bucket).await.unwrap();
        assert_eq!(
            ensure_bucket(&storage, &bucket).await.unwrap(),
            BucketOutcome::AlreadyExists
        );
        assert_eq!(storage.buckets.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_swallows_errors() {
        let storage = FakeStorage {
            fail_list: true,
            ..Default::default()
        };
        let bucket = BucketDescriptor::uploads("uploads");
        assert!(ensure_bucket(&storage, &bucket).await.is_err());
        // 不 panic，也不返回错误
        bootstrap_storage(&storage, &bucket).await;
        assert_eq!(storage.creates.load(Ordering::SeqCst), 0);
    }
}
