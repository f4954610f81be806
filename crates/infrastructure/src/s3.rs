use crate::image::ObjectStorage;
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use shared::{AppError, Config};
use std::time::Duration;
use tracing::debug;

/// S3 バケットをオブジェクトストレージとして使う
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
    url_expires_in: Duration,
}

impl S3ObjectStorage {
    pub async fn new(config: &Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .load()
            .await;

        Self {
            client: Client::new(&aws_config),
            bucket: config.storage_bucket.clone(),
            url_expires_in: Duration::from_secs(config.image_url_expires_secs),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::Upload(format!("{path}: {}", DisplayErrorContext(&e))))?;

        debug!("S3 PutObject 完了: bucket={}, key={}", self.bucket, path);
        Ok(())
    }

    /// 有効期限付きの署名済み URL を返す
    async fn get_url(&self, path: &str) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(self.url_expires_in)
            .map_err(|e| AppError::Configuration(format!("invalid url expiry: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Resolution(format!("{path}: {}", DisplayErrorContext(&e))))?;

        Ok(request.uri().to_string())
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| AppError::remote("DeleteObject", DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
