use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::{ffi::OsStr, path::Path, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{config::AppConfig, error::AppError};

/// Every post image lives under this prefix.
pub const IMAGE_PREFIX: &str = "posts/";

/// Lifetime of a presigned upload URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// Lifetime of a presigned read URL handed out with post listings.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

/// Longer extensions are replaced by `bin` to keep keys short.
const MAX_EXTENSION_LEN: usize = 10;

/// new_image_key
///
/// Fresh object key for an uploaded post image: `posts/<uuid>.<ext>`, the extension
/// taken (lowercased) from the client's filename, `bin` when it has none usable.
pub fn new_image_key(filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(OsStr::to_str)
        .filter(|ext| {
            (1..=MAX_EXTENSION_LEN).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or("bin")
        .to_ascii_lowercase();
    format!("{IMAGE_PREFIX}{}.{extension}", Uuid::new_v4())
}

/// StorageService
///
/// Object storage for post images. The service never sees image bytes: it hands out
/// presigned PUT URLs and the client uploads straight to the bucket.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket when missing. Called at startup in `Env::Local` (MinIO).
    async fn ensure_bucket_exists(&self);

    /// Presigns a PUT of exactly one object.
    ///
    /// # Arguments
    /// * `key`: object key, as produced by `new_image_key`.
    /// * `content_type`: MIME type the upload must be sent with.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, AppError>;

    /// Presigns a GET of one stored object, valid for `DOWNLOAD_URL_TTL`.
    async fn get_presigned_download_url(&self, key: &str) -> Result<String, AppError>;
}

/// S3StorageClient
///
/// `StorageService` over the AWS SDK, pointed at MinIO locally and at any
/// S3-compatible endpoint in production. Path-style addressing (`endpoint/bucket/key`)
/// is forced since MinIO does not serve virtual-host buckets.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "yatube-static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket: bucket.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.s3_endpoint,
            &config.s3_region,
            &config.s3_key,
            &config.s3_secret,
            &config.s3_bucket,
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            tracing::debug!(bucket = %self.bucket, "bucket present");
            return;
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => tracing::info!(bucket = %self.bucket, "bucket created"),
            Err(e) => tracing::warn!(bucket = %self.bucket, "could not create bucket: {:?}", e),
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(DOWNLOAD_URL_TTL)
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a key can never climb out of its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// `StorageService` for tests. Answers with a fake MinIO-style URL, or fails every call
/// when built with `new_failing`.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, AppError> {
        if self.should_fail {
            return Err(AppError::Storage("mock storage failure".to_string()));
        }

        Ok(format!(
            "http://localhost:9000/yatube-mock/{}?content-type={}&signature=fake",
            sanitize_key(key),
            content_type.replace('/', "%2F"),
        ))
    }

    async fn get_presigned_download_url(&self, key: &str) -> Result<String, AppError> {
        if self.should_fail {
            return Err(AppError::Storage("mock storage failure".to_string()));
        }

        Ok(format!(
            "http://localhost:9000/yatube-mock/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

/// Shared handle held in `AppState`.
pub type StorageState = Arc<dyn StorageService>;
