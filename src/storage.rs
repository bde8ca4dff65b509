use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Lifetime of presigned upload URLs.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// StorageError
///
/// Failure of an object-store operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to presign request: {0}")]
    Presign(String),

    #[error("object store request failed: {0}")]
    Request(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

/// StorageService
///
/// Contract for the object store holding originals and thumbnails. Implemented
/// by the S3 client in production and by `MockStorageService` in tests.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Used for local MinIO setups.
    async fn ensure_bucket_exists(&self);

    /// Signed URL the client PUTs an original to, constrained to `content_type`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Signed GET URL for `key`, valid for `expires_in`.
    async fn get_presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// S3StorageClient
///
/// `StorageService` over the AWS SDK. Path-style addressing keeps it compatible
/// with MinIO and other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

fn presigning(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Presign(e.to_string()))
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket already exists.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = ?e, "create_bucket skipped");
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            // The client must send exactly this Content-Type.
            .content_type(content_type)
            .presigned(presigning(UPLOAD_URL_TTL)?)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }

    async fn get_presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Request(e.to_string())
                }
            })?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a client-supplied name cannot escape
/// its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// In-memory `StorageService` for tests. Every signed URL is unique (a sequence
/// number is embedded) so tests can tell a regenerated URL from a cached one.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    signed: Arc<AtomicUsize>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Number of download URLs signed so far.
    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Request(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.check()?;
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }

    async fn get_presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.check()?;
        let sequence = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake&expires={}&n={}",
            sanitize_key(key),
            expires_in.as_secs(),
            sequence
        ))
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.objects
            .lock()
            .map_err(|_| StorageError::Request("mock store poisoned".to_string()))?
            .insert(sanitize_key(key), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check()?;
        self.objects
            .lock()
            .map_err(|_| StorageError::Request("mock store poisoned".to_string()))?
            .get(&sanitize_key(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// StorageState
///
/// Shared handle to the object store held in the application state.
pub type StorageState = Arc<dyn StorageService>;
