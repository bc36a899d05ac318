//! MinIO API client
//!
//! Implements [`ObjectStoreClient`] on top of the S3 API. MinIO only needs
//! path-style addressing and a fixed region; the endpoint is whatever the
//! connectivity layer resolved (service DNS name or a local tunnel port).

use crate::error::MinIOError;
use crate::store_trait::ObjectStoreClient;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials as S3Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Region MinIO reports when none is configured
const DEFAULT_REGION: &str = "us-east-1";

/// Access key / secret key pair for a MinIO instance
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// MinIO client over the S3 API
pub struct MinIOClient {
    client: Client,
    endpoint: String,
}

impl MinIOClient {
    /// Create a new MinIO client
    ///
    /// # Arguments
    /// * `endpoint` - `host:port` or a full URL; bare addresses use plain HTTP
    /// * `credentials` - root credentials of the instance
    /// * `operation_timeout` - upper bound for every request, retries included
    pub fn new(
        endpoint: &str,
        credentials: &Credentials,
        operation_timeout: Duration,
    ) -> Result<Self, MinIOError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(MinIOError::InvalidEndpoint("empty endpoint".to_string()));
        }

        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&url)
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(S3Credentials::new(
                &credentials.access_key,
                &credentials.secret_key,
                None,
                None,
                "minio-bucket-controller",
            ))
            .force_path_style(true)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(operation_timeout)
                    .build(),
            )
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            endpoint: url,
        })
    }
}

fn request_error<E, R>(operation: &str, err: SdkError<E, R>) -> MinIOError
where
    E: std::error::Error + Send + Sync + 'static,
    R: fmt::Debug,
{
    MinIOError::Request(format!("{}: {}", operation, DisplayErrorContext(err)))
}

fn service_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::ServiceError(service) => service.err().code(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ObjectStoreClient for MinIOClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, MinIOError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => Ok(false),
            Err(e) => Err(request_error("HeadBucket", e)),
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<(), MinIOError> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                debug!("Created bucket {} on {}", bucket, self.endpoint);
                Ok(())
            }
            Err(SdkError::ServiceError(service)) if service.err().is_bucket_already_owned_by_you() => {
                debug!("Bucket {} already owned by us on {}", bucket, self.endpoint);
                Ok(())
            }
            Err(SdkError::ServiceError(service)) if service.err().is_bucket_already_exists() => {
                Err(MinIOError::BucketTaken(bucket.to_string()))
            }
            Err(e) => Err(request_error("CreateBucket", e)),
        }
    }

    fn list_objects<'a>(&'a self, bucket: &'a str) -> BoxStream<'a, Result<String, MinIOError>> {
        // State: (continuation token, finished)
        stream::try_unfold((None::<String>, false), move |(token, finished)| async move {
            if finished {
                return Ok::<_, MinIOError>(None);
            }

            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| {
                    if service_code(&e) == Some("NoSuchBucket") {
                        MinIOError::BucketNotFound(bucket.to_string())
                    } else {
                        request_error("ListObjectsV2", e)
                    }
                })?;

            let keys: Vec<Result<String, MinIOError>> = output
                .contents()
                .iter()
                .filter_map(|object| object.key().map(|key| Ok(key.to_string())))
                .collect();
            let next = output.next_continuation_token().map(str::to_string);
            let done = !output.is_truncated().unwrap_or(false) || next.is_none();

            Ok(Some((stream::iter(keys), (next, done))))
        })
        .try_flatten()
        .boxed()
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), MinIOError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("DeleteObject", e))?;
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), MinIOError> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if service_code(&e) == Some("NoSuchBucket") => {
                Err(MinIOError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(request_error("DeleteBucket", e)),
        }
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>, MinIOError> {
        match self.client.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().filter(|p| !p.is_empty()).map(str::to_string)),
            Err(e) if service_code(&e) == Some("NoSuchBucketPolicy") => Ok(None),
            Err(e) => Err(request_error("GetBucketPolicy", e)),
        }
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: Option<&str>) -> Result<(), MinIOError> {
        match policy {
            Some(document) => {
                self.client
                    .put_bucket_policy()
                    .bucket(bucket)
                    .policy(document)
                    .send()
                    .await
                    .map_err(|e| request_error("PutBucketPolicy", e))?;
            }
            None => {
                self.client
                    .delete_bucket_policy()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|e| request_error("DeleteBucketPolicy", e))?;
            }
        }
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, MinIOError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => Ok(false),
            Err(e) => Err(request_error("HeadObject", e)),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), MinIOError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| request_error("PutObject", e))?;
        Ok(())
    }
}
