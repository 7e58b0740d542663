use super::ObjectStore;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::Client;

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl S3Settings {
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

/// Shared AWS settings from the configured keys, region and optional endpoint.
async fn sdk_config(settings: &S3Settings) -> SdkConfig {
    let credentials = Credentials::new(
        settings.access_key.clone(),
        settings.secret_key.clone(),
        None,
        None,
        "sno2-config",
    );
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region().to_string()))
        .credentials_provider(credentials);
    if let Some(endpoint) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Builds the client and makes sure the bucket exists.
    pub async fn connect(settings: &S3Settings) -> AppResult<Self> {
        let sdk_config = sdk_config(settings).await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        let store = Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        };
        store.ensure_bucket(settings.region()).await?;
        Ok(store)
    }

    async fn ensure_bucket(&self, region: &str) -> AppResult<()> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(|err| {
            AppError::Storage(format!(
                "Could not create bucket {}: {}",
                self.bucket,
                DisplayErrorContext(&err)
            ))
        })?;
        tracing::info!(bucket = %self.bucket, "created bucket");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, content: Vec<u8>, content_type: Option<&str>) -> AppResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(content));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request
            .send()
            .await
            .map_err(|err| AppError::Storage(format!("Upload of {} failed: {}", key, DisplayErrorContext(&err))))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| AppError::Storage(format!("Delete of {} failed: {}", key, DisplayErrorContext(&err))))?;
        Ok(())
    }
}
