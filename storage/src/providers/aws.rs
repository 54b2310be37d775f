use crate::{StorageError, StorageObject, StorageProvider};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use common::paths::S3Location;
use log::{debug, error, info};
use std::collections::HashMap;

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub profile: Option<String>,
}

impl From<&common::S3Config> for S3Options {
    fn from(config: &common::S3Config) -> Self {
        Self {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            access_key: config.aws_access_key_id.clone(),
            secret_key: config.aws_secret_access_key.clone(),
            profile: config.profile.clone(),
        }
    }
}

pub struct S3Provider {
    client: Client,
}

fn parse_location(path: &str) -> Result<S3Location, StorageError> {
    S3Location::parse(path)
        .ok_or_else(|| StorageError::Configuration(format!("{path} is not an s3:// location")))
}

impl S3Provider {
    /// Creates a new S3 provider
    pub async fn new(options: S3Options) -> Result<Self, StorageError> {
        let region_str = options.region.unwrap_or_else(|| "us-east-1".to_string());
        let region = Region::new(region_str.clone());

        let mut config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(3));

        if let Some(profile) = &options.profile {
            info!("Using AWS profile: {profile}");
            config_builder = config_builder.profile_name(profile);
        }

        // Static credentials win over the profile and the default chain
        if let (Some(access_key), Some(secret_key)) = (options.access_key, options.secret_key) {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "static-credentials-provider",
            );
            config_builder =
                config_builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        if let Some(ref endpoint) = options.endpoint {
            info!("Using custom endpoint: {endpoint}");
            config_builder = config_builder.endpoint_url(endpoint);
        } else {
            debug!("Using default AWS endpoint for region: {region_str}");
        }

        let sdk_config = config_builder.load().await;

        // Build S3 config, enabling path-style if endpoint is set
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if options.endpoint.is_some() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
        })
    }

    /// Converts an S3 object to a StorageObject
    fn convert_s3_object(bucket: &str, obj: &aws_sdk_s3::types::Object) -> StorageObject {
        let key = obj.key().unwrap_or_default();
        StorageObject {
            key: S3Location {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
            .uri(),
            size: obj.size().map(|size| size.try_into().unwrap_or(0)).unwrap_or(0),
            last_modified: obj
                .last_modified()
                .and_then(|t| Utc.timestamp_opt(t.secs(), t.subsec_nanos()).single())
                .unwrap_or_else(Utc::now),
        }
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &str {
        "s3"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StorageObject>, StorageError> {
        let location = parse_location(prefix)?;
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&location.bucket)
                .prefix(&location.key);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                error!("Failed to list objects in {prefix}: {e}");
                report_s3_error_to_sentry("list_objects", &e, &location.bucket, &location.key);
                StorageError::Aws(e.to_string())
            })?;

            objects.extend(
                response
                    .contents()
                    .iter()
                    .map(|obj| Self::convert_s3_object(&location.bucket, obj)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        let location = parse_location(path)?;
        let size = data.len();

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload {path}: {e:?}");
                report_s3_error_to_sentry("put_object", &e, &location.bucket, &location.key);
                StorageError::Aws(e.to_string())
            })?;

        debug!("Uploaded {size} bytes to {path}");
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, StorageError> {
        let location = parse_location(path)?;

        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to get object {path}: {e}");
                if e.to_string().contains("404") || e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(format!("Object {path} not found"))
                } else {
                    report_s3_error_to_sentry("get_object", &e, &location.bucket, &location.key);
                    StorageError::Aws(e.to_string())
                }
            })?;

        let body = response.body.collect().await.map_err(|e| {
            error!("Failed to read body of {path}: {e}");
            StorageError::Aws(e.to_string())
        })?;

        Ok(body.into_bytes())
    }
}

fn report_s3_error_to_sentry(
    operation: &str,
    error: &dyn std::error::Error,
    bucket: &str,
    key: &str,
) {
    let mut extra = HashMap::new();
    extra.insert("bucket", bucket);
    extra.insert("key", key);

    let extra_json = serde_json::to_string(&extra).unwrap_or_default();
    let sentry_message = format!("{operation}: {error} | context: {extra_json}");
    sentry::capture_message(&sentry_message, sentry::Level::Error);
}
