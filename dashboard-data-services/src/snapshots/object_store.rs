use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Faults from the object-store layer.
///
/// Only `Transient` is retry-eligible. `NotFound` is business-as-usual for
/// dated snapshots and drives the backward date walk instead of a retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("transient store fault: {0}")]
    Transient(String),

    #[error("store fault: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// A fetched object body plus its storage-layer modification instant.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

/// Read-only view of the snapshot bucket.
///
/// The fetcher is written against this trait so tests can swap in an
/// in-memory store; production uses [`S3SnapshotStore`].
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError>;

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Time-limited read-only URL for an object, optionally overriding the
    /// response content type.
    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        response_content_type: Option<&str>,
    ) -> Result<String, StoreError>;
}

/// Connection settings for the snapshot bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (path-style addressing); `None` for AWS proper.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: "sbt-public-share".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// S3-backed [`SnapshotStore`].
#[derive(Clone)]
pub struct S3SnapshotStore {
    client: Client,
    bucket: String,
}

impl S3SnapshotStore {
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "snapshot-store",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .behavior_version(BehaviorVersion::latest());
        if let Some(endpoint) = settings.endpoint.clone() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }

    /// Wrap an already-configured client (shared credentials, test stacks).
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl SnapshotStore for S3SnapshotStore {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StoreError> {
        debug!("get s3://{}/{}", self.bucket, key);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_get_error)?;
        let last_modified = resp
            .last_modified()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
            .unwrap_or_else(Utc::now);
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Transient(format!("reading body of {}: {}", key, e)))?;
        Ok(StoredObject {
            bytes: data.into_bytes().to_vec(),
            last_modified,
        })
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(classify_infra_error)?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        response_content_type: Option<&str>,
    ) -> Result<String, StoreError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::Other(format!("invalid presign expiry: {}", e)))?;
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(content_type) = response_content_type {
            request = request.response_content_type(content_type);
        }
        let presigned = request.presigned(config).await.map_err(classify_get_error)?;
        Ok(presigned.uri().to_string())
    }
}

fn classify_get_error(err: SdkError<GetObjectError>) -> StoreError {
    if let SdkError::ServiceError(ctx) = &err {
        if ctx.err().is_no_such_key() {
            return StoreError::NotFound;
        }
    }
    classify_infra_error(err)
}

fn classify_infra_error<E>(err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(ctx) => ctx.raw().status().as_u16() >= 500,
        _ => false,
    };
    let message = DisplayErrorContext(err).to_string();
    if transient {
        StoreError::Transient(message)
    } else {
        StoreError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retry_eligible() {
        assert!(StoreError::Transient("503".to_string()).is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Other("denied".to_string()).is_transient());
    }

    #[test]
    fn test_default_settings_point_at_share_bucket() {
        let settings = S3Settings::default();
        assert_eq!(settings.bucket, "sbt-public-share");
        assert!(settings.endpoint.is_none());
    }
}
