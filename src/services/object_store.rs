//! src/services/object_store.rs
//!
//! Narrow capability wrapper over a multipart-capable blob store. The
//! [`ObjectStore`] trait is the seam between the upload/streaming services
//! and the backing S3-compatible deployment; [`S3Store`] is the production
//! implementation, and tests substitute an in-memory recorder.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::AppConfig;

/// Byte payloads are handed to callers as a boxed stream so responses can
/// be forwarded without buffering whole objects in memory.
pub type ObjectByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object store request failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }

    fn protocol(msg: &'static str) -> Self {
        StoreError::Backend(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A part receipt: the store acknowledges each uploaded part with an ETag
/// keyed by its part number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Result of a `head` call.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size: u64,
    pub content_type: Option<String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// The store operations the service relies on. All calls may fail; errors
/// carry their backend cause. Implementations hold no request state.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Create the bucket if it does not exist yet. Called once at startup.
    async fn ensure_bucket(&self) -> StoreResult<()>;

    /// Start a multipart upload, returning the store's upload id.
    async fn init_multipart(&self, key: &str, content_type: &str) -> StoreResult<String>;

    /// Upload one part, returning its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts into the final object.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<()>;

    /// Discard an in-progress multipart upload.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()>;

    /// Size and stored content type of an object.
    async fn head(&self, key: &str) -> StoreResult<ObjectHead>;

    /// Stream the byte range `[start, end_inclusive]` of an object.
    async fn get_range(&self, key: &str, start: u64, end_inclusive: u64)
        -> StoreResult<ObjectByteStream>;

    /// Stream an entire object.
    async fn get_whole(&self, key: &str) -> StoreResult<ObjectByteStream>;

    /// List all objects whose key starts with `prefix`.
    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectSummary>>;
}

/// Production adapter backed by an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the configured endpoint.
    ///
    /// Path-style addressing is forced for MinIO-style deployments that
    /// do not resolve virtual-host bucket names.
    pub async fn connect(cfg: &AppConfig) -> Self {
        let credentials = Credentials::new(
            cfg.s3_access_key.clone(),
            cfg.s3_secret_key.clone(),
            None,
            None,
            "mediavault",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.s3_region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(cfg.s3_endpoint.clone())
            .load()
            .await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build(),
        );

        Self {
            client,
            bucket: cfg.s3_bucket.clone(),
        }
    }

    fn range_header(start: u64, end_inclusive: u64) -> String {
        format!("bytes={}-{}", start, end_inclusive)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        let head = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await;
        if head.is_ok() {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(StoreError::backend)?;
        info!(bucket = %self.bucket, "created object-store bucket");
        Ok(())
    }

    async fn init_multipart(&self, key: &str, content_type: &str) -> StoreResult<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(StoreError::backend)?;

        resp.upload_id()
            .map(str::to_owned)
            .ok_or_else(|| StoreError::protocol("store returned no multipart upload id"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String> {
        let size = body.len();
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(AwsByteStream::from(body))
            .send()
            .await
            .map_err(StoreError::backend)?;

        debug!(key, part_number, size, "uploaded part");
        resp.e_tag()
            .map(str::to_owned)
            .ok_or_else(|| StoreError::protocol("store returned no etag for uploaded part"))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        mut parts: Vec<CompletedPart>,
    ) -> StoreResult<()> {
        // Parts arrive in upload order; the store requires ascending part numbers.
        parts.sort_by_key(|part| part.part_number);
        let parts = parts
            .into_iter()
            .map(|part| {
                AwsCompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    StoreError::NotFound(key.to_string())
                } else {
                    StoreError::backend(service_err)
                }
            })?;

        Ok(ObjectHead {
            size: resp.content_length().unwrap_or(0).max(0) as u64,
            content_type: resp.content_type().map(str::to_owned),
        })
    }

    async fn get_range(
        &self,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> StoreResult<ObjectByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(Self::range_header(start, end_inclusive))
            .send()
            .await
            .map_err(StoreError::backend)?;

        Ok(Box::pin(ReaderStream::new(resp.body.into_async_read())))
    }

    async fn get_whole(&self, key: &str) -> StoreResult<ObjectByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StoreError::backend)?;

        Ok(Box::pin(ReaderStream::new(resp.body.into_async_read())))
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut summaries = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(StoreError::backend)?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                summaries.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())),
                });
            }
        }
        Ok(summaries)
    }
}
