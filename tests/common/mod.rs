#![allow(dead_code)]
//! In-memory object store used by the integration tests.
//!
//! Records every interaction so tests can assert on call counts
//! (idempotency laws) and assembles completed uploads into real byte
//! buffers so range reads can be verified end to end.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mediavault::services::object_store::{
    CompletedPart, ObjectByteStream, ObjectHead, ObjectStore, ObjectSummary, StoreError,
    StoreResult,
};

#[derive(Default)]
pub struct MockState {
    next_upload: usize,
    /// upload_id -> (key, [(part_number, bytes)])
    uploads: HashMap<String, (String, Vec<(i32, Bytes)>)>,
    /// key -> (bytes, content_type)
    objects: HashMap<String, (Bytes, Option<String>)>,
    pub upload_part_calls: usize,
    pub part_calls_by_index: HashMap<(String, i32), usize>,
    pub complete_attempts: usize,
    pub abort_calls: usize,
    pub fail_next_complete: bool,
}

#[derive(Default)]
pub struct MockStore {
    pub state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a stored object directly, bypassing the upload flow.
    pub fn put_object(&self, key: &str, data: impl Into<Bytes>, content_type: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.objects.insert(
            key.to_string(),
            (data.into(), content_type.map(str::to_owned)),
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(key)
            .map(|(data, _)| data.clone())
    }

    pub fn upload_part_calls(&self) -> usize {
        self.state.lock().unwrap().upload_part_calls
    }

    pub fn part_calls_for(&self, key: &str, part_number: i32) -> usize {
        self.state
            .lock()
            .unwrap()
            .part_calls_by_index
            .get(&(key.to_string(), part_number))
            .copied()
            .unwrap_or(0)
    }

    pub fn complete_attempts(&self) -> usize {
        self.state.lock().unwrap().complete_attempts
    }

    pub fn abort_calls(&self) -> usize {
        self.state.lock().unwrap().abort_calls
    }

    pub fn fail_next_complete(&self) {
        self.state.lock().unwrap().fail_next_complete = true;
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn ensure_bucket(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn init_multipart(&self, key: &str, _content_type: &str) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state
            .uploads
            .insert(upload_id.clone(), (key.to_string(), Vec::new()));
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        state.upload_part_calls += 1;
        *state
            .part_calls_by_index
            .entry((key.to_string(), part_number))
            .or_insert(0) += 1;

        let (_, parts) = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::NotFound(format!("upload {upload_id}")))?;
        let etag = format!("etag-{}-{}", part_number, body.len());
        parts.retain(|(number, _)| *number != part_number);
        parts.push((part_number, body));
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.complete_attempts += 1;
        if state.fail_next_complete {
            state.fail_next_complete = false;
            return Err(StoreError::Backend("injected complete failure".into()));
        }

        let (stored_key, mut uploaded) = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StoreError::NotFound(format!("upload {upload_id}")))?;
        assert_eq!(stored_key, key, "complete issued against the wrong key");

        let mut numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(
            numbers.len(),
            parts.len(),
            "completed part numbers must be unique"
        );

        uploaded.sort_by_key(|(number, _)| *number);
        let mut assembled = Vec::new();
        for (_, bytes) in uploaded {
            assembled.extend_from_slice(&bytes);
        }
        state
            .objects
            .insert(key.to_string(), (Bytes::from(assembled), None));
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.abort_calls += 1;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHead> {
        let state = self.state.lock().unwrap();
        let (data, content_type) = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(ObjectHead {
            size: data.len() as u64,
            content_type: content_type.clone(),
        })
    }

    async fn get_range(
        &self,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> StoreResult<ObjectByteStream> {
        let state = self.state.lock().unwrap();
        let (data, _) = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let slice = data.slice(start as usize..=end_inclusive as usize);
        Ok(Box::pin(stream::once(async move {
            Ok::<_, std::io::Error>(slice)
        })))
    }

    async fn get_whole(&self, key: &str) -> StoreResult<ObjectByteStream> {
        let state = self.state.lock().unwrap();
        let (data, _) = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let data = data.clone();
        Ok(Box::pin(stream::once(async move {
            Ok::<_, std::io::Error>(data)
        })))
    }

    async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectSummary>> {
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<ObjectSummary> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (data, _))| ObjectSummary {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: Some(Utc::now()),
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }
}

/// Drain a body stream into a single buffer.
pub async fn collect_body(mut body: ObjectByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.expect("body stream should not error"));
    }
    out
}
