mod common;

use bytes::Bytes;
use std::sync::Arc;

use common::MockStore;
use mediavault::models::session::SessionState;
use mediavault::services::session_table::SessionTable;
use mediavault::services::upload_service::{
    CancelOutcome, ChunkOutcome, FinalizeOutcome, UploadCoordinator, UploadError,
};

const CHUNK_SIZE: u64 = 5_242_880;

fn coordinator(store: &Arc<MockStore>) -> UploadCoordinator {
    UploadCoordinator::new(store.clone(), SessionTable::new())
}

fn chunk_of(byte: u8, len: usize) -> Bytes {
    Bytes::from(vec![byte; len])
}

#[tokio::test]
async fn s1_happy_path_three_chunks() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();
    assert!(init.object_key.starts_with("alice@x/"));
    assert!(init.object_key.ends_with("/clip.mp4"));
    assert_eq!(init.upload_id, "upload-1");

    let sizes = [CHUNK_SIZE as usize, CHUNK_SIZE as usize, 2_014_240];
    for index in 0..2u32 {
        let outcome = uploads
            .upload_chunk("alice@x", &init.session_id, index, chunk_of(index as u8, sizes[index as usize]))
            .await
            .unwrap();
        match outcome {
            ChunkOutcome::Progress { duplicate, received, total, .. } => {
                assert!(!duplicate);
                assert_eq!(received, index + 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected progress ack, got {other:?}"),
        }
    }

    let outcome = uploads
        .upload_chunk("alice@x", &init.session_id, 2, chunk_of(2, sizes[2]))
        .await
        .unwrap();
    match outcome {
        ChunkOutcome::Finalized(FinalizeOutcome::Completed(done)) => {
            assert_eq!(done.object_key, init.object_key);
            assert_eq!(done.total_size, 12_500_000);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    // the assembled object matches the declared size
    assert_eq!(store.object(&init.object_key).unwrap().len(), 12_500_000);

    let files = uploads.list_files("alice@x").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].key, init.object_key);
    assert_eq!(files[0].size, 12_500_000);
}

#[tokio::test]
async fn s2_out_of_order_upload_with_duplicate_retry() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();

    let chunk1 = chunk_of(1, CHUNK_SIZE as usize);
    for (index, data) in [
        (2u32, chunk_of(2, 2_014_240)),
        (0u32, chunk_of(0, CHUNK_SIZE as usize)),
    ] {
        let outcome = uploads
            .upload_chunk("alice@x", &init.session_id, index, data)
            .await
            .unwrap();
        assert!(matches!(outcome, ChunkOutcome::Progress { duplicate: false, .. }));
    }

    // chunk 1 is the last missing piece: completes inline
    let outcome = uploads
        .upload_chunk("alice@x", &init.session_id, 1, chunk1.clone())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ChunkOutcome::Finalized(FinalizeOutcome::Completed(_))
    ));

    // identical retry of chunk 1 is acknowledged without new store traffic
    let outcome = uploads
        .upload_chunk("alice@x", &init.session_id, 1, chunk1)
        .await
        .unwrap();
    match outcome {
        ChunkOutcome::Progress { duplicate, received, total, .. } => {
            assert!(duplicate);
            assert_eq!((received, total), (3, 3));
        }
        other => panic!("expected duplicate ack, got {other:?}"),
    }

    assert_eq!(store.upload_part_calls(), 3);
    assert_eq!(store.complete_attempts(), 1);
}

#[tokio::test]
async fn s3_hash_mismatch_rejects_conflicting_chunk() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();

    uploads
        .upload_chunk("alice@x", &init.session_id, 0, chunk_of(b'A', CHUNK_SIZE as usize))
        .await
        .unwrap();

    let err = uploads
        .upload_chunk("alice@x", &init.session_id, 0, chunk_of(b'B', CHUNK_SIZE as usize))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::HashMismatch { index: 0 }));

    // session still accepts further chunks, and index 0 was uploaded once
    let session = uploads.sessions().get(&init.session_id).unwrap();
    assert_eq!(session.state(), SessionState::Uploading);
    assert_eq!(store.part_calls_for(&init.object_key, 1), 1);
}

#[tokio::test]
async fn s4_cancel_aborts_and_forgets_the_session() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();
    for index in 0..2u32 {
        uploads
            .upload_chunk("alice@x", &init.session_id, index, chunk_of(index as u8, CHUNK_SIZE as usize))
            .await
            .unwrap();
    }

    let outcome = uploads
        .cancel_upload("alice@x", &init.session_id)
        .await
        .unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert_eq!(store.abort_calls(), 1);

    // the session is gone
    let err = uploads
        .upload_chunk("alice@x", &init.session_id, 2, chunk_of(2, 2_014_240))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidSession(_)));

    // repeated cancel is a success ack, not an error
    let outcome = uploads
        .cancel_upload("alice@x", &init.session_id)
        .await
        .unwrap();
    assert_eq!(outcome, CancelOutcome::NotFound);
    assert_eq!(store.abort_calls(), 1);
}

#[tokio::test]
async fn complete_before_all_chunks_is_rejected() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();
    uploads
        .upload_chunk("alice@x", &init.session_id, 0, chunk_of(0, CHUNK_SIZE as usize))
        .await
        .unwrap();

    let err = uploads
        .complete_upload("alice@x", &init.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Incomplete { received: 1, total: 3 }));
}

#[tokio::test]
async fn completion_replays_are_idempotent() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 6_000_000, 2, CHUNK_SIZE)
        .await
        .unwrap();
    uploads
        .upload_chunk("alice@x", &init.session_id, 0, chunk_of(0, CHUNK_SIZE as usize))
        .await
        .unwrap();
    uploads
        .upload_chunk("alice@x", &init.session_id, 1, chunk_of(1, 757_120))
        .await
        .unwrap();

    // two replays return the identical cached echo
    for _ in 0..2 {
        let outcome = uploads
            .complete_upload("alice@x", &init.session_id)
            .await
            .unwrap();
        match outcome {
            FinalizeOutcome::Completed(done) => {
                assert_eq!(done.object_key, init.object_key);
                assert_eq!(done.total_size, 6_000_000);
            }
            other => panic!("expected cached completion, got {other:?}"),
        }
    }

    // the store only ever saw one complete_multipart
    assert_eq!(store.complete_attempts(), 1);
}

#[tokio::test]
async fn failed_finalize_reverts_and_allows_retry() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 6_000_000, 2, CHUNK_SIZE)
        .await
        .unwrap();
    uploads
        .upload_chunk("alice@x", &init.session_id, 0, chunk_of(0, CHUNK_SIZE as usize))
        .await
        .unwrap();

    store.fail_next_complete();
    let err = uploads
        .upload_chunk("alice@x", &init.session_id, 1, chunk_of(1, 757_120))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Store(_)));

    // the session reverted to a retryable state
    let session = uploads.sessions().get(&init.session_id).unwrap();
    assert_eq!(session.state(), SessionState::Initialized);

    let outcome = uploads
        .complete_upload("alice@x", &init.session_id)
        .await
        .unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Completed(_)));
    assert_eq!(store.complete_attempts(), 2);
}

#[tokio::test]
async fn init_validates_the_upload_description() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let err = uploads
        .init_upload("alice@x", "tool.exe", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::UnsupportedType(_)));

    let err = uploads
        .init_upload("alice@x", "clip.mp4", 11 * 1024 * 1024 * 1024, 3, CHUNK_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::OversizeFile { .. }));

    let err = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 13, 1024 * 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidChunkSize(_)));

    // 3 chunks of 5 MiB cannot describe a 20 MiB file
    let err = uploads
        .init_upload("alice@x", "clip.mp4", 20 * 1024 * 1024, 3, CHUNK_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidRequest(_)));

    let err = uploads
        .init_upload("", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidRequest(_)));

    let err = uploads
        .init_upload("alice@x", "../clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidRequest(_)));

    // nothing reached the store
    assert_eq!(store.upload_part_calls(), 0);
}

#[tokio::test]
async fn foreign_owners_are_rejected() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();

    let err = uploads
        .upload_chunk("bob@y", &init.session_id, 0, chunk_of(0, CHUNK_SIZE as usize))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::OwnerMismatch));

    let err = uploads
        .cancel_upload("bob@y", &init.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::OwnerMismatch));

    let err = uploads
        .complete_upload("bob@y", &init.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::OwnerMismatch));
}

#[tokio::test]
async fn chunk_index_must_be_in_range() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    let init = uploads
        .init_upload("alice@x", "clip.mp4", 12_500_000, 3, CHUNK_SIZE)
        .await
        .unwrap();

    let err = uploads
        .upload_chunk("alice@x", &init.session_id, 3, chunk_of(0, 1024))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidChunkIndex { index: 3, total: 3 }));
}

#[tokio::test]
async fn list_files_is_scoped_to_the_owner_prefix() {
    let store = MockStore::new();
    let uploads = coordinator(&store);

    store.put_object("alice@x/20250101_000000/a.mp4", vec![0u8; 10], None);
    store.put_object("alice@x/20250102_000000/b.mp4", vec![0u8; 20], None);
    store.put_object("bob@y/20250101_000000/c.mp4", vec![0u8; 30], None);
    // a key that merely starts with the same characters is not a match
    store.put_object("alice@xx/20250101_000000/d.mp4", vec![0u8; 40], None);

    let files = uploads.list_files("alice@x").await.unwrap();
    let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "alice@x/20250101_000000/a.mp4",
            "alice@x/20250102_000000/b.mp4"
        ]
    );
}
