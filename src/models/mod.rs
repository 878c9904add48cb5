//! Core data models for the media upload and streaming service.
//!
//! These entities hold the in-memory coordination state for resumable
//! uploads and the capability tokens that gate streaming reads. Nothing
//! here is persisted; a process restart starts from a clean slate.

pub mod media;
pub mod session;
pub mod token;
