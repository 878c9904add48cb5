pub mod expiring_map;
pub mod object_store;
pub mod session_table;
pub mod streaming_service;
pub mod token_cache;
pub mod upload_service;
