//! Core traits and types for cuenote storage backends.
//!
//! This crate defines the abstractions shared between the local and
//! cloud storage implementations and the sync engine:
//! - `LocalStore`: the always-available persistent key-value store
//! - `CloudStore`: the opportunistic multi-device note store
//! - `Note` / `StoredVideoData`: the persisted data model
//! - `StorageError`: the error taxonomy every layer speaks

mod cloud;
mod error;
mod local;
mod types;

pub use cloud::CloudStore;
pub use error::StorageError;
pub use local::LocalStore;
pub use types::{now_millis, Note, StoredVideoData, VideoSummary};
