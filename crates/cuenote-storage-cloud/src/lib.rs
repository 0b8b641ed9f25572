//! Cloud storage backend for cuenote.
//!
//! [`CloudClient`] implements the
//! [`CloudStore`](cuenote_storage_core::CloudStore) trait against the
//! notes sync REST service. The sync layer treats the cloud as a
//! replica: every call here may fail without taking local storage down.

mod client;

pub use client::CloudClient;
