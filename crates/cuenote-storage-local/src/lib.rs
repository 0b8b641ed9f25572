//! Local storage backends for cuenote.
//!
//! [`FileStore`] persists each key as a JSON file under a data
//! directory. [`MemoryStore`] is a volatile stand-in used by tests and
//! scratch tooling. Both implement the
//! [`LocalStore`](cuenote_storage_core::LocalStore) trait.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
