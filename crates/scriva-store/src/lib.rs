//! # scriva-store
//!
//! Storage seams for the scriva pipeline:
//!
//! - [`RecordStore`] — the narrow CRUD interface over attachments and
//!   parent records that the orchestrator consumes. Persistence itself is
//!   an external collaborator; [`MemoryRecordStore`] is the in-process
//!   implementation used by the pipeline and its tests.
//! - [`StorageBackend`] — resolves stored-file references to byte buffers,
//!   with a filesystem-backed and an HTTP object-store variant satisfying
//!   the identical contract.

pub mod object_store;
pub mod records;

pub use object_store::{
    generate_storage_path, FilesystemBackend, HttpObjectBackend, StorageBackend, StorageConfig,
};
pub use records::{AttachmentPatch, MemoryRecordStore, ParentPatch, RecordStore};

// Re-export core types
pub use scriva_core::{Error, Result};
