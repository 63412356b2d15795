//! # dfesync storage
//!
//! Byte-level backends underneath the dfesync record logs.
//!
//! A backend is an **opaque append-only byte store**: it knows nothing about
//! the framing, checksums, or CBOR records the stores write into it. The
//! record log in `dfesync_store` owns all interpretation.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway engines
//! - [`FileBackend`] - One file per log in the data directory
//!
//! ## Example
//!
//! ```rust
//! use dfesync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"nsu 000000000000001").unwrap();
//! assert_eq!(backend.read_at(offset, 3).unwrap(), b"nsu");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
