//! Mixlab File Storage
//!
//! Content-addressed storage for the binary objects attached to formulations (cover images).
//!
//! ## Design Principles
//!
//! - Semantic records and binary bytes are deliberately separated: a formulation only holds an
//!   opaque [`ObjectRef`] string
//! - Objects are immutable once stored; new content creates a new object
//! - Uploading identical bytes twice yields the same reference
//! - Records remain valid even when the referenced object is absent
//!
//! ## Storage Model
//!
//! ```text
//! <data_dir>/
//! └── objects/
//!     └── sha256/
//!         └── ab/
//!             └── cd/
//!                 ├── abcd3f9e…        # the bytes
//!                 └── abcd3f9e….yaml   # FileMetadata sidecar
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use mixlab_files::FilesService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::new(Path::new("mixlab_data"))?;
//! let stored = service.upload("covers/owner-1/cover.png", &[0x89, 0x50, 0x4E, 0x47])?;
//! let bytes = service.read(&stored.object_ref)?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;

pub use constants::{DEFAULT_MAX_OBJECT_BYTES, OBJECTS_FOLDER_NAME, OBJECT_REF_PREFIX};
pub use files::{FileMetadata, FilesService, ObjectRef};
pub use mixlab_uuid::Sha256Hash;

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Logical upload path was empty or unsafe
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object reference is malformed
    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    /// No object exists for the reference
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Upload exceeds the configured size limit
    #[error("Object too large: {actual_bytes} bytes (limit {max_bytes})")]
    TooLarge {
        /// Configured limit
        max_bytes: u64,
        /// Size of the rejected payload
        actual_bytes: u64,
    },

    /// Metadata sidecar could not be written or read
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_yaml::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hash error from mixlab-uuid crate
    #[error("Hash error: {0}")]
    Hash(#[from] mixlab_uuid::UuidError),
}
