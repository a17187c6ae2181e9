//! Binary object storage used for cover images.

use mixlab_files::{FilesError, FilesService, ObjectRef};
use mixlab_types::NonEmptyText;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object too large: {actual_bytes} bytes (limit {max_bytes})")]
    TooLarge { max_bytes: u64, actual_bytes: u64 },
    #[error("invalid object request: {0}")]
    Invalid(String),
    #[error("object backend failure: {0}")]
    Backend(String),
}

impl From<FilesError> for ObjectStoreError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::NotFound(r) => Self::NotFound(r),
            FilesError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::TooLarge {
                max_bytes,
                actual_bytes,
            },
            FilesError::InvalidPath(msg) | FilesError::InvalidReference(msg) => Self::Invalid(msg),
            FilesError::Hash(e) => Self::Invalid(e.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Bytes fetched back from the object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

/// Storage for uploaded binaries.
///
/// References are opaque strings; formulations store them verbatim.
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under a logical path and returns a reference to them.
    fn upload(&self, logical_path: &str, bytes: &[u8]) -> Result<String, ObjectStoreError>;

    /// Resolves a reference to a URL a client can fetch.
    fn resolve_url(&self, reference: &str) -> Result<String, ObjectStoreError>;

    /// Reads the bytes behind a reference.
    fn fetch(&self, reference: &str) -> Result<StoredObject, ObjectStoreError>;
}

impl ObjectStore for FilesService {
    fn upload(&self, logical_path: &str, bytes: &[u8]) -> Result<String, ObjectStoreError> {
        let metadata = FilesService::upload(self, logical_path, bytes)?;
        Ok(metadata.object_ref.to_string())
    }

    fn resolve_url(&self, reference: &str) -> Result<String, ObjectStoreError> {
        let object_ref = ObjectRef::parse(reference)?;
        Ok(FilesService::resolve_url(self, &object_ref)?)
    }

    fn fetch(&self, reference: &str) -> Result<StoredObject, ObjectStoreError> {
        let object_ref = ObjectRef::parse(reference)?;
        let bytes = self.read(&object_ref)?;
        let media_type = self
            .metadata(&object_ref)
            .ok()
            .and_then(|m| m.media_type)
            .map(NonEmptyText::into_inner);
        Ok(StoredObject { bytes, media_type })
    }
}
