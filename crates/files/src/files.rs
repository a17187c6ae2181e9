//! Content-addressed object storage implementation.
//!
//! # Content Addressing
//!
//! Objects are stored using their SHA-256 hash as the identifier. This provides:
//!
//! - **Deduplication**: identical uploads are stored once and share a reference
//! - **Integrity**: stored bytes can be verified against their hash
//! - **Deterministic paths**: the same content always produces the same path
//!
//! The logical upload path supplied by the caller (for example
//! `covers/<owner>/<formulation>/cover.png`) is recorded in the metadata sidecar for
//! auditing; it does not influence where the bytes live.

use crate::constants::{HASH_ALGORITHM, METADATA_EXTENSION};
use crate::{FilesError, DEFAULT_MAX_OBJECT_BYTES, OBJECTS_FOLDER_NAME, OBJECT_REF_PREFIX};
use chrono::{DateTime, Utc};
use mixlab_types::NonEmptyText;
use mixlab_uuid::Sha256Hash;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Opaque reference to a stored object, of the form `sha256:<hex digest>`.
///
/// Formulations store this value verbatim and never inspect it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectRef(Sha256Hash);

impl ObjectRef {
    /// Parses a reference previously returned by [`FilesService::upload`].
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidReference`] when the prefix or digest is malformed.
    pub fn parse(input: &str) -> Result<Self, FilesError> {
        let digest = input
            .trim()
            .strip_prefix(OBJECT_REF_PREFIX)
            .ok_or_else(|| FilesError::InvalidReference(input.to_owned()))?;
        let hash =
            Sha256Hash::parse(digest).map_err(|_| FilesError::InvalidReference(input.to_owned()))?;
        Ok(Self(hash))
    }

    /// Returns the content hash behind this reference.
    pub fn hash(&self) -> &Sha256Hash {
        &self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", OBJECT_REF_PREFIX, self.0)
    }
}

impl TryFrom<String> for ObjectRef {
    type Error = FilesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ObjectRef::parse(&value)
    }
}

impl From<ObjectRef> for String {
    fn from(value: ObjectRef) -> Self {
        value.to_string()
    }
}

/// Metadata for a stored object.
///
/// Serialised to YAML and stored alongside the binary object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Reference handed back to callers
    pub object_ref: ObjectRef,

    /// Hashing algorithm used (always "sha256")
    pub hash_algorithm: NonEmptyText,

    /// Path relative to the data directory where the bytes are stored
    pub relative_path: NonEmptyText,

    /// Size of the object in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), best-effort
    pub media_type: Option<NonEmptyText>,

    /// Logical path the caller uploaded to
    pub logical_path: NonEmptyText,

    /// Final segment of the logical path
    pub original_filename: NonEmptyText,

    /// UTC timestamp when the object was first stored
    pub stored_at: DateTime<Utc>,
}

/// Service for storing and retrieving objects under one data directory.
#[derive(Debug, Clone)]
pub struct FilesService {
    root_directory: PathBuf,
    max_bytes: u64,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRootDirectory`] if the directory does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self {
            root_directory,
            max_bytes: DEFAULT_MAX_OBJECT_BYTES,
        })
    }

    /// Overrides the upload size limit.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the configured upload size limit.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Stores `bytes` and returns the metadata of the stored object.
    ///
    /// Uploading content that is already stored returns the existing metadata unchanged, so
    /// repeated uploads of the same cover are harmless.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `logical_path` is empty or attempts traversal
    /// - the payload exceeds the size limit
    /// - the object or its sidecar cannot be written
    pub fn upload(&self, logical_path: &str, bytes: &[u8]) -> Result<FileMetadata, FilesError> {
        let logical_path = validate_logical_path(logical_path)?;

        let size_bytes = bytes.len() as u64;
        if size_bytes > self.max_bytes {
            return Err(FilesError::TooLarge {
                max_bytes: self.max_bytes,
                actual_bytes: size_bytes,
            });
        }

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let hash = Sha256Hash::parse(&hex::encode(digest))?;
        let object_ref = ObjectRef(hash);

        let storage_path = self.storage_path(&object_ref);
        if storage_path.is_file() {
            if let Ok(existing) = self.metadata(&object_ref) {
                tracing::debug!("object {} already stored", object_ref);
                return Ok(existing);
            }
        }

        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create storage directory {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }

        write_atomic(&storage_path, bytes)?;

        let original_filename = logical_path
            .as_str()
            .rsplit('/')
            .next()
            .and_then(|name| NonEmptyText::new(name).ok())
            .unwrap_or_else(|| logical_path.clone());

        let media_type = infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        let metadata = FileMetadata {
            relative_path: NonEmptyText::new(self.relative_path(&object_ref))
                .map_err(|e| FilesError::InvalidPath(e.to_string()))?,
            hash_algorithm: NonEmptyText::new(HASH_ALGORITHM)
                .map_err(|e| FilesError::InvalidPath(e.to_string()))?,
            object_ref,
            size_bytes,
            media_type,
            logical_path,
            original_filename,
            stored_at: Utc::now(),
        };

        let sidecar = serde_yaml::to_string(&metadata)?;
        write_atomic(&self.metadata_path(&metadata.object_ref), sidecar.as_bytes())?;

        tracing::info!(
            "stored object {} ({} bytes)",
            metadata.object_ref,
            metadata.size_bytes
        );
        Ok(metadata)
    }

    /// Retrieves the bytes of a stored object.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if nothing is stored for the reference, or
    /// [`FilesError::Io`] when reading fails.
    pub fn read(&self, object_ref: &ObjectRef) -> Result<Vec<u8>, FilesError> {
        let storage_path = self.storage_path(object_ref);
        if !storage_path.is_file() {
            return Err(FilesError::NotFound(object_ref.to_string()));
        }

        fs::read(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read object from {}: {}", storage_path.display(), e),
            ))
        })
    }

    /// Loads the metadata sidecar of a stored object.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] when the sidecar is missing.
    pub fn metadata(&self, object_ref: &ObjectRef) -> Result<FileMetadata, FilesError> {
        let path = self.metadata_path(object_ref);
        if !path.is_file() {
            return Err(FilesError::NotFound(object_ref.to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Resolves a reference to a `file://` URL of the stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] when nothing is stored for the reference.
    pub fn resolve_url(&self, object_ref: &ObjectRef) -> Result<String, FilesError> {
        let storage_path = self.storage_path(object_ref);
        if !storage_path.is_file() {
            return Err(FilesError::NotFound(object_ref.to_string()));
        }
        Ok(format!("file://{}", storage_path.display()))
    }

    fn objects_directory(&self) -> PathBuf {
        self.root_directory.join(OBJECTS_FOLDER_NAME)
    }

    fn storage_path(&self, object_ref: &ObjectRef) -> PathBuf {
        object_ref
            .hash()
            .sharded_path(&self.objects_directory().join(HASH_ALGORITHM))
    }

    fn metadata_path(&self, object_ref: &ObjectRef) -> PathBuf {
        self.storage_path(object_ref)
            .with_extension(METADATA_EXTENSION)
    }

    /// Returns `objects/sha256/<shard1>/<shard2>/<hash>`.
    fn relative_path(&self, object_ref: &ObjectRef) -> String {
        let hex = object_ref.hash().as_str();
        format!(
            "{}/{}/{}/{}/{}",
            OBJECTS_FOLDER_NAME,
            HASH_ALGORITHM,
            &hex[0..2],
            &hex[2..4],
            hex
        )
    }
}

fn validate_logical_path(input: &str) -> Result<NonEmptyText, FilesError> {
    let path = NonEmptyText::new(input)
        .map_err(|_| FilesError::InvalidPath("upload path cannot be empty".into()))?;

    let unsafe_segment = path
        .as_str()
        .split('/')
        .any(|segment| segment == ".." || segment == ".");
    if path.as_str().starts_with('/') || path.as_str().contains('\\') || unsafe_segment {
        return Err(FilesError::InvalidPath(format!(
            "upload path must be relative without traversal: {}",
            path
        )));
    }

    Ok(path)
}

/// Writes to a sibling temp file and renames it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FilesError> {
    let tmp = path.with_extension("partial");
    fs::write(&tmp, bytes).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", tmp.display(), e),
        ))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        FilesError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to move object into {}: {}", path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn test_service() -> (TempDir, FilesService) {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();
        (temp, service)
    }

    #[test]
    fn test_files_service_root_not_exists() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("non-existent");

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_files_service_root_not_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file.txt");
        fs::write(&root, "not a directory").unwrap();

        let service = FilesService::new(&root);

        assert!(matches!(service, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_upload_success() {
        let (_temp, service) = test_service();

        let metadata = service
            .upload("covers/user-1/recipe-1/cover.txt", b"Hello, World!")
            .unwrap();

        assert_eq!(metadata.hash_algorithm.as_str(), "sha256");
        assert_eq!(metadata.size_bytes, 13);
        assert_eq!(metadata.original_filename.as_str(), "cover.txt");
        assert_eq!(metadata.object_ref.hash().as_str().len(), 64);
        assert!(metadata.object_ref.to_string().starts_with("sha256:"));

        let stored_path = service.storage_path(&metadata.object_ref);
        assert_eq!(fs::read(stored_path).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_upload_same_content_is_idempotent() {
        let (_temp, service) = test_service();

        let first = service.upload("covers/a/one.png", &PNG_HEADER).unwrap();
        let second = service.upload("covers/b/two.png", &PNG_HEADER).unwrap();

        assert_eq!(first.object_ref, second.object_ref);
        assert_eq!(second.original_filename.as_str(), "one.png");
    }

    #[test]
    fn test_upload_detects_media_type() {
        let (_temp, service) = test_service();

        let metadata = service.upload("covers/x/cover.png", &PNG_HEADER).unwrap();

        assert_eq!(
            metadata.media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn test_upload_rejects_traversal_and_empty_paths() {
        let (_temp, service) = test_service();

        assert!(matches!(
            service.upload("../escape.png", b"x"),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(matches!(
            service.upload("/abs/cover.png", b"x"),
            Err(FilesError::InvalidPath(_))
        ));
        assert!(matches!(
            service.upload("   ", b"x"),
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_upload_enforces_size_limit() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap().with_max_bytes(4);

        let result = service.upload("covers/big.bin", b"12345");

        assert!(matches!(
            result,
            Err(FilesError::TooLarge {
                max_bytes: 4,
                actual_bytes: 5
            })
        ));
    }

    #[test]
    fn test_read_round_trip_and_metadata_sidecar() {
        let (_temp, service) = test_service();
        let binary: Vec<u8> = (0..=255).collect();

        let metadata = service.upload("covers/bin/data.bin", &binary).unwrap();

        assert_eq!(service.read(&metadata.object_ref).unwrap(), binary);
        assert_eq!(service.metadata(&metadata.object_ref).unwrap(), metadata);
    }

    #[test]
    fn test_read_missing_object() {
        let (_temp, service) = test_service();
        let missing = ObjectRef::parse(&format!("sha256:{}", "ab".repeat(32))).unwrap();

        assert!(matches!(
            service.read(&missing),
            Err(FilesError::NotFound(_))
        ));
        assert!(matches!(
            service.resolve_url(&missing),
            Err(FilesError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_url_points_at_sharded_path() {
        let (_temp, service) = test_service();
        let metadata = service.upload("covers/c.txt", b"abc").unwrap();
        let hex = metadata.object_ref.hash().as_str().to_owned();

        let url = service.resolve_url(&metadata.object_ref).unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.contains(&format!("/objects/sha256/{}/{}/", &hex[0..2], &hex[2..4])));
        assert!(url.ends_with(&hex));
    }

    #[test]
    fn test_object_ref_parse() {
        assert!(ObjectRef::parse("sha256:abc").is_err());
        assert!(ObjectRef::parse("md5:abcdef").is_err());
        let valid = format!("sha256:{}", "0f".repeat(32));
        assert_eq!(ObjectRef::parse(&valid).unwrap().to_string(), valid);
    }

    #[test]
    fn test_file_metadata_serialization() {
        let (_temp, service) = test_service();
        let metadata = service.upload("covers/doc.txt", b"document").unwrap();

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("sha256:"));
        assert!(json.contains("doc.txt"));
    }
}
