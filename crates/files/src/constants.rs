//! Path and naming constants for object storage.

/// Directory (under the data directory) holding all stored objects.
pub const OBJECTS_FOLDER_NAME: &str = "objects";

/// Prefix of every object reference handed out by [`crate::FilesService`].
pub const OBJECT_REF_PREFIX: &str = "sha256:";

/// Default upload size limit (10 MiB).
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 10 * 1024 * 1024;

pub(crate) const HASH_ALGORITHM: &str = "sha256";
pub(crate) const METADATA_EXTENSION: &str = "yaml";
