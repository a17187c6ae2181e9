use crate::objects::ObjectStoreError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum FormulationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("formulation not found: {0}")]
    NotFound(String),
    #[error("formulation {0} is private")]
    Private(String),
    #[error("only the owner may modify formulation {0}")]
    NotOwner(String),
    #[error("data directory unavailable: {0}")]
    DataDir(String),
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("record schema mismatch at {path}: {message}")]
    RecordSchema { path: String, message: String },
    #[error("failed to render export: {0}")]
    Render(String),
    #[error("invalid identifier: {0}")]
    Uuid(#[from] mixlab_uuid::UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] mixlab_types::TextError),
}

pub type FormulationResult<T> = std::result::Result<T, FormulationError>;
