//! # Mixlab Core
//!
//! Core business logic for the Mixlab formulation workbench.
//!
//! This crate contains the formulation engine and its storage seams:
//! - The [`Formulation`] aggregate, its permissive edit operations and batch commands
//! - Derivation of percentages and volumes for ratio and percentage formulations
//! - Status, visibility and duplication rules
//! - Self-contained export snapshots with JSON and Markdown renderers
//! - The [`FormulationStore`] and [`ObjectStore`] traits with file-backed implementations
//! - [`FormulationService`], which enforces ownership and visibility on every operation
//!
//! **No API concerns**: authentication, HTTP servers and CLI parsing belong in `api-shared`,
//! `api-rest` and `mixlab-cli`.

pub mod coerce;
pub mod config;
pub mod constants;
pub mod derive;
mod error;
pub mod export;
pub mod formulation;
pub mod identity;
pub mod lifecycle;
pub mod objects;
pub mod render;
pub mod row;
pub mod service;
pub mod session;
pub mod store;
pub mod wire;

pub use config::CoreConfig;
pub use derive::{Derivation, DisplayRow, Totals};
pub use error::{FormulationError, FormulationResult};
pub use export::{ExportFooter, ExportRow, ExportSnapshot, ExportTotals, InlineImage};
pub use formulation::{
    parse_tags, EditCommand, EditOutcome, Formulation, FormulationStatus, MetadataPatch,
};
pub use identity::{Actor, Owner};
pub use lifecycle::Visibility;
pub use objects::{ObjectStore, ObjectStoreError, StoredObject};
pub use render::{ExportFormat, JsonRenderer, MarkdownRenderer, RenderedDocument, SnapshotRenderer};
pub use row::{ComponentRow, QuantityBasis, QuantitySpec, RowId, RowPatch};
pub use service::{CreateOptions, FormulationService};
pub use session::{EditorSession, LoadOutcome, LoadTicket};
pub use store::{
    FileFormulationStore, FormulationStore, MemoryFormulationStore, OrderBy, PutMode, StoreError,
};
pub use wire::{FormulationRecord, IngredientRecord};

pub use mixlab_types::{EmailAddress, NonEmptyText, TextError};

/// Identifier of a formulation: a canonical 32-hex UUID.
pub type FormulationId = mixlab_uuid::ShardableUuid;
