//! Document store for formulation records.
//!
//! The engine only depends on [`FormulationStore`]. Two implementations ship with the crate:
//! [`FileFormulationStore`] (sharded YAML files on disk) and [`MemoryFormulationStore`]
//! (tests and embedding).
//!
//! Every `put` stamps `updatedAt` with the store's clock and keeps the first `createdAt`. A
//! single `put` is atomic: readers see the old record or the new one, never a mix.

mod file;
mod memory;

pub use file::FileFormulationStore;
pub use memory::MemoryFormulationStore;

use crate::wire::FormulationRecord;
use crate::FormulationId;
use chrono::Utc;
use std::cmp::Ordering;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How `put` treats an existing record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PutMode {
    /// Overwrite the whole record.
    #[default]
    Replace,
    /// Overlay the fields present in the new record onto the stored one.
    Merge,
}

/// Ordering of query results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderBy {
    #[default]
    UpdatedAtDesc,
    UpdatedAtAsc,
    CreatedAtDesc,
    TitleAsc,
}

pub trait FormulationStore: Send + Sync {
    fn get(&self, id: &FormulationId) -> StoreResult<Option<FormulationRecord>>;

    /// Writes `record` and returns what was persisted, server timestamps included.
    fn put(
        &self,
        id: &FormulationId,
        record: FormulationRecord,
        mode: PutMode,
    ) -> StoreResult<FormulationRecord>;

    /// Removes the record. Deleting a missing record is not an error.
    fn delete(&self, id: &FormulationId) -> StoreResult<()>;

    /// All records whose owner is `owner_id`, in the requested order.
    fn query(
        &self,
        owner_id: &str,
        order: OrderBy,
    ) -> StoreResult<Vec<(FormulationId, FormulationRecord)>>;

    fn readiness(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Applies `mode` against the stored record and stamps server timestamps.
pub(crate) fn prepare_put(
    id: &FormulationId,
    existing: Option<FormulationRecord>,
    incoming: FormulationRecord,
    mode: PutMode,
) -> FormulationRecord {
    let first_created = existing.as_ref().and_then(|r| r.created_at);
    let mut record = match (mode, existing) {
        (PutMode::Merge, Some(stored)) => stored.merge(incoming),
        _ => incoming,
    };
    let now = Utc::now();
    record.id = Some(id.to_string());
    record.created_at = first_created.or(record.created_at).or(Some(now));
    record.updated_at = Some(now);
    record
}

pub(crate) fn sort_records(records: &mut [(FormulationId, FormulationRecord)], order: OrderBy) {
    records.sort_by(|(a_id, a), (b_id, b)| {
        let primary = match order {
            OrderBy::UpdatedAtDesc => b.updated_at.cmp(&a.updated_at),
            OrderBy::UpdatedAtAsc => a.updated_at.cmp(&b.updated_at),
            OrderBy::CreatedAtDesc => b.created_at.cmp(&a.created_at),
            OrderBy::TitleAsc => title_key(a).cmp(&title_key(b)),
        };
        match primary {
            Ordering::Equal => a_id.cmp(b_id),
            other => other,
        }
    });
}

fn title_key(record: &FormulationRecord) -> String {
    record
        .title
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}
