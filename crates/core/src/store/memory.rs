//! In-process document store.

use super::{prepare_put, sort_records, FormulationStore, OrderBy, PutMode, StoreError, StoreResult};
use crate::wire::FormulationRecord;
use crate::FormulationId;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryFormulationStore {
    records: RwLock<BTreeMap<FormulationId, FormulationRecord>>,
}

impl MemoryFormulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".into())
}

impl FormulationStore for MemoryFormulationStore {
    fn get(&self, id: &FormulationId) -> StoreResult<Option<FormulationRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(id).cloned())
    }

    fn put(
        &self,
        id: &FormulationId,
        record: FormulationRecord,
        mode: PutMode,
    ) -> StoreResult<FormulationRecord> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let stored = prepare_put(id, records.get(id).cloned(), record, mode);
        records.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete(&self, id: &FormulationId) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.remove(id);
        Ok(())
    }

    fn query(
        &self,
        owner_id: &str,
        order: OrderBy,
    ) -> StoreResult<Vec<(FormulationId, FormulationRecord)>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut matching: Vec<_> = records
            .iter()
            .filter(|(_, record)| record.owner_id() == Some(owner_id))
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        sort_records(&mut matching, order);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryFormulationStore::new();
        let id = FormulationId::new();
        let record = FormulationRecord {
            title: Some("Sea".into()),
            created_by: Some("u1".into()),
            ..Default::default()
        };

        let stored = store.put(&id, record, PutMode::Replace).unwrap();
        assert!(stored.updated_at.is_some());
        assert_eq!(store.get(&id).unwrap(), Some(stored));
        assert_eq!(store.query("u1", OrderBy::UpdatedAtDesc).unwrap().len(), 1);
        assert!(store.query("u2", OrderBy::UpdatedAtDesc).unwrap().is_empty());

        store.delete(&id).unwrap();
        assert!(store.is_empty());
    }
}
