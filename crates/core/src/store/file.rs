//! Sharded YAML document store.
//!
//! ```text
//! <data_dir>/formulations/<s1>/<s2>/<uuid>/formulation.yaml
//! ```
//! where `s1`/`s2` are the first four hex characters of the formulation id.

use super::{prepare_put, sort_records, FormulationStore, OrderBy, PutMode, StoreError, StoreResult};
use crate::constants::FORMULATION_FILENAME;
use crate::wire::FormulationRecord;
use crate::FormulationId;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FileFormulationStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFormulationStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            StoreError::Io(format!("failed to create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &FormulationId) -> PathBuf {
        id.sharded_dir(&self.root).join(FORMULATION_FILENAME)
    }

    fn read_record(path: &Path) -> StoreResult<Option<FormulationRecord>> {
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("failed to read {}: {}", path.display(), e)))?;
        FormulationRecord::parse_yaml(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    fn write_record(path: &Path, record: &FormulationRecord) -> StoreResult<()> {
        let text = record
            .render_yaml()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let temp_path = path.with_extension("yaml.partial");
        fs::write(&temp_path, text).map_err(|e| {
            StoreError::Io(format!("failed to write {}: {}", temp_path.display(), e))
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(format!("failed to replace {}: {}", path.display(), e))
        })
    }

    /// Every record directory under the shard tree.
    fn record_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let Ok(s1_iter) = fs::read_dir(&self.root) else {
            return dirs;
        };
        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }
            let Ok(s2_iter) = fs::read_dir(&s1_path) else {
                continue;
            };
            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }
                let Ok(id_iter) = fs::read_dir(&s2_path) else {
                    continue;
                };
                dirs.extend(
                    id_iter
                        .flatten()
                        .map(|entry| entry.path())
                        .filter(|path| path.is_dir()),
                );
            }
        }
        dirs
    }
}

impl FormulationStore for FileFormulationStore {
    fn get(&self, id: &FormulationId) -> StoreResult<Option<FormulationRecord>> {
        Self::read_record(&self.record_path(id))
    }

    fn put(
        &self,
        id: &FormulationId,
        record: FormulationRecord,
        mode: PutMode,
    ) -> StoreResult<FormulationRecord> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("store write lock poisoned".into()))?;

        let path = self.record_path(id);
        let existing = match mode {
            PutMode::Merge => Self::read_record(&path)?,
            PutMode::Replace => Self::read_record(&path).ok().flatten(),
        };
        let stored = prepare_put(id, existing, record, mode);
        Self::write_record(&path, &stored)?;
        Ok(stored)
    }

    fn delete(&self, id: &FormulationId) -> StoreResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("store write lock poisoned".into()))?;

        let dir = id.sharded_dir(&self.root);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("failed to remove {}: {}", dir.display(), e)))
    }

    fn query(
        &self,
        owner_id: &str,
        order: OrderBy,
    ) -> StoreResult<Vec<(FormulationId, FormulationRecord)>> {
        let mut records = Vec::new();

        for dir in self.record_dirs() {
            let Some(id) = dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| FormulationId::parse(name).ok())
            else {
                continue;
            };
            let path = dir.join(FORMULATION_FILENAME);
            match Self::read_record(&path) {
                Ok(Some(record)) if record.owner_id() == Some(owner_id) => {
                    records.push((id, record));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("skipping unreadable formulation record: {}", e);
                }
            }
        }

        sort_records(&mut records, order);
        Ok(records)
    }

    fn readiness(&self) -> StoreResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "store directory missing: {}",
                self.root.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(owner: &str, title: &str) -> FormulationRecord {
        FormulationRecord {
            title: Some(title.into()),
            created_by: Some(owner.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_put_writes_sharded_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path().join("formulations")).unwrap();
        let id = FormulationId::parse("550e8400e29b41d4a716446655440000").unwrap();

        store.put(&id, record("u1", "Sea"), PutMode::Replace).unwrap();

        let path = temp_dir
            .path()
            .join("formulations/55/0e/550e8400e29b41d4a716446655440000/formulation.yaml");
        assert!(path.is_file());
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("title: Sea"));
        assert!(text.contains("updatedAt:"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();
        assert!(store.get(&FormulationId::new()).unwrap().is_none());
    }

    #[test]
    fn test_merge_put_overlays_fields() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();
        let id = FormulationId::new();

        let first = store.put(&id, record("u1", "Sea"), PutMode::Replace).unwrap();
        let patch = FormulationRecord {
            note: Some("notes".into()),
            ..Default::default()
        };
        let second = store.put(&id, patch, PutMode::Merge).unwrap();

        assert_eq!(second.title.as_deref(), Some("Sea"));
        assert_eq!(second.note.as_deref(), Some("notes"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.get(&id).unwrap(), Some(second));
    }

    #[test]
    fn test_query_filters_by_owner_and_orders_by_update() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();

        let older = FormulationId::new();
        let newer = FormulationId::new();
        let foreign = FormulationId::new();
        store.put(&older, record("u1", "Older"), PutMode::Replace).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.put(&newer, record("u1", "Newer"), PutMode::Replace).unwrap();
        store.put(&foreign, record("u2", "Foreign"), PutMode::Replace).unwrap();

        let mine = store.query("u1", OrderBy::UpdatedAtDesc).unwrap();
        let ids: Vec<_> = mine.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[test]
    fn test_query_skips_corrupt_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();
        let good = FormulationId::new();
        store.put(&good, record("u1", "Good"), PutMode::Replace).unwrap();

        let bad = FormulationId::new();
        let bad_dir = bad.sharded_dir(temp_dir.path());
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(FORMULATION_FILENAME), "ingredients: 12\n").unwrap();

        let mine = store.query("u1", OrderBy::UpdatedAtDesc).unwrap();
        assert_eq!(mine.len(), 1);
        assert!(matches!(store.get(&bad), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();
        let id = FormulationId::new();
        store.put(&id, record("u1", "Gone"), PutMode::Replace).unwrap();

        store.delete(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
        store.delete(&id).unwrap();
    }

    #[test]
    fn test_no_partial_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileFormulationStore::open(temp_dir.path()).unwrap();
        let id = FormulationId::new();
        store.put(&id, record("u1", "Clean"), PutMode::Replace).unwrap();

        let entries: Vec<_> = fs::read_dir(id.sharded_dir(temp_dir.path()))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec![FORMULATION_FILENAME.to_string()]);
    }
}
