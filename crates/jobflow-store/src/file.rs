//! A durable store that keeps one JSON file per job record under a base
//! directory, created on first use. Mirrors the read-or-default-then-write
//! pattern a read-or-default-then-write config file uses, generalized from a
//! single fixed file to one file per uuid.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use jobflow_core::{JobflowError, Result, Value};
use uuid::Uuid;

use crate::record::JobRecord;
use crate::store::{output_or_not_found, Filter, JobStore};

pub struct FileStore {
    base_dir: PathBuf,
    // Serializes read-modify-write sequences against the directory;
    // individual file operations are otherwise independent.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            base_dir: base_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn get_output(&self, uuid: Uuid) -> Result<Value> {
        output_or_not_found(self, uuid)
    }

    fn record_path(&self, uuid: Uuid) -> PathBuf {
        self.base_dir.join(format!("{uuid}.json"))
    }

    fn read_record(path: &Path) -> Result<Option<JobRecord>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobflowError::GraphConstruction(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| JobflowError::Serialization(format!("corrupt record at {}: {e}", path.display())))
    }

    fn list_records(&self) -> Result<Vec<JobRecord>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(JobflowError::GraphConstruction(format!(
                "failed to list {}: {e}",
                self.base_dir.display()
            ))),
        };
        for entry in entries {
            let entry = entry.map_err(|e| JobflowError::GraphConstruction(e.to_string()))?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(record) = Self::read_record(&entry.path())? {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }
}

impl JobStore for FileStore {
    fn connect(&mut self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            JobflowError::GraphConstruction(format!("failed to create {}: {e}", self.base_dir.display()))
        })
    }

    fn update(&self, record: JobRecord) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            JobflowError::GraphConstruction(format!("failed to create {}: {e}", self.base_dir.display()))
        })?;
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| JobflowError::Serialization(e.to_string()))?;
        fs::write(self.record_path(record.uuid), json)
            .map_err(|e| JobflowError::GraphConstruction(format!("failed to write record: {e}")))
    }

    fn query_one(&self, uuid: Uuid) -> Result<Option<JobRecord>> {
        let _guard = self.lock.lock().unwrap();
        Self::read_record(&self.record_path(uuid))
    }

    fn query(&self, filter: &Filter<'_>) -> Result<Vec<JobRecord>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.list_records()?.into_iter().filter(|r| filter(r)).collect())
    }

    fn remove(&self, uuid: Uuid) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        match fs::remove_file(self.record_path(uuid)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobflowError::GraphConstruction(format!("failed to remove record: {e}"))),
        }
    }

    fn count(&self) -> Result<usize> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.list_records()?.len())
    }

    fn distinct(&self, field: &str) -> Result<Vec<Value>> {
        let _guard = self.lock.lock().unwrap();
        let mut seen = Vec::new();
        for record in self.list_records()? {
            if let Some(mapping) = record.output.as_mapping() {
                if let Some(value) = mapping.get(field) {
                    if !seen.contains(value) {
                        seen.push(value.clone());
                    }
                }
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_query_one_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        store.connect().unwrap();
        let uuid = Uuid::new_v4();
        store.update(JobRecord::success(uuid, 0, "a", Value::from("ok"))).unwrap();
        let record = store.query_one(uuid).unwrap().unwrap();
        assert_eq!(record.output, Value::from("ok"));
    }

    #[test]
    fn query_one_on_fresh_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.query_one(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let uuid = Uuid::new_v4();
        store.remove(uuid).unwrap();
        store.update(JobRecord::success(uuid, 0, "a", Value::Null)).unwrap();
        store.remove(uuid).unwrap();
        store.remove(uuid).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
