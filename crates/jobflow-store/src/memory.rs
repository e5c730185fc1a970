//! An in-process, non-persistent store. The default main store for a run
//! that doesn't need its results to outlive the process, and the
//! workhorse behind most of this crate's tests.

use std::collections::HashMap;
use std::sync::RwLock;

use jobflow_core::{Result, Value};
use uuid::Uuid;

use crate::record::JobRecord;
use crate::store::{output_or_not_found, Filter, JobStore};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn get_output(&self, uuid: Uuid) -> Result<Value> {
        output_or_not_found(self, uuid)
    }
}

impl JobStore for MemoryStore {
    fn update(&self, record: JobRecord) -> Result<()> {
        self.records.write().unwrap().insert(record.uuid, record);
        Ok(())
    }

    fn query_one(&self, uuid: Uuid) -> Result<Option<JobRecord>> {
        Ok(self.records.read().unwrap().get(&uuid).cloned())
    }

    fn query(&self, filter: &Filter<'_>) -> Result<Vec<JobRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect())
    }

    fn remove(&self, uuid: Uuid) -> Result<()> {
        self.records.write().unwrap().remove(&uuid);
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    fn distinct(&self, field: &str) -> Result<Vec<Value>> {
        let records = self.records.read().unwrap();
        let mut seen = Vec::new();
        for record in records.values() {
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
    fn update_then_query_one_round_trips() {
        let store = MemoryStore::new();
        let uuid = Uuid::new_v4();
        store.update(JobRecord::success(uuid, 0, "a", Value::from(1i64))).unwrap();
        let record = store.query_one(uuid).unwrap().unwrap();
        assert_eq!(record.output, Value::from(1i64));
    }

    #[test]
    fn get_output_on_missing_uuid_errors() {
        let store = MemoryStore::new();
        let err = store.get_output(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, jobflow_core::JobflowError::OutputNotFound { .. }));
    }

    #[test]
    fn remove_drops_the_record() {
        let store = MemoryStore::new();
        let uuid = Uuid::new_v4();
        store.update(JobRecord::success(uuid, 0, "a", Value::Null)).unwrap();
        store.remove(uuid).unwrap();
        assert!(store.query_one(uuid).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn distinct_collects_unique_field_values_across_mapping_outputs() {
        let store = MemoryStore::new();
        store
            .update(JobRecord::success(
                Uuid::new_v4(),
                0,
                "a",
                Value::mapping([("kind", Value::from("fetch"))]),
            ))
            .unwrap();
        store
            .update(JobRecord::success(
                Uuid::new_v4(),
                1,
                "b",
                Value::mapping([("kind", Value::from("fetch"))]),
            ))
            .unwrap();
        store
            .update(JobRecord::success(
                Uuid::new_v4(),
                2,
                "c",
                Value::mapping([("kind", Value::from("transform"))]),
            ))
            .unwrap();
        let kinds = store.distinct("kind").unwrap();
        assert_eq!(kinds.len(), 2);
    }
}
