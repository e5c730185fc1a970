//! Routes a job's output to its main store plus whichever named
//! auxiliary stores it requested, and resolves
//! [`OutputReference`]s back out of whichever store(s) they're allowed to
//! come from.

use std::collections::{BTreeMap, HashMap};

use jobflow_core::{JobflowError, OutputReference, Result, Value};
use uuid::Uuid;

use crate::record::{blob_marker, is_blob_marker, JobRecord};
use crate::store::JobStore;

/// A main store plus zero or more named auxiliary stores. Every job's
/// output always lands in the main store; `store_names` on the job
/// additionally extracts matching top-level subtrees into those named
/// stores, leaving a blob marker behind in the main record.
pub struct StoreRouter {
    main: Box<dyn JobStore>,
    auxiliary: HashMap<String, Box<dyn JobStore>>,
}

/// Restricts which auxiliary stores a [`StoreRouter::get_output`] call is
/// allowed to expand blob markers from. Unloaded blobs are left as markers
/// in the returned value — loading may be limited to a subset
/// of store names".
#[derive(Debug, Clone, Default)]
pub enum Load {
    #[default]
    All,
    Only(Vec<String>),
    None,
}

impl StoreRouter {
    pub fn new(main: Box<dyn JobStore>) -> Self {
        StoreRouter {
            main,
            auxiliary: HashMap::new(),
        }
    }

    pub fn with_store(mut self, name: impl Into<String>, store: Box<dyn JobStore>) -> Self {
        self.auxiliary.insert(name.into(), store);
        self
    }

    pub fn connect(&mut self) -> Result<()> {
        self.main.connect()?;
        for store in self.auxiliary.values_mut() {
            store.connect()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.main.close()?;
        for store in self.auxiliary.values_mut() {
            store.close()?;
        }
        Ok(())
    }

    /// Persist `record`: extract every top-level output
    /// key named in `store_names` into its named auxiliary store under a
    /// fresh blob uuid, replace it in `record.output` with a blob marker,
    /// then insert the rewritten record into the main store. Blobs are
    /// written before the main record that references them (shared
    /// resource discipline").
    pub fn save(&self, mut record: JobRecord, store_names: &BTreeMap<String, String>) -> Result<()> {
        if store_names.is_empty() {
            self.main.update(record)?;
            return Ok(());
        }
        let Value::Mapping(mut fields) = record.output else {
            self.main.update(record)?;
            return Ok(());
        };
        for (key, store_name) in store_names {
            let Some(subtree) = fields.remove(key) else {
                continue;
            };
            let store = self.auxiliary.get(store_name).ok_or_else(|| {
                JobflowError::GraphConstruction(format!("unknown store '{store_name}'"))
            })?;
            let blob_uuid = Uuid::new_v4();
            let blob_record = JobRecord::success(blob_uuid, 1, format!("{}.{key}", record.name), subtree);
            store.update(blob_record)?;
            fields.insert(key.clone(), blob_marker(blob_uuid, store_name.clone()));
        }
        record.output = Value::Mapping(fields);
        self.main.update(record)?;
        Ok(())
    }

    /// Remove `(uuid, *)` from the main store, plus every blob its last
    /// record referenced from their auxiliary stores.
    pub fn remove(&self, uuid: Uuid) -> Result<()> {
        if let Some(record) = self.main.query_one(uuid)? {
            for (blob_uuid, store_name) in collect_blob_markers(&record.output) {
                if let Some(store) = self.auxiliary.get(store_name) {
                    store.remove(blob_uuid)?;
                }
            }
        }
        self.main.remove(uuid)?;
        Ok(())
    }

    /// Resolve a reference's target value: fetch
    /// `reference.uuid`'s record from whichever store(s) `source_stores`
    /// names (main store if unset), expand blob markers (respecting
    /// `load`), then walk `reference.path` into the reconstructed value.
    pub fn get_output(&self, reference: &OutputReference, load: &Load) -> Result<Value> {
        let record = self.fetch_record(reference)?;
        let record = record.ok_or(JobflowError::OutputNotFound {
            uuid: reference.uuid,
            index: None,
        })?;
        if let Some(err) = &record.error {
            return Err(JobflowError::JobFailure {
                uuid: reference.uuid,
                index: record.index,
                source: err.clone().into(),
            });
        }
        let value = self.expand_blobs(record.output, load)?;
        if reference.path.is_empty() {
            Ok(value)
        } else {
            jobflow_core::deref_path(&value, reference.uuid, &reference.path)
        }
    }

    fn fetch_record(&self, reference: &OutputReference) -> Result<Option<JobRecord>> {
        match &reference.source_stores {
            Some(names) => {
                for name in names {
                    let store = self.auxiliary.get(name).ok_or_else(|| {
                        JobflowError::GraphConstruction(format!("unknown store '{name}'"))
                    })?;
                    if let Some(record) = store.query_one(reference.uuid)? {
                        return Ok(Some(record));
                    }
                }
                Ok(None)
            }
            None => self.main.query_one(reference.uuid),
        }
    }

    fn expand_blobs(&self, value: Value, load: &Load) -> Result<Value> {
        if let Some((blob_uuid, store_name)) = is_blob_marker(&value) {
            if !self.may_load(store_name, load) {
                return Ok(value);
            }
            let store = self.auxiliary.get(store_name).ok_or_else(|| {
                JobflowError::GraphConstruction(format!("unknown store '{store_name}'"))
            })?;
            return match store.query_one(blob_uuid)? {
                Some(blob_record) => self.expand_blobs(blob_record.output, load),
                None => Ok(value),
            };
        }
        Ok(match value {
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|v| self.expand_blobs(v, load))
                    .collect::<Result<_>>()?,
            ),
            Value::Set(items) => Value::Set(
                items
                    .into_iter()
                    .map(|v| self.expand_blobs(v, load))
                    .collect::<Result<_>>()?,
            ),
            Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k, self.expand_blobs(v, load)?);
                }
                Value::Mapping(out)
            }
            other => other,
        })
    }

    fn may_load(&self, store_name: &str, load: &Load) -> bool {
        match load {
            Load::All => true,
            Load::None => false,
            Load::Only(names) => names.iter().any(|n| n == store_name),
        }
    }
}

fn collect_blob_markers(value: &Value) -> Vec<(Uuid, &str)> {
    let mut out = Vec::new();
    collect_blob_markers_into(value, &mut out);
    out
}

fn collect_blob_markers_into<'a>(value: &'a Value, out: &mut Vec<(Uuid, &'a str)>) {
    if let Some(marker) = is_blob_marker(value) {
        out.push(marker);
        return;
    }
    match value {
        Value::Sequence(items) | Value::Set(items) => {
            for item in items {
                collect_blob_markers_into(item, out);
            }
        }
        Value::Mapping(map) => {
            for v in map.values() {
                collect_blob_markers_into(v, out);
            }
        }
        Value::Typed(obj) => {
            for v in obj.fields.values() {
                collect_blob_markers_into(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn router() -> StoreRouter {
        StoreRouter::new(Box::new(MemoryStore::new())).with_store("aux", Box::new(MemoryStore::new()))
    }

    #[test]
    fn save_without_store_names_only_hits_main() {
        let router = router();
        let uuid = Uuid::new_v4();
        router
            .save(JobRecord::success(uuid, 1, "a", Value::from(1i64)), &BTreeMap::new())
            .unwrap();
        let reference = OutputReference::new(uuid);
        assert_eq!(router.get_output(&reference, &Load::All).unwrap(), Value::from(1i64));
    }

    #[test]
    fn save_with_store_route_extracts_matching_key_into_aux_store() {
        let router = router();
        let uuid = Uuid::new_v4();
        let routes: BTreeMap<String, String> = [("big".to_string(), "aux".to_string())].into();
        router
            .save(
                JobRecord::success(
                    uuid,
                    1,
                    "a",
                    Value::mapping([("big", Value::from("payload")), ("small", Value::from(1i64))]),
                ),
                &routes,
            )
            .unwrap();

        // The main record's "big" key is now a blob marker, not the payload.
        let main_record = router.main.query_one(uuid).unwrap().unwrap();
        let big = main_record.output.as_mapping().unwrap().get("big").unwrap();
        assert!(is_blob_marker(big).is_some());

        // get_output transparently reconstructs the original value.
        let reference = OutputReference::new(uuid);
        let reconstructed = router.get_output(&reference, &Load::All).unwrap();
        assert_eq!(
            reconstructed,
            Value::mapping([("big", Value::from("payload")), ("small", Value::from(1i64))])
        );
    }

    #[test]
    fn get_output_with_load_none_leaves_blob_markers_in_place() {
        let router = router();
        let uuid = Uuid::new_v4();
        let routes: BTreeMap<String, String> = [("big".to_string(), "aux".to_string())].into();
        router
            .save(
                JobRecord::success(uuid, 1, "a", Value::mapping([("big", Value::from("payload"))])),
                &routes,
            )
            .unwrap();

        let reference = OutputReference::new(uuid);
        let value = router.get_output(&reference, &Load::None).unwrap();
        let big = value.as_mapping().unwrap().get("big").unwrap();
        assert!(is_blob_marker(big).is_some());
    }

    #[test]
    fn save_with_unknown_store_name_errors() {
        let router = router();
        let routes: BTreeMap<String, String> = [("x".to_string(), "nope".to_string())].into();
        let err = router
            .save(JobRecord::success(Uuid::new_v4(), 1, "a", Value::mapping([("x", Value::Null)])), &routes)
            .unwrap_err();
        assert!(matches!(err, JobflowError::GraphConstruction(_)));
    }

    #[test]
    fn get_output_walks_path_into_mapping() {
        let router = router();
        let uuid = Uuid::new_v4();
        router
            .save(
                JobRecord::success(uuid, 1, "a", Value::mapping([("x", Value::from(9i64))])),
                &BTreeMap::new(),
            )
            .unwrap();
        let reference = OutputReference::new(uuid).field("x");
        assert_eq!(router.get_output(&reference, &Load::All).unwrap(), Value::from(9i64));
    }

    #[test]
    fn get_output_on_failed_job_surfaces_job_failure() {
        let router = router();
        let uuid = Uuid::new_v4();
        router.save(JobRecord::failure(uuid, 1, "a", "boom"), &BTreeMap::new()).unwrap();
        let err = router.get_output(&OutputReference::new(uuid), &Load::All).unwrap_err();
        assert!(matches!(err, JobflowError::JobFailure { .. }));
    }

    #[test]
    fn remove_drops_blob_records_from_auxiliary_stores() {
        let router = router();
        let uuid = Uuid::new_v4();
        let routes: BTreeMap<String, String> = [("big".to_string(), "aux".to_string())].into();
        router
            .save(
                JobRecord::success(uuid, 1, "a", Value::mapping([("big", Value::from("payload"))])),
                &routes,
            )
            .unwrap();
        router.remove(uuid).unwrap();
        assert!(router.main.query_one(uuid).unwrap().is_none());
        assert_eq!(router.auxiliary["aux"].count().unwrap(), 0);
    }
}
