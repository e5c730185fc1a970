//! The persisted shape of a completed (or failed) job.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jobflow_core::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The main store's record shape for one `(uuid, index)`. `output` may
/// contain blob markers in place of subtrees routed to auxiliary stores;
/// the router, not this struct, knows how to expand them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub uuid: Uuid,
    pub index: u32,
    pub name: String,
    pub output: Value,
    #[serde(default)]
    pub stored_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub hosts: Vec<Uuid>,
    pub completed_at: DateTime<Utc>,
    /// Set instead of `output` when the job failed; `output` is left `Null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn success(uuid: Uuid, index: u32, name: impl Into<String>, output: Value) -> Self {
        JobRecord {
            uuid,
            index,
            name: name.into(),
            output,
            stored_data: BTreeMap::new(),
            metadata: BTreeMap::new(),
            hosts: Vec::new(),
            completed_at: Utc::now(),
            error: None,
        }
    }

    pub fn failure(uuid: Uuid, index: u32, name: impl Into<String>, error: impl Into<String>) -> Self {
        JobRecord {
            uuid,
            index,
            name: name.into(),
            output: Value::Null,
            stored_data: BTreeMap::new(),
            metadata: BTreeMap::new(),
            hosts: Vec::new(),
            completed_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<Uuid>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_stored_data(mut self, stored_data: BTreeMap<String, Value>) -> Self {
        self.stored_data = stored_data;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// A marker left in place of a value too large to keep inline, following the
/// blob convention. The real bytes live in the named store under
/// `blob_uuid`; resolving the marker is the router's job, not this crate's
/// backends, which treat it as an opaque typed value like any other.
pub const BLOB_CLASS: &str = "Blob";

pub fn is_blob_marker(value: &Value) -> Option<(Uuid, &str)> {
    let obj = match value {
        Value::Typed(obj) if obj.class == BLOB_CLASS => obj,
        _ => return None,
    };
    let blob_uuid = obj.fields.get("blob_uuid")?.as_str().and_then(|s| Uuid::parse_str(s).ok())?;
    let store = obj.fields.get("store")?.as_str()?;
    Some((blob_uuid, store))
}

/// Build the blob marker for a subtree moved to `store` under `blob_uuid`,
/// per the `{"blob_uuid": ..., "store": ..., "@class": "Blob"}` wire form.
pub fn blob_marker(blob_uuid: Uuid, store: impl Into<String>) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("blob_uuid".to_string(), Value::String(blob_uuid.to_string()));
    fields.insert("store".to_string(), Value::String(store.into()));
    Value::Typed(jobflow_core::TypedObject {
        module: "jobflow".to_string(),
        class: BLOB_CLASS.to_string(),
        version: None,
        fields,
    })
}
