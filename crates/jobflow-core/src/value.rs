//! The self-describing value tree Jobflow serializes job arguments and
//! outputs to, plus the two find-and-replace operations (`find_refs`,
//! `resolve_refs`) the scheduler uses to drive reference resolution.
//!
//! Primitives and containers map onto their natural JSON shapes. Anything
//! else — an [`OutputReference`] or a user type registered in a
//! [`TypeRegistry`] — is encoded as a typed object: a mapping carrying
//! `@module`/`@class` (and optionally `@version`) alongside its fields.
//! Unknown typed objects decode as opaque [`Value::Typed`] values rather
//! than failing, so a store can round-trip data for job bodies that were
//! never registered with this process.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

use crate::error::{JobflowError, Result};
use crate::reference::{OutputReference, PathSegment};

pub const JOBFLOW_MODULE: &str = "jobflow";
pub const OUTPUT_REFERENCE_CLASS: &str = "OutputReference";

/// A value flowing through jobflow: job arguments, job outputs, and
/// everything nested inside them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// An ordered sequence (JSON array).
    Sequence(Vec<Value>),
    /// An unordered collection with no duplicate members, encoded as a
    /// typed object so it round-trips distinctly from a `Sequence`.
    Set(Vec<Value>),
    /// A string-keyed mapping (JSON object with no `@module`/`@class` keys).
    Mapping(BTreeMap<String, Value>),
    /// A lazy reference to another job's output.
    Reference(OutputReference),
    /// A registered or unregistered typed object: `{"@module", "@class",
    /// "@version"?, ...fields}`.
    Typed(TypedObject),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedObject {
    pub module: String,
    pub class: String,
    pub version: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

/// Serializes via [`encode`], discarding the distinction between a typed
/// object and a plain mapping only at the wire level (the `@module`/
/// `@class` tags are still written).
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        encode(self).serialize(serializer)
    }
}

/// Deserializes via [`decode`] against an empty [`TypeRegistry`], so
/// values nested inside a [`crate::job::Job`] or [`crate::flow::Flow`]
/// round-trip through `serde_json`/`serde_yaml` without a registry in
/// scope. Callers that need registered types rehydrated should decode the
/// raw wire form explicitly with [`decode`] instead.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        decode(json, &TypeRegistry::new()).map_err(D::Error::custom)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn mapping(entries: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<OutputReference> for Value {
    fn from(r: OutputReference) -> Self {
        Value::Reference(r)
    }
}

/// A registry of decoders for typed objects identified by `(module, class)`.
/// Unknown pairs decode as opaque [`Value::Typed`] values rather than
/// erroring, so a store can round-trip data for types nobody registered.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    decoders: BTreeMap<(String, String), DecodeFn>,
}

type DecodeFn = Arc<dyn Fn(&TypedObject) -> Result<Value> + Send + Sync>;

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Register a decoder for `(module, class)`. The decoder receives the
    /// typed object's fields and must produce the rehydrated [`Value`].
    pub fn register(
        &mut self,
        module: impl Into<String>,
        class: impl Into<String>,
        decode: impl Fn(&TypedObject) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.decoders
            .insert((module.into(), class.into()), Arc::new(decode));
    }

    fn decode(&self, obj: TypedObject) -> Result<Value> {
        if obj.module == JOBFLOW_MODULE && obj.class == OUTPUT_REFERENCE_CLASS {
            return decode_output_reference(&obj);
        }
        match self.decoders.get(&(obj.module.clone(), obj.class.clone())) {
            Some(decoder) => decoder(&obj),
            None => Ok(Value::Typed(obj)),
        }
    }
}

fn decode_output_reference(obj: &TypedObject) -> Result<Value> {
    let uuid_str = obj
        .fields
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| JobflowError::Serialization("OutputReference missing uuid".into()))?;
    let uuid = uuid::Uuid::parse_str(uuid_str)
        .map_err(|e| JobflowError::Serialization(format!("invalid uuid in reference: {e}")))?;
    let mut path = Vec::new();
    if let Some(Value::Sequence(attrs)) = obj.fields.get("attributes") {
        for attr in attrs {
            match attr {
                Value::String(s) => path.push(PathSegment::Key(s.clone())),
                Value::Number(n) => {
                    let i = n
                        .as_u64()
                        .ok_or_else(|| JobflowError::Serialization("bad path segment".into()))?;
                    path.push(PathSegment::Index(i as usize));
                }
                _ => return Err(JobflowError::Serialization("bad path segment".into())),
            }
        }
    }
    let source_stores = match obj.fields.get("source_stores") {
        Some(Value::Sequence(names)) => Some(
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    };
    Ok(Value::Reference(OutputReference {
        uuid,
        path,
        source_stores,
    }))
}

fn encode_output_reference(r: &OutputReference) -> TypedObject {
    let attributes = r
        .path
        .iter()
        .map(|segment| match segment {
            PathSegment::Index(i) => Value::Number((*i as u64).into()),
            PathSegment::Key(k) => Value::String(k.clone()),
        })
        .collect();
    let mut fields = BTreeMap::new();
    fields.insert("uuid".to_string(), Value::String(r.uuid.to_string()));
    fields.insert("attributes".to_string(), Value::Sequence(attributes));
    if let Some(stores) = &r.source_stores {
        fields.insert(
            "source_stores".to_string(),
            Value::Sequence(stores.iter().cloned().map(Value::String).collect()),
        );
    }
    TypedObject {
        module: JOBFLOW_MODULE.to_string(),
        class: OUTPUT_REFERENCE_CLASS.to_string(),
        version: None,
        fields,
    }
}

/// Encode a [`Value`] to its wire form (self-describing JSON tree).
pub fn encode(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Number(n) => J::Number(n.clone()),
        Value::String(s) => J::String(s.clone()),
        Value::Sequence(items) => J::Array(items.iter().map(encode).collect()),
        Value::Set(items) => {
            let mut fields = serde_json::Map::new();
            fields.insert("@module".into(), J::String(JOBFLOW_MODULE.into()));
            fields.insert("@class".into(), J::String("Set".into()));
            fields.insert(
                "items".into(),
                J::Array(items.iter().map(encode).collect()),
            );
            J::Object(fields)
        }
        Value::Mapping(map) => {
            J::Object(map.iter().map(|(k, v)| (k.clone(), encode(v))).collect())
        }
        Value::Reference(r) => encode_typed(&encode_output_reference(r)),
        Value::Typed(obj) => encode_typed(obj),
    }
}

fn encode_typed(obj: &TypedObject) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    fields.insert("@module".into(), serde_json::Value::String(obj.module.clone()));
    fields.insert("@class".into(), serde_json::Value::String(obj.class.clone()));
    if let Some(version) = &obj.version {
        fields.insert("@version".into(), serde_json::Value::String(version.clone()));
    }
    for (k, v) in &obj.fields {
        fields.insert(k.clone(), encode(v));
    }
    serde_json::Value::Object(fields)
}

/// Decode a wire-form value, rehydrating any typed object registered in
/// `registry`. Unknown typed objects decode as [`Value::Typed`].
pub fn decode(json: serde_json::Value, registry: &TypeRegistry) -> Result<Value> {
    use serde_json::Value as J;
    match json {
        J::Null => Ok(Value::Null),
        J::Bool(b) => Ok(Value::Bool(b)),
        J::Number(n) => Ok(Value::Number(n)),
        J::String(s) => Ok(Value::String(s)),
        J::Array(items) => Ok(Value::Sequence(
            items
                .into_iter()
                .map(|v| decode(v, registry))
                .collect::<Result<_>>()?,
        )),
        J::Object(map) => decode_object(map, registry),
    }
}

fn decode_object(
    mut map: serde_json::Map<String, serde_json::Value>,
    registry: &TypeRegistry,
) -> Result<Value> {
    let module = map.remove("@module");
    let class = map.remove("@class");
    match (module, class) {
        (Some(serde_json::Value::String(module)), Some(serde_json::Value::String(class))) => {
            if module == JOBFLOW_MODULE && class == "Set" {
                let items = map
                    .remove("items")
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                return Ok(Value::Set(
                    items
                        .into_iter()
                        .map(|v| decode(v, registry))
                        .collect::<Result<_>>()?,
                ));
            }
            let version = match map.remove("@version") {
                Some(serde_json::Value::String(v)) => Some(v),
                _ => None,
            };
            let mut fields = BTreeMap::new();
            for (k, v) in map {
                fields.insert(k, decode(v, registry)?);
            }
            registry.decode(TypedObject {
                module,
                class,
                version,
                fields,
            })
        }
        _ => {
            let mut fields = BTreeMap::new();
            for (k, v) in map {
                fields.insert(k, decode(v, registry)?);
            }
            Ok(Value::Mapping(fields))
        }
    }
}

/// Walk `value`, collecting every [`OutputReference`] reachable through
/// sequences, sets, mappings, and typed-object fields. Total: no reference
/// nested inside a custom container can escape this traversal.
pub fn find_refs(value: &Value) -> Vec<OutputReference> {
    let mut out = Vec::new();
    find_refs_into(value, &mut out);
    out
}

fn find_refs_into(value: &Value, out: &mut Vec<OutputReference>) {
    match value {
        Value::Reference(r) => out.push(r.clone()),
        Value::Sequence(items) | Value::Set(items) => {
            for item in items {
                find_refs_into(item, out);
            }
        }
        Value::Mapping(map) => {
            for v in map.values() {
                find_refs_into(v, out);
            }
        }
        Value::Typed(obj) => {
            for v in obj.fields.values() {
                find_refs_into(v, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Replace every [`OutputReference`] reachable in `value` using `resolve`,
/// memoizing per reference within this call. `resolve` is fallible so the
/// caller can surface `ReferenceResolutionError` from the store lookup.
pub fn resolve_refs<F>(value: &Value, mut resolve: F) -> Result<Value>
where
    F: FnMut(&OutputReference) -> Result<Value>,
{
    let mut cache: BTreeMap<String, Value> = BTreeMap::new();
    resolve_refs_inner(value, &mut resolve, &mut cache)
}

fn resolve_refs_inner<F>(
    value: &Value,
    resolve: &mut F,
    cache: &mut BTreeMap<String, Value>,
) -> Result<Value>
where
    F: FnMut(&OutputReference) -> Result<Value>,
{
    match value {
        Value::Reference(r) => {
            let key = r.to_string();
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
            let resolved = resolve(r)?;
            cache.insert(key, resolved.clone());
            Ok(resolved)
        }
        Value::Sequence(items) => Ok(Value::Sequence(
            items
                .iter()
                .map(|v| resolve_refs_inner(v, resolve, cache))
                .collect::<Result<_>>()?,
        )),
        Value::Set(items) => Ok(Value::Set(
            items
                .iter()
                .map(|v| resolve_refs_inner(v, resolve, cache))
                .collect::<Result<_>>()?,
        )),
        Value::Mapping(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_refs_inner(v, resolve, cache)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Typed(obj) => {
            let mut fields = BTreeMap::new();
            for (k, v) in &obj.fields {
                fields.insert(k.clone(), resolve_refs_inner(v, resolve, cache)?);
            }
            Ok(Value::Typed(TypedObject {
                module: obj.module.clone(),
                class: obj.class.clone(),
                version: obj.version.clone(),
                fields,
            }))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(value.clone()),
    }
}

/// Structurally rewrite every [`OutputReference`] reachable in `value`
/// using `rewrite`, without evaluating anything. Unlike [`resolve_refs`]
/// this is infallible and unmemoized — it's used to splice a scheduler's
/// uuid remaps into not-yet-run jobs' arguments when a detour or replace
/// directive fires, not to resolve a reference to its eventual value.
pub fn map_refs(value: &Value, rewrite: &mut impl FnMut(&OutputReference) -> OutputReference) -> Value {
    match value {
        Value::Reference(r) => Value::Reference(rewrite(r)),
        Value::Sequence(items) => Value::Sequence(items.iter().map(|v| map_refs(v, rewrite)).collect()),
        Value::Set(items) => Value::Set(items.iter().map(|v| map_refs(v, rewrite)).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), map_refs(v, rewrite)))
                .collect(),
        ),
        Value::Typed(obj) => Value::Typed(TypedObject {
            module: obj.module.clone(),
            class: obj.class.clone(),
            version: obj.version.clone(),
            fields: obj
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), map_refs(v, rewrite)))
                .collect(),
        }),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
    }
}

/// Dereference a fetched value at `path`, applying each segment in turn.
pub fn deref_path(value: &Value, uuid: uuid::Uuid, path: &[PathSegment]) -> Result<Value> {
    let mut current = value.clone();
    for (i, segment) in path.iter().enumerate() {
        current = match (segment, &current) {
            (PathSegment::Index(idx), Value::Sequence(items) | Value::Set(items)) => items
                .get(*idx)
                .cloned()
                .ok_or_else(|| reference_error(uuid, path, i))?,
            (PathSegment::Key(key), Value::Mapping(map)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| reference_error(uuid, path, i))?,
            (PathSegment::Key(key), Value::Typed(obj)) => obj
                .fields
                .get(key)
                .cloned()
                .ok_or_else(|| reference_error(uuid, path, i))?,
            _ => return Err(reference_error(uuid, path, i)),
        };
    }
    Ok(current)
}

fn reference_error(uuid: uuid::Uuid, path: &[PathSegment], failing_index: usize) -> JobflowError {
    JobflowError::ReferenceResolution {
        uuid,
        path: path.to_vec(),
        failing_index: Some(failing_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn round_trip_primitives_and_containers() {
        let v = Value::mapping([
            ("a", Value::from(1i64)),
            ("b", Value::Sequence(vec![Value::from("x"), Value::Bool(true)])),
        ]);
        let registry = TypeRegistry::new();
        let wire = encode(&v);
        let back = decode(wire, &registry).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn round_trip_reference() {
        let r = OutputReference::new(Uuid::new_v4()).field("x").index(1);
        let v = Value::Reference(r.clone());
        let registry = TypeRegistry::new();
        let wire = encode(&v);
        assert_eq!(wire["@class"], "OutputReference");
        let back = decode(wire, &registry).unwrap();
        assert_eq!(back, Value::Reference(r));
    }

    #[test]
    fn find_refs_is_total_over_nested_containers() {
        let r1 = OutputReference::new(Uuid::new_v4());
        let r2 = OutputReference::new(Uuid::new_v4());
        let v = Value::mapping([
            (
                "nested",
                Value::Sequence(vec![Value::Set(vec![Value::Reference(r1.clone())])]),
            ),
            ("direct", Value::Reference(r2.clone())),
        ]);
        let refs = find_refs(&v);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&r1));
        assert!(refs.contains(&r2));
    }

    #[test]
    fn resolve_refs_memoizes_per_call() {
        let r = OutputReference::new(Uuid::new_v4());
        let v = Value::Sequence(vec![Value::Reference(r.clone()), Value::Reference(r.clone())]);
        let mut calls = 0;
        let resolved = resolve_refs(&v, |_| {
            calls += 1;
            Ok(Value::from(42i64))
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(
            resolved,
            Value::Sequence(vec![Value::from(42i64), Value::from(42i64)])
        );
    }

    #[test]
    fn map_refs_rewrites_uuid_keeping_path() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let v = Value::Sequence(vec![Value::Reference(OutputReference::new(from).field("x"))]);
        let rewritten = map_refs(&v, &mut |r| {
            if r.uuid == from {
                OutputReference { uuid: to, ..r.clone() }
            } else {
                r.clone()
            }
        });
        match rewritten {
            Value::Sequence(items) => match &items[0] {
                Value::Reference(r) => {
                    assert_eq!(r.uuid, to);
                    assert_eq!(r.path, vec![PathSegment::Key("x".into())]);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deref_path_nested_index_and_key() {
        let inner = Value::mapping([("x", Value::Sequence(vec![Value::from(10i64), Value::from(20i64), Value::from(30i64)]))]);
        let path = vec![PathSegment::Key("x".into()), PathSegment::Index(1)];
        let result = deref_path(&inner, Uuid::new_v4(), &path).unwrap();
        assert_eq!(result, Value::from(20i64));
    }

    #[test]
    fn deref_path_invalid_step_errors_with_uuid_and_index() {
        let inner = Value::mapping([("x", Value::from(1i64))]);
        let uuid = Uuid::new_v4();
        let path = vec![PathSegment::Key("missing".into())];
        let err = deref_path(&inner, uuid, &path).unwrap_err();
        match err {
            JobflowError::ReferenceResolution { uuid: u, failing_index, .. } => {
                assert_eq!(u, uuid);
                assert_eq!(failing_index, Some(0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
