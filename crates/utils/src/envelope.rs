//! Normalization of reference-tracking JSON envelopes.
//!
//! The backend serializer preserves object references by tagging objects with
//! `$id`, replacing repeated objects with `{"$ref": id}` and wrapping every
//! collection as `{"$id": .., "$values": [..]}`. Application code only ever
//! sees the normalized shape: metadata keys lose their leading `$` and
//! `values` wrappers collapse into bare arrays.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

const METADATA_PREFIX: char = '$';
const VALUES_KEY: &str = "values";
const ID_KEY: &str = "$id";
const REF_KEY: &str = "$ref";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("reference to unknown $id {0}")]
    UnknownReference(String),
    #[error("cyclic reference to $id {0}")]
    CyclicReference(String),
}

/// Normalize a borrowed envelope into plain JSON.
///
/// Arrays are normalized element-wise, scalars are returned unchanged, and
/// objects have a single leading `$` stripped from each key. An object whose
/// normalized form holds an array under `values` is replaced by that array.
/// When both `$key` and `key` are present the unprefixed key wins.
///
/// `$ref` nodes are not resolved here; they come out as `{"ref": id}`.
/// See [`resolve_references`].
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => {
            collapse(map.iter().map(|(key, value)| (key.clone(), normalize(value))))
        }
        scalar => scalar.clone(),
    }
}

/// Same as [`normalize`], consuming the envelope.
pub fn normalize_owned(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_owned).collect()),
        Value::Object(map) => {
            collapse(map.into_iter().map(|(key, value)| (key, normalize_owned(value))))
        }
        scalar => scalar,
    }
}

fn collapse(entries: impl Iterator<Item = (String, Value)>) -> Value {
    let mut out = Map::new();

    for (key, value) in entries {
        match key.strip_prefix(METADATA_PREFIX) {
            Some(clean) => {
                if !out.contains_key(clean) {
                    out.insert(clean.to_owned(), value);
                }
            }
            None => {
                out.insert(key, value);
            }
        }
    }

    if let Some(Value::Array(items)) = out.get_mut(VALUES_KEY) {
        return Value::Array(std::mem::take(items));
    }

    Value::Object(out)
}

/// Number of `$ref` nodes in a raw envelope.
pub fn count_references(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.iter().map(count_references).sum(),
        Value::Object(map) => {
            let own = usize::from(map.contains_key(REF_KEY));
            own + map.values().map(count_references).sum::<usize>()
        }
        _ => 0,
    }
}

/// Replace every `{"$ref": id}` node with a copy of the object tagged `$id`.
///
/// Runs in two passes: the first indexes every `$id` in the document, the
/// second rebuilds the tree substituting references. Forward references are
/// allowed. A reference that points back into one of its own ancestors cannot
/// be represented as a tree and fails with [`EnvelopeError::CyclicReference`].
///
/// The output still carries `$`-prefixed keys; feed it to [`normalize_owned`].
pub fn resolve_references(value: &Value) -> Result<Value, EnvelopeError> {
    let mut index = HashMap::new();
    collect_ids(value, &mut index);
    debug!(ids = index.len(), "indexed envelope ids for reference resolution");

    let mut ancestors = Vec::new();
    resolve_node(value, &index, &mut ancestors)
}

fn collect_ids<'a>(value: &'a Value, index: &mut HashMap<String, &'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_ids(item, index)),
        Value::Object(map) => {
            if let Some(id) = map.get(ID_KEY).and_then(id_string) {
                index.entry(id).or_insert(value);
            }
            map.values().for_each(|child| collect_ids(child, index));
        }
        _ => {}
    }
}

fn resolve_node(
    value: &Value,
    index: &HashMap<String, &Value>,
    ancestors: &mut Vec<String>,
) -> Result<Value, EnvelopeError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_node(item, index, ancestors))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            if let Some(target) = map.get(REF_KEY).and_then(id_string) {
                if ancestors.contains(&target) {
                    return Err(EnvelopeError::CyclicReference(target));
                }
                let node = index
                    .get(&target)
                    .ok_or_else(|| EnvelopeError::UnknownReference(target.clone()))?;
                return resolve_node(node, index, ancestors);
            }

            let id = map.get(ID_KEY).and_then(id_string);
            if let Some(id) = &id {
                ancestors.push(id.clone());
            }

            let resolved = map
                .iter()
                .map(|(key, child)| Ok((key.clone(), resolve_node(child, index, ancestors)?)))
                .collect::<Result<Map<_, _>, EnvelopeError>>();

            if id.is_some() {
                ancestors.pop();
            }
            resolved.map(Value::Object)
        }
        scalar => Ok(scalar.clone()),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
