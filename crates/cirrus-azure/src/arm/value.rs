//! Accessors for ARM JSON objects

use cirrus_cloud::{CloudError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
}

pub fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(Value::as_u64)
}

pub fn bool_at(value: &Value, pointer: &str) -> Option<bool> {
    value.pointer(pointer).and_then(Value::as_bool)
}

pub fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn strings_at(value: &Value, pointer: &str) -> Vec<String> {
    array_at(value, pointer)
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}

/// A string that must be present in a live object
pub fn required_str(value: &Value, pointer: &str) -> Result<String> {
    str_at(value, pointer).ok_or_else(|| {
        CloudError::OperationFailed(format!("response is missing '{}'", pointer))
    })
}

/// Deserialize an enum-like string field (e.g. a SKU name)
pub fn enum_at<T: serde::de::DeserializeOwned>(value: &Value, pointer: &str) -> Result<T> {
    let raw = value.pointer(pointer).cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw.clone()).map_err(|_| {
        CloudError::OperationFailed(format!("unexpected value {} at '{}'", raw, pointer))
    })
}

/// Unsigned number at `pointer` narrowed to `T`; a value that does not fit
/// is an error rather than being truncated
pub fn uint_at<T: TryFrom<u64>>(value: &Value, pointer: &str) -> Result<Option<T>> {
    match u64_at(value, pointer) {
        None => Ok(None),
        Some(n) => T::try_from(n).map(Some).map_err(|_| {
            CloudError::OperationFailed(format!("{} at '{}' is out of range", n, pointer))
        }),
    }
}

/// Like [`enum_at`], but an absent or null value is `None` rather than an error
pub fn optional_enum_at<T: serde::de::DeserializeOwned>(
    value: &Value,
    pointer: &str,
) -> Result<Option<T>> {
    match value.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => enum_at(value, pointer).map(Some),
    }
}

pub fn tags_of(value: &Value) -> BTreeMap<String, String> {
    string_map_at(value, "/tags")
}

/// String-valued object at `pointer` (tags, record set metadata)
pub fn string_map_at(value: &Value, pointer: &str) -> BTreeMap<String, String> {
    value
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// `{"id": "<id>"}` reference object
pub fn id_ref(id: &str) -> Value {
    serde_json::json!({ "id": id })
}

/// Set `pointer` inside `root`, creating intermediate objects
pub fn set_pointer(root: &mut Value, pointer: &str, value: Value) {
    let mut current = root;
    let keys: Vec<&str> = pointer.split('/').filter(|k| !k.is_empty()).collect();
    let Some((last, parents)) = keys.split_last() else {
        *current = value;
        return;
    };

    for key in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(obj) = current else {
            return;
        };
        current = obj.entry(key.to_string()).or_insert(Value::Null);
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(obj) = current.as_object_mut() {
        obj.insert(last.to_string(), value);
    }
}

/// Remove `pointer` from `root` if present
pub fn remove_pointer(root: &mut Value, pointer: &str) {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return;
    };
    let parent = if parent.is_empty() {
        Some(root)
    } else {
        root.pointer_mut(parent)
    };
    if let Some(Value::Object(obj)) = parent {
        obj.remove(last);
    }
}
