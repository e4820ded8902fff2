//! In-memory stand-in for the management API
//!
//! Stores objects by id (case-insensitive, like ARM), echoes writes back
//! with `id`, `name` and a `Succeeded` provisioning state, and records every
//! call so tests can assert exactly which requests an operation made.

use crate::arm::{Arm, name_of};
use async_trait::async_trait;
use cirrus_cloud::Result;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum ArmCall {
    Get { id: String },
    Put { id: String, body: Value },
    Patch { id: String, body: Value },
    Post { path: String, body: Option<Value> },
    Delete { id: String },
    List { path: String },
}

impl ArmCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ArmCall::Put { .. } | ArmCall::Patch { .. } | ArmCall::Post { .. } | ArmCall::Delete { .. }
        )
    }
}

pub struct FakeArm {
    subscription_id: String,
    objects: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<ArmCall>>,
}

impl FakeArm {
    pub fn new(subscription_id: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed an object as if it already existed in the subscription
    pub fn insert(&self, id: &str, value: Value) -> Value {
        let stored = stamp(id, value);
        self.objects
            .lock()
            .unwrap()
            .insert(id.to_ascii_lowercase(), stored.clone());
        stored
    }

    pub fn object(&self, id: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&id.to_ascii_lowercase())
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.object(id).is_some()
    }

    pub fn calls(&self) -> Vec<ArmCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that would change something in the subscription
    pub fn writes(&self) -> Vec<ArmCall> {
        self.calls().into_iter().filter(ArmCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: ArmCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn stamp(id: &str, mut value: Value) -> Value {
    if !value.is_object() {
        value = json!({});
    }
    value["id"] = json!(id);
    value["name"] = json!(name_of(id));
    if !value["properties"].is_object() {
        value["properties"] = json!({});
    }
    value["properties"]["provisioningState"] = json!("Succeeded");
    value
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Whether `id` is an item of the collection at `path`
fn listed_by(path: &str, id: &str) -> bool {
    let path = path.to_ascii_lowercase();
    let id = id.to_ascii_lowercase();

    if let Some(zone) = path.strip_suffix("/recordsets") {
        return id
            .strip_prefix(&format!("{}/", zone))
            .is_some_and(|rest| rest.split('/').count() == 2);
    }

    let direct = |candidate: &str| {
        candidate
            .strip_prefix(&format!("{}/", path))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    };

    direct(&id) || without_resource_group(&id).is_some_and(|stripped| direct(&stripped))
}

/// `/subscriptions/s/resourcegroups/rg/providers/...` → `/subscriptions/s/providers/...`
fn without_resource_group(id: &str) -> Option<String> {
    let parts: Vec<&str> = id.split('/').collect();
    if parts.len() > 5 && parts[3] == "resourcegroups" && parts[5] == "providers" {
        let mut kept = parts[..3].to_vec();
        kept.extend_from_slice(&parts[5..]);
        Some(kept.join("/"))
    } else {
        None
    }
}

#[async_trait]
impl Arm for FakeArm {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    async fn get(&self, id: &str, _api_version: &str) -> Result<Option<Value>> {
        self.record(ArmCall::Get { id: id.to_string() });
        Ok(self.object(id))
    }

    async fn put(&self, id: &str, _api_version: &str, body: &Value) -> Result<Value> {
        self.record(ArmCall::Put {
            id: id.to_string(),
            body: body.clone(),
        });
        Ok(self.insert(id, body.clone()))
    }

    async fn patch(&self, id: &str, _api_version: &str, body: &Value) -> Result<Value> {
        self.record(ArmCall::Patch {
            id: id.to_string(),
            body: body.clone(),
        });
        let mut current = self
            .object(id)
            .ok_or_else(|| cirrus_cloud::CloudError::ResourceNotFound(id.to_string()))?;
        merge(&mut current, body);
        Ok(self.insert(id, current))
    }

    async fn post(&self, path: &str, _api_version: &str, body: Option<&Value>) -> Result<Value> {
        self.record(ArmCall::Post {
            path: path.to_string(),
            body: body.cloned(),
        });
        Ok(Value::Null)
    }

    async fn delete(&self, id: &str, _api_version: &str) -> Result<()> {
        self.record(ArmCall::Delete { id: id.to_string() });
        let key = id.to_ascii_lowercase();
        let prefix = format!("{}/", key);
        self.objects
            .lock()
            .unwrap()
            .retain(|k, _| *k != key && !k.starts_with(&prefix));
        Ok(())
    }

    async fn list(&self, path: &str, _api_version: &str) -> Result<Vec<Value>> {
        self.record(ArmCall::List {
            path: path.to_string(),
        });
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| listed_by(path, k))
            .map(|(_, v)| v.clone())
            .collect())
    }
}
