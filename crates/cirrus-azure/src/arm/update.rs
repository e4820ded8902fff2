//! In-place update of a live ARM object
//!
//! The live object is fetched, only the declared changes are written into
//! it, and the result is submitted with a single PUT. Nothing is sent when
//! no field was touched.

use super::Arm;
use super::value::{remove_pointer, set_pointer};
use cirrus_cloud::{CloudError, Result};
use serde_json::Value;

pub struct ArmUpdate {
    id: String,
    api_version: &'static str,
    body: Value,
    applied: Vec<&'static str>,
}

impl ArmUpdate {
    /// Start an update from the object's current live state
    pub async fn begin(client: &dyn Arm, id: &str, api_version: &'static str) -> Result<Self> {
        let body = client
            .get(id, api_version)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()))?;
        Ok(Self::from_live(id, api_version, body))
    }

    pub fn from_live(id: &str, api_version: &'static str, body: Value) -> Self {
        Self {
            id: id.to_string(),
            api_version,
            body,
            applied: Vec::new(),
        }
    }

    /// Write `value` at `pointer` on behalf of configuration key `field`
    pub fn set(&mut self, field: &'static str, pointer: &str, value: Value) -> &mut Self {
        if value.is_null() {
            remove_pointer(&mut self.body, pointer);
        } else {
            set_pointer(&mut self.body, pointer, value);
        }
        self.record(field);
        self
    }

    /// Apply an arbitrary edit to the live body on behalf of `field`
    pub fn edit(&mut self, field: &'static str, f: impl FnOnce(&mut Value)) -> &mut Self {
        f(&mut self.body);
        self.record(field);
        self
    }

    fn record(&mut self, field: &'static str) {
        if !self.applied.contains(&field) {
            self.applied.push(field);
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Configuration keys written so far
    pub fn applied(&self) -> &[&'static str] {
        &self.applied
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Submit the update. Returns `None` when nothing changed.
    pub async fn apply(self, client: &dyn Arm) -> Result<Option<Value>> {
        if self.applied.is_empty() {
            tracing::debug!("No changes for {}", self.id);
            return Ok(None);
        }

        tracing::info!("Updating {} ({})", self.id, self.applied.join(", "));
        let result = client.put(&self.id, self.api_version, &self.body).await?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ArmCall, FakeArm};
    use serde_json::json;

    const ID: &str = "/subscriptions/sub/resourceGroups/rg";

    #[tokio::test]
    async fn test_no_fields_no_put() {
        let fake = FakeArm::new("sub");
        fake.insert(ID, json!({"location": "japaneast"}));

        let update = ArmUpdate::begin(&fake, ID, "2021-04-01").await.unwrap();
        assert!(update.apply(&fake).await.unwrap().is_none());
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn test_single_put_with_changed_fields() {
        let fake = FakeArm::new("sub");
        fake.insert(ID, json!({"location": "japaneast", "tags": {"a": "1"}}));

        let mut update = ArmUpdate::begin(&fake, ID, "2021-04-01").await.unwrap();
        update
            .set("tags", "/tags", json!({"a": "2"}))
            .set("tags", "/tags/b", json!("3"));
        assert_eq!(update.applied(), &["tags"]);
        update.apply(&fake).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            ArmCall::Put { body, .. } => {
                assert_eq!(body["location"], "japaneast");
                assert_eq!(body["tags"], json!({"a": "2", "b": "3"}));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_begin_missing_object() {
        let fake = FakeArm::new("sub");
        let err = ArmUpdate::begin(&fake, ID, "2021-04-01").await.err().unwrap();
        assert!(matches!(err, CloudError::ResourceNotFound(_)));
    }
}
