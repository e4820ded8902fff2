//! Resource groups

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, value};
use async_trait::async_trait;
use cirrus_cloud::{Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const API_VERSION: &str = "2021-04-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("region"),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

/// Creates a resource group.
///
/// ```text
/// azure::resource-group resource-group-example
///     name: "resource-group-example"
///     region: "japaneast"
///     tags: { Name: "resource-group-example" }
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceGroup {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ResourceGroup {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            tags: Tags::new(),
            id: None,
        }
    }
}

#[async_trait]
impl ArmResource for ResourceGroup {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::resource_group(subscription_id, &self.name)
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
        }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        Ok(Self {
            name: value::required_str(v, "/name")?,
            region: value::required_str(v, "/location")?,
            tags: value::tags_of(v),
            id: value::str_at(v, "/id"),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = format!("/subscriptions/{}/resourcegroups", client.subscription_id());
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for ResourceGroup {
    const TYPE: &'static str = "resource-group";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    async fn refresh(&mut self, client: &dyn Arm) -> Result<bool> {
        adapter::refresh(self, client).await
    }

    async fn create(&mut self, client: &dyn Arm) -> Result<()> {
        adapter::create(self, client).await
    }

    async fn update(&self, client: &dyn Arm, current: &Self) -> Result<()> {
        let diff = self.diff(current);
        let mut update = adapter::begin_update(self, client).await?;

        if diff.changed(|r| &r.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}
