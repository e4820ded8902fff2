use super::endpoint::EndpointType;
use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub(crate) const API_VERSION: &str = "2023-05-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("sku"),
    Field::optional("region"),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CdnSku {
    #[serde(rename = "Standard_Akamai")]
    StandardAkamai,
    #[serde(rename = "Standard_Verizon")]
    StandardVerizon,
    #[serde(rename = "Premium_Verizon")]
    PremiumVerizon,
    #[serde(rename = "Standard_Microsoft")]
    StandardMicrosoft,
}

impl CdnSku {
    /// Kind of endpoint profiles of this sku serve
    pub fn endpoint_type(self) -> EndpointType {
        match self {
            CdnSku::PremiumVerizon => EndpointType::Premium,
            _ => EndpointType::Standard,
        }
    }
}

/// Creates a CDN profile.
///
/// ```text
/// azure::cdn-profile cdn-profile-example
///     name: "cdn-profile-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     sku: "Standard_Akamai"
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CdnProfile {
    pub name: String,
    pub resource_group: String,
    pub sku: CdnSku,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn default_region() -> String {
    "global".to_string()
}

/// Owning profile of an endpoint
///
/// `sku` is known when the reference was built from a declared profile and
/// lets the endpoint check its type before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileRef {
    pub resource_group: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<CdnSku>,
}

impl ProfileRef {
    pub fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Cdn",
            "profiles",
            &self.name,
        )
    }

    /// Profile that an endpoint id points into; the sku is not part of the id
    pub fn from_endpoint_id(id: &ResourceId) -> Option<Self> {
        let profile = id.parent()?;
        Some(Self {
            resource_group: profile.resource_group_name()?.to_string(),
            name: profile.name().to_string(),
            sku: None,
        })
    }
}

impl From<&CdnProfile> for ProfileRef {
    fn from(profile: &CdnProfile) -> Self {
        Self {
            resource_group: profile.resource_group.clone(),
            name: profile.name.clone(),
            sku: Some(profile.sku),
        }
    }
}

impl CdnProfile {
    pub fn new(name: impl Into<String>, resource_group: impl Into<String>, sku: CdnSku) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            sku,
            region: default_region(),
            tags: Tags::new(),
            id: None,
        }
    }
}

#[async_trait]
impl ArmResource for CdnProfile {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Cdn",
            "profiles",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "sku": { "name": self.sku },
        }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            sku: value::enum_at(v, "/sku/name")?,
            region: value::str_at(v, "/location").unwrap_or_else(default_region),
            tags: value::tags_of(v),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Cdn", "profiles");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for CdnProfile {
    const TYPE: &'static str = "cdn-profile";
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

        if diff.changed(|p| &p.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeArm;
    use cirrus_cloud::{ActionType, ResourceRegistry, plan_change};

    #[tokio::test]
    async fn test_create_then_refresh_round_trip() {
        let fake = FakeArm::new("sub");
        let mut declared = CdnProfile::new("cdn-example", "rg", CdnSku::StandardAkamai);
        declared.create(&fake).await.unwrap();

        let mut refreshed = declared.clone();
        assert!(refreshed.refresh(&fake).await.unwrap());
        assert_eq!(refreshed, declared);
    }

    #[test]
    fn test_sku_change_needs_replacement() {
        let current = CdnProfile::new("cdn-example", "rg", CdnSku::StandardAkamai);
        let mut desired = current.clone();
        desired.sku = CdnSku::PremiumVerizon;
        let action = plan_change("cdn-example", Some(&current), Some(&desired)).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
    }

    #[test]
    fn test_unknown_sku_is_invalid_config() {
        let mut registry: ResourceRegistry<dyn Arm> = ResourceRegistry::new();
        registry.register::<CdnProfile>();
        let result = registry.resource(
            "cdn-profile",
            json!({ "name": "p", "resource-group": "rg", "sku": "Premium_Akamai" }),
        );
        assert!(matches!(result, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_profile_ref_carries_sku() {
        let profile = CdnProfile::new("cdn-example", "rg", CdnSku::PremiumVerizon);
        let reference = ProfileRef::from(&profile);
        assert_eq!(reference.sku.map(CdnSku::endpoint_type), Some(EndpointType::Premium));
    }
}
