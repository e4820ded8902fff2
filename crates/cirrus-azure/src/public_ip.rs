//! Public IP addresses

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const API_VERSION: &str = "2023-09-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::optional("sku"),
    Field::optional("allocation"),
    Field::optional("idle-timeout-in-minutes").updatable(),
    Field::optional("domain-label").updatable(),
    Field::optional("tags").updatable(),
    Field::output("ip-address"),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicIpSku {
    #[default]
    Basic,
    Standard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpAllocation {
    #[default]
    Dynamic,
    Static,
}

/// Creates a public IP address.
///
/// ```text
/// azure::public-ip-address public-ip-address-example
///     name: "public-ip-address-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     idle-timeout-in-minutes: 4
///     sku: "Standard"
///     allocation: "Static"
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PublicIpAddress {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    #[serde(default)]
    pub sku: PublicIpSku,
    #[serde(default)]
    pub allocation: IpAllocation,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_in_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_label: Option<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn default_idle_timeout() -> u32 {
    4
}

impl PublicIpAddress {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            sku: PublicIpSku::default(),
            allocation: IpAllocation::default(),
            idle_timeout_in_minutes: default_idle_timeout(),
            domain_label: None,
            tags: Tags::new(),
            ip_address: None,
            id: None,
        }
    }
}

#[async_trait]
impl ArmResource for PublicIpAddress {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "publicIPAddresses",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let mut body = json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "sku": { "name": self.sku },
            "properties": {
                "publicIPAllocationMethod": self.allocation,
                "idleTimeoutInMinutes": self.idle_timeout_in_minutes,
            }
        });
        if let Some(label) = &self.domain_label {
            body["properties"]["dnsSettings"] = json!({ "domainNameLabel": label });
        }
        Ok(body)
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            region: value::str_at(v, "/location").unwrap_or_default(),
            sku: value::optional_enum_at(v, "/sku/name")?.unwrap_or_default(),
            allocation: value::enum_at(v, "/properties/publicIPAllocationMethod")
                .unwrap_or_default(),
            idle_timeout_in_minutes: value::uint_at(v, "/properties/idleTimeoutInMinutes")?
                .unwrap_or_else(default_idle_timeout),
            domain_label: value::str_at(v, "/properties/dnsSettings/domainNameLabel"),
            tags: value::tags_of(v),
            ip_address: value::str_at(v, "/properties/ipAddress"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.ip_address = live.ip_address;
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "publicIPAddresses");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for PublicIpAddress {
    const TYPE: &'static str = "public-ip-address";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if self.sku == PublicIpSku::Standard && self.allocation != IpAllocation::Static {
            return Err(CloudError::invalid(
                Self::TYPE,
                "Standard sku requires Static allocation",
            ));
        }
        if !(4..=30).contains(&self.idle_timeout_in_minutes) {
            return Err(CloudError::invalid(
                Self::TYPE,
                "idle-timeout-in-minutes must be between 4 and 30",
            ));
        }
        Ok(())
    }

    async fn refresh(&mut self, client: &dyn Arm) -> Result<bool> {
        adapter::refresh(self, client).await
    }

    async fn create(&mut self, client: &dyn Arm) -> Result<()> {
        adapter::create(self, client).await
    }

    async fn update(&self, client: &dyn Arm, current: &Self) -> Result<()> {
        self.validate()?;
        let diff = self.diff(current);
        let mut update = adapter::begin_update(self, client).await?;

        if diff.changed(|p| &p.idle_timeout_in_minutes) {
            update.set(
                "idle-timeout-in-minutes",
                "/properties/idleTimeoutInMinutes",
                json!(self.idle_timeout_in_minutes),
            );
        }

        if diff.changed(|p| &p.domain_label) {
            update.set(
                "domain-label",
                "/properties/dnsSettings/domainNameLabel",
                json!(self.domain_label),
            );
        }

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
    use crate::testing::{ArmCall, FakeArm};
    use cirrus_cloud::ResourceRegistry;

    fn address() -> PublicIpAddress {
        let mut ip = PublicIpAddress::new("ip-example", "rg", "japaneast");
        ip.sku = PublicIpSku::Standard;
        ip.allocation = IpAllocation::Static;
        ip
    }

    #[tokio::test]
    async fn test_refresh_reads_assigned_address() {
        let fake = FakeArm::new("sub");
        let mut declared = address();
        declared.create(&fake).await.unwrap();
        assert!(declared.ip_address.is_none());

        let id = declared.id.clone().unwrap();
        let mut live = fake.object(&id).unwrap();
        live["properties"]["ipAddress"] = json!("20.1.2.3");
        fake.insert(&id, live);

        assert!(declared.refresh(&fake).await.unwrap());
        assert_eq!(declared.ip_address.as_deref(), Some("20.1.2.3"));
        assert_eq!(declared.sku, PublicIpSku::Standard);
    }

    #[tokio::test]
    async fn test_update_idle_timeout_only() {
        let fake = FakeArm::new("sub");
        let mut current = address();
        current.create(&fake).await.unwrap();
        fake.clear_calls();

        let mut desired = current.clone();
        desired.idle_timeout_in_minutes = 10;
        desired.update(&fake, &current).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        assert_eq!(body["properties"]["idleTimeoutInMinutes"], 10);
        assert!(body["properties"].get("dnsSettings").is_none());
    }

    #[test]
    fn test_standard_requires_static() {
        let mut ip = address();
        ip.allocation = IpAllocation::Dynamic;
        assert!(matches!(ip.validate(), Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_sku_is_invalid_config() {
        let mut registry: ResourceRegistry<dyn Arm> = ResourceRegistry::new();
        registry.register::<PublicIpAddress>();
        let err = registry
            .resource(
                "public-ip-address",
                json!({
                    "name": "ip",
                    "resource-group": "rg",
                    "region": "japaneast",
                    "sku": "Premium",
                }),
            )
            .err()
            .unwrap();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}
