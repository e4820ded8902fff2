use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub(crate) const API_VERSION: &str = "2018-05-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::optional("tags").updatable(),
    Field::output("name-servers"),
    Field::output("id"),
];

/// Creates a public DNS zone.
///
/// ```text
/// azure::dns-zone dns-zone-example
///     name: "example.com"
///     resource-group: $(azure::resource-group resource-group-example)
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsZone {
    pub name: String,
    pub resource_group: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Owning zone of a record set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneRef {
    pub resource_group: String,
    pub name: String,
}

impl ZoneRef {
    pub fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "dnsZones",
            &self.name,
        )
    }

    /// Zone that a record set id points into
    pub fn from_record_set_id(id: &ResourceId) -> Option<Self> {
        let zone = id.parent()?;
        Some(Self {
            resource_group: zone.resource_group_name()?.to_string(),
            name: zone.name().to_string(),
        })
    }
}

impl From<&DnsZone> for ZoneRef {
    fn from(zone: &DnsZone) -> Self {
        Self {
            resource_group: zone.resource_group.clone(),
            name: zone.name.clone(),
        }
    }
}

impl DnsZone {
    pub fn new(name: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            tags: Tags::new(),
            name_servers: Vec::new(),
            id: None,
        }
    }
}

#[async_trait]
impl ArmResource for DnsZone {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ZoneRef::from(self).arm_id(subscription_id)
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": "global",
            "tags": tags_value(&self.tags),
            "properties": { "zoneType": "Public" }
        }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            tags: value::tags_of(v),
            name_servers: value::strings_at(v, "/properties/nameServers"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.name_servers = live.name_servers;
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "dnsZones");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for DnsZone {
    const TYPE: &'static str = "dns-zone";
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

        if diff.changed(|z| &z.tags) {
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
    use crate::adapter::ArmFinder;
    use crate::testing::FakeArm;
    use cirrus_cloud::Finder;

    #[tokio::test]
    async fn test_refresh_reads_name_servers() {
        let fake = FakeArm::new("sub");
        let mut zone = DnsZone::new("example.com", "rg");
        zone.create(&fake).await.unwrap();
        assert_eq!(
            zone.id.as_deref(),
            Some("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com")
        );

        let id = zone.id.clone().unwrap();
        let mut live = fake.object(&id).unwrap();
        live["properties"]["nameServers"] = json!(["ns1-01.azure-dns.com."]);
        fake.insert(&id, live);

        assert!(zone.refresh(&fake).await.unwrap());
        assert_eq!(zone.name_servers, vec!["ns1-01.azure-dns.com."]);
    }

    #[test]
    fn test_body_is_global() {
        let zone = DnsZone::new("example.com", "rg");
        let body = zone.to_arm("sub").unwrap();
        assert_eq!(body["location"], "global");
    }

    #[tokio::test]
    async fn test_finder() {
        let fake = FakeArm::new("sub");
        let finder = ArmFinder::<DnsZone>::new();
        assert!(finder.find_all(&fake).await.unwrap().is_empty());

        DnsZone::new("example.com", "rg").create(&fake).await.unwrap();
        let found = finder.find_all(&fake).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "example.com");
    }

    #[test]
    fn test_zone_ref_from_record_set_id() {
        let id = ResourceId::parse(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/A/www",
        )
        .unwrap();
        let zone = ZoneRef::from_record_set_id(&id).unwrap();
        assert_eq!(zone.name, "example.com");
        assert_eq!(zone.resource_group, "rg");
    }
}
