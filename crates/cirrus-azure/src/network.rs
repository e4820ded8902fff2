//! Virtual networks and their subnets

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result, SubResource, diff_subresources};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const API_VERSION: &str = "2023-09-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::required("address-spaces").updatable(),
    Field::optional("dns-servers").updatable(),
    Field::optional("subnets").updatable(),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

/// Creates a virtual network.
///
/// ```text
/// azure::network network-example
///     name: "network-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     address-spaces: ["10.0.0.0/27", "10.1.0.0/27"]
///
///     subnet
///         address-prefix: "10.0.0.0/28"
///         name: "subnet1"
///     end
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Network {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub address_spaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<Subnet>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Subnet {
    pub name: String,
    pub address_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_security_group_id: Option<String>,
}

impl SubResource for Subnet {
    type Key = String;

    fn primary_key(&self) -> String {
        self.name.clone()
    }
}

impl Subnet {
    fn to_arm(&self) -> Value {
        let mut properties = json!({ "addressPrefix": self.address_prefix });
        if let Some(nsg) = &self.network_security_group_id {
            properties["networkSecurityGroup"] = value::id_ref(nsg);
        }
        json!({ "name": self.name, "properties": properties })
    }

    fn from_arm(v: &Value) -> Result<Self> {
        Ok(Self {
            name: value::required_str(v, "/name")?,
            address_prefix: value::str_at(v, "/properties/addressPrefix").unwrap_or_default(),
            network_security_group_id: value::str_at(v, "/properties/networkSecurityGroup/id"),
        })
    }
}

impl Network {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
        address_spaces: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            address_spaces,
            dns_servers: Vec::new(),
            subnets: Vec::new(),
            tags: Tags::new(),
            id: None,
        }
    }

    /// Id of a subnet of this network
    pub fn subnet_id(&self, subscription_id: &str, subnet: &str) -> String {
        self.arm_id(subscription_id)
            .child("subnets", subnet)
            .to_string()
    }

    fn subnets_value(&self) -> Value {
        Value::Array(self.subnets.iter().map(Subnet::to_arm).collect())
    }
}

#[async_trait]
impl ArmResource for Network {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "virtualNetworks",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": {
                "addressSpace": { "addressPrefixes": self.address_spaces },
                "dhcpOptions": { "dnsServers": self.dns_servers },
                "subnets": self.subnets_value(),
            }
        }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            region: value::str_at(v, "/location").unwrap_or_default(),
            address_spaces: value::strings_at(v, "/properties/addressSpace/addressPrefixes"),
            dns_servers: value::strings_at(v, "/properties/dhcpOptions/dnsServers"),
            subnets: value::array_at(v, "/properties/subnets")
                .iter()
                .map(Subnet::from_arm)
                .collect::<Result<_>>()?,
            tags: value::tags_of(v),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "virtualNetworks");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for Network {
    const TYPE: &'static str = "network";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        let mut names: Vec<&str> = self.subnets.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!("duplicate subnet '{}'", pair[0]),
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

        if diff.changed(|n| &n.address_spaces) {
            update.set(
                "address-spaces",
                "/properties/addressSpace/addressPrefixes",
                json!(self.address_spaces),
            );
        }

        if diff.changed(|n| &n.dns_servers) {
            update.set(
                "dns-servers",
                "/properties/dhcpOptions/dnsServers",
                json!(self.dns_servers),
            );
        }

        if diff.changed(|n| &n.subnets) {
            let subnets = diff_subresources(&current.subnets, &self.subnets);
            tracing::debug!(
                "subnets: {} added, {} modified, {} removed",
                subnets.added.len(),
                subnets.modified.len(),
                subnets.removed.len()
            );
            update.set("subnets", "/properties/subnets", self.subnets_value());
        }

        if diff.changed(|n| &n.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}
