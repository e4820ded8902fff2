//! Network interfaces

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const API_VERSION: &str = "2023-09-01";

/// Name of the single IP configuration every interface is created with
const IP_CONFIGURATION: &str = "ipconfig1";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::required("subnet-id"),
    Field::optional("static-private-ip-address"),
    Field::optional("public-ip-address-id").updatable(),
    Field::optional("network-security-group-id").updatable(),
    Field::optional("ip-forwarding").updatable(),
    Field::optional("tags").updatable(),
    Field::output("private-ip-address"),
    Field::output("id"),
];

/// Creates a network interface.
///
/// ```text
/// azure::network-interface network-interface-example
///     name: "network-interface-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     subnet-id: $(azure::network network-example | subnet-id "subnet1")
///     public-ip-address-id: $(azure::public-ip-address public-ip-address-example | id)
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkInterface {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub subnet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_private_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_security_group_id: Option<String>,
    #[serde(default)]
    pub ip_forwarding: bool,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl NetworkInterface {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
        subnet_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            subnet_id: subnet_id.into(),
            static_private_ip_address: None,
            public_ip_address_id: None,
            network_security_group_id: None,
            ip_forwarding: false,
            tags: Tags::new(),
            private_ip_address: None,
            id: None,
        }
    }

    fn ip_configuration(&self) -> Value {
        let mut properties = json!({ "subnet": value::id_ref(&self.subnet_id) });
        match &self.static_private_ip_address {
            Some(address) => {
                properties["privateIPAllocationMethod"] = json!("Static");
                properties["privateIPAddress"] = json!(address);
            }
            None => properties["privateIPAllocationMethod"] = json!("Dynamic"),
        }
        if let Some(public_ip) = &self.public_ip_address_id {
            properties["publicIPAddress"] = value::id_ref(public_ip);
        }
        json!({ "name": IP_CONFIGURATION, "properties": properties })
    }
}

#[async_trait]
impl ArmResource for NetworkInterface {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "networkInterfaces",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let mut body = json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": {
                "enableIPForwarding": self.ip_forwarding,
                "ipConfigurations": [self.ip_configuration()],
            }
        });
        if let Some(nsg) = &self.network_security_group_id {
            body["properties"]["networkSecurityGroup"] = value::id_ref(nsg);
        }
        Ok(body)
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;

        let primary = value::array_at(v, "/properties/ipConfigurations")
            .first()
            .cloned()
            .unwrap_or(Value::Null);
        let is_static = value::str_at(&primary, "/properties/privateIPAllocationMethod")
            .is_some_and(|m| m.eq_ignore_ascii_case("static"));
        let private_ip = value::str_at(&primary, "/properties/privateIPAddress");

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            region: value::str_at(v, "/location").unwrap_or_default(),
            subnet_id: value::str_at(&primary, "/properties/subnet/id").unwrap_or_default(),
            static_private_ip_address: if is_static { private_ip.clone() } else { None },
            public_ip_address_id: value::str_at(&primary, "/properties/publicIPAddress/id"),
            network_security_group_id: value::str_at(v, "/properties/networkSecurityGroup/id"),
            ip_forwarding: value::bool_at(v, "/properties/enableIPForwarding").unwrap_or(false),
            tags: value::tags_of(v),
            private_ip_address: private_ip,
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.private_ip_address = live.private_ip_address;
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "networkInterfaces");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for NetworkInterface {
    const TYPE: &'static str = "network-interface";
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

        if diff.changed(|n| &n.public_ip_address_id) {
            let public_ip = self
                .public_ip_address_id
                .as_deref()
                .map(value::id_ref)
                .unwrap_or(Value::Null);
            update.edit("public-ip-address-id", |body| {
                if let Some(primary) = body
                    .pointer_mut("/properties/ipConfigurations/0/properties")
                    .and_then(Value::as_object_mut)
                {
                    if public_ip.is_null() {
                        primary.remove("publicIPAddress");
                    } else {
                        primary.insert("publicIPAddress".into(), public_ip);
                    }
                }
            });
        }

        if diff.changed(|n| &n.network_security_group_id) {
            update.set(
                "network-security-group-id",
                "/properties/networkSecurityGroup",
                self.network_security_group_id
                    .as_deref()
                    .map(value::id_ref)
                    .unwrap_or(Value::Null),
            );
        }

        if diff.changed(|n| &n.ip_forwarding) {
            update.set(
                "ip-forwarding",
                "/properties/enableIPForwarding",
                json!(self.ip_forwarding),
            );
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
