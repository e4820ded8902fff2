//! Network security groups and their rules

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
    Field::optional("rules").updatable(),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    #[default]
    #[serde(rename = "*")]
    Any,
}

/// Creates a network security group.
///
/// ```text
/// azure::network-security-group network-security-group-example
///     name: "network-security-group-example"
///     resource-group: $(azure::resource-group resource-group-example)
///
///     rule
///         name: "allow-ssh"
///         priority: 100
///         direction: "Inbound"
///         access: "Allow"
///         protocol: "Tcp"
///         destination-port-ranges: ["22"]
///     end
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkSecurityGroup {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SecurityRule>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityRule {
    pub name: String,
    pub priority: u32,
    pub direction: Direction,
    pub access: Access,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "any")]
    pub source_address_prefixes: Vec<String>,
    #[serde(default = "any")]
    pub source_port_ranges: Vec<String>,
    #[serde(default = "any")]
    pub destination_address_prefixes: Vec<String>,
    #[serde(default = "any")]
    pub destination_port_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn any() -> Vec<String> {
    vec!["*".to_string()]
}

impl SubResource for SecurityRule {
    type Key = String;

    fn primary_key(&self) -> String {
        self.name.clone()
    }
}

impl SecurityRule {
    pub fn new(name: impl Into<String>, priority: u32, direction: Direction, access: Access) -> Self {
        Self {
            name: name.into(),
            priority,
            direction,
            access,
            protocol: Protocol::default(),
            source_address_prefixes: any(),
            source_port_ranges: any(),
            destination_address_prefixes: any(),
            destination_port_ranges: any(),
            description: None,
        }
    }

    fn to_arm(&self) -> Value {
        let mut properties = json!({
            "priority": self.priority,
            "direction": self.direction,
            "access": self.access,
            "protocol": self.protocol,
            "sourceAddressPrefixes": self.source_address_prefixes,
            "sourcePortRanges": self.source_port_ranges,
            "destinationAddressPrefixes": self.destination_address_prefixes,
            "destinationPortRanges": self.destination_port_ranges,
        });
        if let Some(description) = &self.description {
            properties["description"] = json!(description);
        }
        json!({ "name": self.name, "properties": properties })
    }

    fn from_arm(v: &Value) -> Result<Self> {
        // The API collapses single-item lists into the singular property.
        let list = |plural: &str, singular: &str| {
            let values = value::strings_at(v, &format!("/properties/{}", plural));
            if values.is_empty() {
                value::str_at(v, &format!("/properties/{}", singular))
                    .map(|s| vec![s])
                    .unwrap_or_else(any)
            } else {
                values
            }
        };

        Ok(Self {
            name: value::required_str(v, "/name")?,
            priority: value::uint_at(v, "/properties/priority")?.unwrap_or_default(),
            direction: value::enum_at(v, "/properties/direction")?,
            access: value::enum_at(v, "/properties/access")?,
            protocol: value::enum_at(v, "/properties/protocol").unwrap_or_default(),
            source_address_prefixes: list("sourceAddressPrefixes", "sourceAddressPrefix"),
            source_port_ranges: list("sourcePortRanges", "sourcePortRange"),
            destination_address_prefixes: list(
                "destinationAddressPrefixes",
                "destinationAddressPrefix",
            ),
            destination_port_ranges: list("destinationPortRanges", "destinationPortRange"),
            description: value::str_at(v, "/properties/description"),
        })
    }
}

impl NetworkSecurityGroup {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            rules: Vec::new(),
            tags: Tags::new(),
            id: None,
        }
    }

    fn rules_value(&self) -> Value {
        Value::Array(self.rules.iter().map(SecurityRule::to_arm).collect())
    }
}

#[async_trait]
impl ArmResource for NetworkSecurityGroup {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "networkSecurityGroups",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": { "securityRules": self.rules_value() }
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
            rules: value::array_at(v, "/properties/securityRules")
                .iter()
                .map(SecurityRule::from_arm)
                .collect::<Result<_>>()?,
            tags: value::tags_of(v),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "networkSecurityGroups");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for NetworkSecurityGroup {
    const TYPE: &'static str = "network-security-group";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        for rule in &self.rules {
            if !(100..=4096).contains(&rule.priority) {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!(
                        "rule '{}': priority must be between 100 and 4096",
                        rule.name
                    ),
                ));
            }
        }

        let mut keys: Vec<(Direction, u32)> = Vec::new();
        for rule in &self.rules {
            if keys.contains(&(rule.direction, rule.priority)) {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!(
                        "priority {} is used by more than one {:?} rule",
                        rule.priority, rule.direction
                    ),
                ));
            }
            keys.push((rule.direction, rule.priority));
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

        if diff.changed(|g| &g.rules) {
            let rules = diff_subresources(&current.rules, &self.rules);
            tracing::debug!(
                "security rules: {} added, {} modified, {} removed",
                rules.added.len(),
                rules.modified.len(),
                rules.removed.len()
            );
            update.set("rules", "/properties/securityRules", self.rules_value());
        }

        if diff.changed(|g| &g.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}
