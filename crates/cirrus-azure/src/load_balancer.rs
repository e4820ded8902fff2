//! Load balancers
//!
//! Frontends, backend pools, probes and rules are sub-resources of the
//! balancer. Rules reference the others by name; the names are turned into
//! child ids when the request body is built.

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, name_of, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result, SubResource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;

const API_VERSION: &str = "2023-09-01";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::optional("sku"),
    Field::required("frontends").updatable(),
    Field::optional("backend-pools").updatable(),
    Field::optional("probes").updatable(),
    Field::optional("rules").updatable(),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerSku {
    #[default]
    Basic,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Frontend {
    pub name: String,
    #[serde(flatten)]
    pub target: FrontendTarget,
}

/// Public frontends sit on a public IP; private ones on a subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FrontendTarget {
    #[serde(rename_all = "kebab-case")]
    Public { public_ip_address_id: String },
    #[serde(rename_all = "kebab-case")]
    Private {
        subnet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_ip_address: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeProtocol {
    Tcp,
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Probe {
    pub name: String,
    pub protocol: ProbeProtocol,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_interval")]
    pub interval_in_seconds: u32,
    #[serde(default = "default_probe_count")]
    pub number_of_probes: u32,
}

fn default_interval() -> u32 {
    15
}

fn default_probe_count() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadBalancingRule {
    pub name: String,
    pub frontend: String,
    pub backend_pool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    pub protocol: TransportProtocol,
    pub frontend_port: u16,
    pub backend_port: u16,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_in_minutes: u32,
    #[serde(default)]
    pub floating_ip: bool,
}

fn default_idle_timeout() -> u32 {
    4
}

impl SubResource for Frontend {
    type Key = String;

    fn primary_key(&self) -> String {
        self.name.clone()
    }
}

impl SubResource for Probe {
    type Key = String;

    fn primary_key(&self) -> String {
        self.name.clone()
    }
}

impl SubResource for LoadBalancingRule {
    type Key = String;

    fn primary_key(&self) -> String {
        self.name.clone()
    }
}

/// Creates a load balancer.
///
/// ```text
/// azure::load-balancer load-balancer-example
///     name: "load-balancer-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     backend-pools: ["backend"]
///
///     frontend
///         name: "public-frontend"
///         type: "public"
///         public-ip-address-id: $(azure::public-ip-address public-ip-address-example | id)
///     end
///
///     probe
///         name: "healthcheck"
///         protocol: "Http"
///         port: 80
///         path: "/"
///     end
///
///     rule
///         name: "http"
///         frontend: "public-frontend"
///         backend-pool: "backend"
///         probe: "healthcheck"
///         protocol: "Tcp"
///         frontend-port: 80
///         backend-port: 80
///     end
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadBalancer {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    #[serde(default)]
    pub sku: LoadBalancerSku,
    pub frontends: Vec<Frontend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_pools: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<Probe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<LoadBalancingRule>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LoadBalancer {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            sku: LoadBalancerSku::default(),
            frontends: Vec::new(),
            backend_pools: Vec::new(),
            probes: Vec::new(),
            rules: Vec::new(),
            tags: Tags::new(),
            id: None,
        }
    }

    fn child_ref(&self, subscription_id: &str, collection: &str, name: &str) -> Value {
        value::id_ref(
            &self
                .arm_id(subscription_id)
                .child(collection, name)
                .to_string(),
        )
    }

    fn frontends_value(&self) -> Value {
        Value::Array(
            self.frontends
                .iter()
                .map(|frontend| {
                    let properties = match &frontend.target {
                        FrontendTarget::Public {
                            public_ip_address_id,
                        } => json!({ "publicIPAddress": value::id_ref(public_ip_address_id) }),
                        FrontendTarget::Private {
                            subnet_id,
                            private_ip_address,
                        } => match private_ip_address {
                            Some(address) => json!({
                                "subnet": value::id_ref(subnet_id),
                                "privateIPAllocationMethod": "Static",
                                "privateIPAddress": address,
                            }),
                            None => json!({
                                "subnet": value::id_ref(subnet_id),
                                "privateIPAllocationMethod": "Dynamic",
                            }),
                        },
                    };
                    json!({ "name": frontend.name, "properties": properties })
                })
                .collect(),
        )
    }

    fn backend_pools_value(&self) -> Value {
        Value::Array(
            self.backend_pools
                .iter()
                .map(|name| json!({ "name": name }))
                .collect(),
        )
    }

    fn probes_value(&self) -> Value {
        Value::Array(
            self.probes
                .iter()
                .map(|probe| {
                    let mut properties = json!({
                        "protocol": probe.protocol,
                        "port": probe.port,
                        "intervalInSeconds": probe.interval_in_seconds,
                        "numberOfProbes": probe.number_of_probes,
                    });
                    if let Some(path) = &probe.path {
                        properties["requestPath"] = json!(path);
                    }
                    json!({ "name": probe.name, "properties": properties })
                })
                .collect(),
        )
    }

    fn rules_value(&self, subscription_id: &str) -> Value {
        Value::Array(
            self.rules
                .iter()
                .map(|rule| {
                    let mut properties = json!({
                        "frontendIPConfiguration":
                            self.child_ref(subscription_id, "frontendIPConfigurations", &rule.frontend),
                        "backendAddressPool":
                            self.child_ref(subscription_id, "backendAddressPools", &rule.backend_pool),
                        "protocol": rule.protocol,
                        "frontendPort": rule.frontend_port,
                        "backendPort": rule.backend_port,
                        "idleTimeoutInMinutes": rule.idle_timeout_in_minutes,
                        "enableFloatingIP": rule.floating_ip,
                    });
                    if let Some(probe) = &rule.probe {
                        properties["probe"] = self.child_ref(subscription_id, "probes", probe);
                    }
                    json!({ "name": rule.name, "properties": properties })
                })
                .collect(),
        )
    }

    fn check_references(&self) -> Result<()> {
        let names = |items: Vec<&str>| -> BTreeSet<String> {
            items.into_iter().map(str::to_string).collect()
        };
        let frontends = names(self.frontends.iter().map(|f| f.name.as_str()).collect());
        let pools = names(self.backend_pools.iter().map(String::as_str).collect());
        let probes = names(self.probes.iter().map(|p| p.name.as_str()).collect());

        for rule in &self.rules {
            let missing = if !frontends.contains(&rule.frontend) {
                Some(("frontend", &rule.frontend))
            } else if !pools.contains(&rule.backend_pool) {
                Some(("backend pool", &rule.backend_pool))
            } else {
                rule.probe
                    .as_ref()
                    .filter(|p| !probes.contains(*p))
                    .map(|p| ("probe", p))
            };
            if let Some((kind, name)) = missing {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!("rule '{}' references unknown {} '{}'", rule.name, kind, name),
                ));
            }
        }
        Ok(())
    }
}

fn frontend_from_arm(v: &Value) -> Result<Frontend> {
    let target = match value::str_at(v, "/properties/publicIPAddress/id") {
        Some(public_ip_address_id) => FrontendTarget::Public {
            public_ip_address_id,
        },
        None => {
            let is_static = value::str_at(v, "/properties/privateIPAllocationMethod")
                .is_some_and(|m| m.eq_ignore_ascii_case("static"));
            FrontendTarget::Private {
                subnet_id: value::str_at(v, "/properties/subnet/id").unwrap_or_default(),
                private_ip_address: value::str_at(v, "/properties/privateIPAddress")
                    .filter(|_| is_static),
            }
        }
    };
    Ok(Frontend {
        name: value::required_str(v, "/name")?,
        target,
    })
}

fn probe_from_arm(v: &Value) -> Result<Probe> {
    Ok(Probe {
        name: value::required_str(v, "/name")?,
        protocol: value::enum_at(v, "/properties/protocol")?,
        port: value::uint_at(v, "/properties/port")?.unwrap_or_default(),
        path: value::str_at(v, "/properties/requestPath"),
        interval_in_seconds: value::uint_at(v, "/properties/intervalInSeconds")?
            .unwrap_or_else(default_interval),
        number_of_probes: value::uint_at(v, "/properties/numberOfProbes")?
            .unwrap_or_else(default_probe_count),
    })
}

fn rule_from_arm(v: &Value) -> Result<LoadBalancingRule> {
    let referenced = |pointer: &str| value::str_at(v, pointer).map(|id| name_of(&id).to_string());

    Ok(LoadBalancingRule {
        name: value::required_str(v, "/name")?,
        frontend: referenced("/properties/frontendIPConfiguration/id").unwrap_or_default(),
        backend_pool: referenced("/properties/backendAddressPool/id").unwrap_or_default(),
        probe: referenced("/properties/probe/id"),
        protocol: value::enum_at(v, "/properties/protocol")?,
        frontend_port: value::uint_at(v, "/properties/frontendPort")?.unwrap_or_default(),
        backend_port: value::uint_at(v, "/properties/backendPort")?.unwrap_or_default(),
        idle_timeout_in_minutes: value::uint_at(v, "/properties/idleTimeoutInMinutes")?
            .unwrap_or_else(default_idle_timeout),
        floating_ip: value::bool_at(v, "/properties/enableFloatingIP").unwrap_or(false),
    })
}

#[async_trait]
impl ArmResource for LoadBalancer {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "loadBalancers",
            &self.name,
        )
    }

    fn to_arm(&self, subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "sku": { "name": self.sku },
            "properties": {
                "frontendIPConfigurations": self.frontends_value(),
                "backendAddressPools": self.backend_pools_value(),
                "probes": self.probes_value(),
                "loadBalancingRules": self.rules_value(subscription_id),
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
            sku: value::optional_enum_at(v, "/sku/name")?.unwrap_or_default(),
            frontends: value::array_at(v, "/properties/frontendIPConfigurations")
                .iter()
                .map(frontend_from_arm)
                .collect::<Result<_>>()?,
            backend_pools: value::array_at(v, "/properties/backendAddressPools")
                .iter()
                .filter_map(|p| value::str_at(p, "/name"))
                .collect(),
            probes: value::array_at(v, "/properties/probes")
                .iter()
                .map(probe_from_arm)
                .collect::<Result<_>>()?,
            rules: value::array_at(v, "/properties/loadBalancingRules")
                .iter()
                .map(rule_from_arm)
                .collect::<Result<_>>()?,
            tags: value::tags_of(v),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "loadBalancers");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for LoadBalancer {
    const TYPE: &'static str = "load-balancer";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        for probe in &self.probes {
            let needs_path = matches!(probe.protocol, ProbeProtocol::Http | ProbeProtocol::Https);
            match (needs_path, probe.path.as_deref()) {
                (true, None | Some("")) => {
                    return Err(CloudError::invalid(
                        Self::TYPE,
                        format!("probe '{}': {:?} probes need a path", probe.name, probe.protocol),
                    ));
                }
                (false, Some(_)) => {
                    return Err(CloudError::invalid(
                        Self::TYPE,
                        format!("probe '{}': Tcp probes take no path", probe.name),
                    ));
                }
                _ => {}
            }
        }

        if self.sku == LoadBalancerSku::Basic
            && self
                .rules
                .iter()
                .any(|r| r.protocol == TransportProtocol::All)
        {
            return Err(CloudError::invalid(
                Self::TYPE,
                "protocol All is only available with the Standard sku",
            ));
        }

        self.check_references()
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
        let subscription_id = client.subscription_id();
        let mut update = adapter::begin_update(self, client).await?;

        if diff.changed(|lb| &lb.frontends) {
            update.set(
                "frontends",
                "/properties/frontendIPConfigurations",
                self.frontends_value(),
            );
        }

        if diff.changed(|lb| &lb.backend_pools) {
            update.set(
                "backend-pools",
                "/properties/backendAddressPools",
                self.backend_pools_value(),
            );
        }

        if diff.changed(|lb| &lb.probes) {
            update.set("probes", "/properties/probes", self.probes_value());
        }

        if diff.changed(|lb| &lb.rules) {
            update.set(
                "rules",
                "/properties/loadBalancingRules",
                self.rules_value(subscription_id),
            );
        }

        if diff.changed(|lb| &lb.tags) {
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

    fn balancer() -> LoadBalancer {
        let mut lb = LoadBalancer::new("lb-example", "rg", "japaneast");
        lb.frontends.push(Frontend {
            name: "public-frontend".into(),
            target: FrontendTarget::Public {
                public_ip_address_id: "/publicIPAddresses/ip".into(),
            },
        });
        lb.backend_pools.push("backend".into());
        lb.probes.push(Probe {
            name: "healthcheck".into(),
            protocol: ProbeProtocol::Http,
            port: 80,
            path: Some("/".into()),
            interval_in_seconds: 15,
            number_of_probes: 2,
        });
        lb.rules.push(LoadBalancingRule {
            name: "http".into(),
            frontend: "public-frontend".into(),
            backend_pool: "backend".into(),
            probe: Some("healthcheck".into()),
            protocol: TransportProtocol::Tcp,
            frontend_port: 80,
            backend_port: 80,
            idle_timeout_in_minutes: 4,
            floating_ip: false,
        });
        lb
    }

    #[tokio::test]
    async fn test_create_then_refresh_round_trip() {
        let fake = FakeArm::new("sub");
        let mut declared = balancer();
        declared.create(&fake).await.unwrap();

        let ArmCall::Put { body, .. } = &fake.writes()[0] else {
            panic!("expected PUT");
        };
        assert_eq!(
            body["properties"]["loadBalancingRules"][0]["properties"]["probe"]["id"],
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb-example/probes/healthcheck"
        );

        let mut refreshed = declared.clone();
        assert!(refreshed.refresh(&fake).await.unwrap());
        assert_eq!(refreshed, declared);
    }

    #[tokio::test]
    async fn test_changing_a_rule_leaves_probes_alone() {
        let fake = FakeArm::new("sub");
        let mut current = balancer();
        current.create(&fake).await.unwrap();
        let before = fake.object(current.id.as_deref().unwrap()).unwrap();
        fake.clear_calls();

        let mut desired = current.clone();
        desired.rules[0].frontend_port = 8080;
        desired.update(&fake, &current).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        assert_eq!(
            body["properties"]["loadBalancingRules"][0]["properties"]["frontendPort"],
            8080
        );
        assert_eq!(body["properties"]["probes"], before["properties"]["probes"]);
    }

    #[test]
    fn test_http_probe_needs_path() {
        let mut lb = balancer();
        lb.probes[0].path = None;
        let err = lb.validate().unwrap_err();
        assert!(err.to_string().contains("need a path"));
    }

    #[test]
    fn test_rule_references_must_exist() {
        let mut lb = balancer();
        lb.rules[0].backend_pool = "missing".into();
        let err = lb.validate().unwrap_err();
        assert!(err.to_string().contains("unknown backend pool 'missing'"));
    }

    #[test]
    fn test_frontend_discriminator() {
        let mut registry: ResourceRegistry<dyn Arm> = ResourceRegistry::new();
        registry.register::<LoadBalancer>();

        let private = registry.resource(
            "load-balancer",
            json!({
                "name": "lb",
                "resource-group": "rg",
                "region": "japaneast",
                "frontends": [{ "name": "f", "type": "private", "subnet-id": "/subnets/s" }],
            }),
        );
        assert!(private.is_ok());

        let unknown = registry.resource(
            "load-balancer",
            json!({
                "name": "lb",
                "resource-group": "rg",
                "region": "japaneast",
                "frontends": [{ "name": "f", "type": "gateway" }],
            }),
        );
        assert!(matches!(unknown, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_range_port_is_not_truncated() {
        let probe = json!({
            "name": "health",
            "properties": { "protocol": "Tcp", "port": 65536 + 80 },
        });
        let err = probe_from_arm(&probe).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let rule = json!({
            "name": "http",
            "properties": { "protocol": "Tcp", "frontendPort": 80, "backendPort": 8080 },
        });
        let rule = rule_from_arm(&rule).unwrap();
        assert_eq!((rule.frontend_port, rule.backend_port), (80, 8080));
    }
}
