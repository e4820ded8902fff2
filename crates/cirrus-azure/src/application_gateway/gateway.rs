use super::{API_VERSION, FRONTEND_IP, GATEWAY_IP};
use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, name_of, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result, SubResource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::net::IpAddr;

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::required("sku").updatable(),
    Field::optional("instance-count").updatable(),
    Field::required("subnet-id"),
    Field::optional("public-ip-address-id"),
    Field::required("frontend-ports").updatable(),
    Field::required("backend-pools").updatable(),
    Field::required("http-settings").updatable(),
    Field::required("listeners").updatable(),
    Field::required("rules").updatable(),
    Field::optional("probes").updatable(),
    Field::optional("certificates").updatable(),
    Field::optional("tags").updatable(),
    Field::output("operational-state"),
    Field::output("id"),
];

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewaySku {
    Standard_Small,
    Standard_Medium,
    Standard_Large,
    WAF_Medium,
    WAF_Large,
    Standard_v2,
    WAF_v2,
}

impl GatewaySku {
    pub fn tier(self) -> &'static str {
        match self {
            GatewaySku::Standard_Small | GatewaySku::Standard_Medium | GatewaySku::Standard_Large => {
                "Standard"
            }
            GatewaySku::WAF_Medium | GatewaySku::WAF_Large => "WAF",
            GatewaySku::Standard_v2 => "Standard_v2",
            GatewaySku::WAF_v2 => "WAF_v2",
        }
    }

    pub fn is_v2(self) -> bool {
        matches!(self, GatewaySku::Standard_v2 | GatewaySku::WAF_v2)
    }

    fn max_instances(self) -> u32 {
        if self.is_v2() { 125 } else { 32 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FrontendPort {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendPool {
    pub name: String,
    /// IP addresses or host names
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpSettings {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub cookie_based_affinity: bool,
    #[serde(default = "default_timeout")]
    pub request_timeout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Listener {
    pub name: String,
    pub frontend_port: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// SSL certificate name; required for https
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingRule {
    pub name: String,
    pub listener: String,
    pub backend_pool: String,
    pub http_settings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayProbe {
    pub name: String,
    #[serde(default)]
    pub protocol: Protocol,
    pub host: String,
    pub path: String,
    #[serde(default = "default_timeout")]
    pub interval: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SslCertificate {
    pub name: String,
    #[serde(flatten)]
    pub source: CertificateSource,
}

/// Where the certificate material lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum CertificateSource {
    /// Base64-encoded PFX uploaded with the gateway
    Pfx {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Secret in Azure Key Vault, read by the gateway's managed identity
    #[serde(rename_all = "kebab-case")]
    KeyVault { secret_id: String },
}

fn default_timeout() -> u32 {
    30
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_instance_count() -> u32 {
    2
}

macro_rules! keyed_by_name {
    ($($ty:ty),*) => {
        $(impl SubResource for $ty {
            type Key = String;

            fn primary_key(&self) -> String {
                self.name.clone()
            }
        })*
    };
}

keyed_by_name!(
    FrontendPort,
    BackendPool,
    HttpSettings,
    Listener,
    RoutingRule,
    GatewayProbe,
    SslCertificate
);

impl SslCertificate {
    pub(crate) fn to_arm(&self) -> Value {
        let properties = match &self.source {
            CertificateSource::Pfx { data, password } => match password {
                Some(password) => json!({ "data": data, "password": password }),
                None => json!({ "data": data }),
            },
            CertificateSource::KeyVault { secret_id } => json!({ "keyVaultSecretId": secret_id }),
        };
        json!({ "name": self.name, "properties": properties })
    }

    /// PFX material never comes back from the API, only its public part
    pub(crate) fn from_arm(v: &Value) -> Result<Self> {
        let source = match value::str_at(v, "/properties/keyVaultSecretId") {
            Some(secret_id) => CertificateSource::KeyVault { secret_id },
            None => CertificateSource::Pfx {
                data: String::new(),
                password: None,
            },
        };
        Ok(Self {
            name: value::required_str(v, "/name")?,
            source,
        })
    }
}

/// Creates an application gateway.
///
/// ```text
/// azure::application-gateway application-gateway-example
///     name: "application-gateway-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     sku: "Standard_v2"
///     instance-count: 2
///     subnet-id: $(azure::network network-example | subnet-id "gateway")
///     public-ip-address-id: $(azure::public-ip-address public-ip-address-example | id)
///     frontend-ports: [{ name: "http", port: 80 }]
///     backend-pools: [{ name: "web", addresses: ["10.0.1.4"] }]
///     http-settings: [{ name: "web-http", port: 80 }]
///     listeners: [{ name: "http", frontend-port: "http" }]
///     rules: [{ name: "web", listener: "http", backend-pool: "web", http-settings: "web-http", priority: 100 }]
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplicationGateway {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub sku: GatewaySku,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    pub subnet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address_id: Option<String>,
    pub frontend_ports: Vec<FrontendPort>,
    pub backend_pools: Vec<BackendPool>,
    pub http_settings: Vec<HttpSettings>,
    pub listeners: Vec<Listener>,
    pub rules: Vec<RoutingRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<GatewayProbe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<SslCertificate>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ApplicationGateway {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
        sku: GatewaySku,
        subnet_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            sku,
            instance_count: default_instance_count(),
            subnet_id: subnet_id.into(),
            public_ip_address_id: None,
            frontend_ports: Vec::new(),
            backend_pools: Vec::new(),
            http_settings: Vec::new(),
            listeners: Vec::new(),
            rules: Vec::new(),
            probes: Vec::new(),
            certificates: Vec::new(),
            tags: Tags::new(),
            operational_state: None,
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

    fn sku_value(&self) -> Value {
        json!({
            "name": self.sku,
            "tier": self.sku.tier(),
            "capacity": self.instance_count,
        })
    }

    fn frontend_ip_value(&self) -> Value {
        let properties = match &self.public_ip_address_id {
            Some(public_ip) => json!({ "publicIPAddress": value::id_ref(public_ip) }),
            None => json!({
                "subnet": value::id_ref(&self.subnet_id),
                "privateIPAllocationMethod": "Dynamic",
            }),
        };
        json!([{ "name": FRONTEND_IP, "properties": properties }])
    }

    fn frontend_ports_value(&self) -> Value {
        Value::Array(
            self.frontend_ports
                .iter()
                .map(|p| json!({ "name": p.name, "properties": { "port": p.port } }))
                .collect(),
        )
    }

    fn backend_pools_value(&self) -> Value {
        Value::Array(
            self.backend_pools
                .iter()
                .map(|pool| {
                    let addresses: Vec<Value> = pool
                        .addresses
                        .iter()
                        .map(|address| match address.parse::<IpAddr>() {
                            Ok(_) => json!({ "ipAddress": address }),
                            Err(_) => json!({ "fqdn": address }),
                        })
                        .collect();
                    json!({
                        "name": pool.name,
                        "properties": { "backendAddresses": addresses },
                    })
                })
                .collect(),
        )
    }

    fn http_settings_value(&self, subscription_id: &str) -> Value {
        Value::Array(
            self.http_settings
                .iter()
                .map(|settings| {
                    let mut properties = json!({
                        "port": settings.port,
                        "protocol": settings.protocol,
                        "cookieBasedAffinity":
                            if settings.cookie_based_affinity { "Enabled" } else { "Disabled" },
                        "requestTimeout": settings.request_timeout,
                    });
                    if let Some(host_name) = &settings.host_name {
                        properties["hostName"] = json!(host_name);
                    }
                    if let Some(probe) = &settings.probe {
                        properties["probe"] = self.child_ref(subscription_id, "probes", probe);
                    }
                    json!({ "name": settings.name, "properties": properties })
                })
                .collect(),
        )
    }

    fn listeners_value(&self, subscription_id: &str) -> Value {
        Value::Array(
            self.listeners
                .iter()
                .map(|listener| {
                    let mut properties = json!({
                        "frontendIPConfiguration":
                            self.child_ref(subscription_id, "frontendIPConfigurations", FRONTEND_IP),
                        "frontendPort":
                            self.child_ref(subscription_id, "frontendPorts", &listener.frontend_port),
                        "protocol": listener.protocol,
                    });
                    if let Some(host_name) = &listener.host_name {
                        properties["hostName"] = json!(host_name);
                    }
                    if let Some(certificate) = &listener.certificate {
                        properties["sslCertificate"] =
                            self.child_ref(subscription_id, "sslCertificates", certificate);
                    }
                    json!({ "name": listener.name, "properties": properties })
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
                        "ruleType": "Basic",
                        "httpListener":
                            self.child_ref(subscription_id, "httpListeners", &rule.listener),
                        "backendAddressPool":
                            self.child_ref(subscription_id, "backendAddressPools", &rule.backend_pool),
                        "backendHttpSettings": self.child_ref(
                            subscription_id,
                            "backendHttpSettingsCollection",
                            &rule.http_settings,
                        ),
                    });
                    if let Some(priority) = rule.priority {
                        properties["priority"] = json!(priority);
                    }
                    json!({ "name": rule.name, "properties": properties })
                })
                .collect(),
        )
    }

    fn probes_value(&self) -> Value {
        Value::Array(
            self.probes
                .iter()
                .map(|probe| {
                    json!({
                        "name": probe.name,
                        "properties": {
                            "protocol": probe.protocol,
                            "host": probe.host,
                            "path": probe.path,
                            "interval": probe.interval,
                            "timeout": probe.timeout,
                            "unhealthyThreshold": probe.unhealthy_threshold,
                        }
                    })
                })
                .collect(),
        )
    }

    fn certificates_value(&self) -> Value {
        Value::Array(self.certificates.iter().map(SslCertificate::to_arm).collect())
    }

    /// Every name a rule, listener or setting refers to must be declared
    fn check_references(&self) -> Result<()> {
        fn names<'a>(items: impl Iterator<Item = &'a String>) -> BTreeSet<&'a str> {
            items.map(String::as_str).collect()
        }
        let ports = names(self.frontend_ports.iter().map(|p| &p.name));
        let pools = names(self.backend_pools.iter().map(|p| &p.name));
        let settings = names(self.http_settings.iter().map(|s| &s.name));
        let listeners = names(self.listeners.iter().map(|l| &l.name));
        let probes = names(self.probes.iter().map(|p| &p.name));
        let certificates = names(self.certificates.iter().map(|c| &c.name));

        for (kind, count, unique) in [
            ("frontend port", self.frontend_ports.len(), ports.len()),
            ("backend pool", self.backend_pools.len(), pools.len()),
            ("http settings", self.http_settings.len(), settings.len()),
            ("listener", self.listeners.len(), listeners.len()),
            ("probe", self.probes.len(), probes.len()),
            ("certificate", self.certificates.len(), certificates.len()),
        ] {
            if count != unique {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!("{} names must be unique", kind),
                ));
            }
        }

        let missing = |owner: &str, kind: &str, name: &str| {
            CloudError::invalid(
                Self::TYPE,
                format!("{} references unknown {} '{}'", owner, kind, name),
            )
        };

        for s in &self.http_settings {
            if let Some(probe) = &s.probe
                && !probes.contains(probe.as_str())
            {
                return Err(missing(&format!("http settings '{}'", s.name), "probe", probe));
            }
        }

        for listener in &self.listeners {
            let owner = format!("listener '{}'", listener.name);
            if !ports.contains(listener.frontend_port.as_str()) {
                return Err(missing(&owner, "frontend port", &listener.frontend_port));
            }
            if let Some(certificate) = &listener.certificate
                && !certificates.contains(certificate.as_str())
            {
                return Err(missing(&owner, "certificate", certificate));
            }
        }

        for rule in &self.rules {
            let owner = format!("rule '{}'", rule.name);
            if !listeners.contains(rule.listener.as_str()) {
                return Err(missing(&owner, "listener", &rule.listener));
            }
            if !pools.contains(rule.backend_pool.as_str()) {
                return Err(missing(&owner, "backend pool", &rule.backend_pool));
            }
            if !settings.contains(rule.http_settings.as_str()) {
                return Err(missing(&owner, "http settings", &rule.http_settings));
            }
        }
        Ok(())
    }
}

fn collect<T>(v: &Value, pointer: &str, item: fn(&Value) -> Result<T>) -> Result<Vec<T>> {
    value::array_at(v, pointer).iter().map(item).collect()
}

fn frontend_port_from_arm(v: &Value) -> Result<FrontendPort> {
    Ok(FrontendPort {
        name: value::required_str(v, "/name")?,
        port: value::uint_at(v, "/properties/port")?.unwrap_or_default(),
    })
}

fn backend_pool_from_arm(v: &Value) -> Result<BackendPool> {
    Ok(BackendPool {
        name: value::required_str(v, "/name")?,
        addresses: value::array_at(v, "/properties/backendAddresses")
            .iter()
            .filter_map(|a| value::str_at(a, "/ipAddress").or_else(|| value::str_at(a, "/fqdn")))
            .collect(),
    })
}

fn referenced_name(v: &Value, pointer: &str) -> Option<String> {
    value::str_at(v, pointer).map(|id| name_of(&id).to_string())
}

fn listener_from_arm(v: &Value) -> Result<Listener> {
    Ok(Listener {
        name: value::required_str(v, "/name")?,
        frontend_port: referenced_name(v, "/properties/frontendPort/id").unwrap_or_default(),
        protocol: value::enum_at(v, "/properties/protocol").unwrap_or_default(),
        host_name: value::str_at(v, "/properties/hostName"),
        certificate: referenced_name(v, "/properties/sslCertificate/id"),
    })
}

fn http_settings_from_arm(v: &Value) -> Result<HttpSettings> {
    Ok(HttpSettings {
        name: value::required_str(v, "/name")?,
        port: value::uint_at(v, "/properties/port")?.unwrap_or_default(),
        protocol: value::enum_at(v, "/properties/protocol").unwrap_or_default(),
        cookie_based_affinity: value::str_at(v, "/properties/cookieBasedAffinity")
            .is_some_and(|a| a == "Enabled"),
        request_timeout: value::uint_at(v, "/properties/requestTimeout")?
            .unwrap_or_else(default_timeout),
        host_name: value::str_at(v, "/properties/hostName"),
        probe: referenced_name(v, "/properties/probe/id"),
    })
}

fn rule_from_arm(v: &Value) -> Result<RoutingRule> {
    Ok(RoutingRule {
        name: value::required_str(v, "/name")?,
        listener: referenced_name(v, "/properties/httpListener/id").unwrap_or_default(),
        backend_pool: referenced_name(v, "/properties/backendAddressPool/id").unwrap_or_default(),
        http_settings: referenced_name(v, "/properties/backendHttpSettings/id")
            .unwrap_or_default(),
        priority: value::uint_at(v, "/properties/priority")?,
    })
}

fn probe_from_arm(v: &Value) -> Result<GatewayProbe> {
    Ok(GatewayProbe {
        name: value::required_str(v, "/name")?,
        protocol: value::enum_at(v, "/properties/protocol").unwrap_or_default(),
        host: value::str_at(v, "/properties/host").unwrap_or_default(),
        path: value::str_at(v, "/properties/path").unwrap_or_default(),
        interval: value::uint_at(v, "/properties/interval")?
            .unwrap_or_else(default_timeout),
        timeout: value::uint_at(v, "/properties/timeout")?
            .unwrap_or_else(default_timeout),
        unhealthy_threshold: value::uint_at(v, "/properties/unhealthyThreshold")?
            .unwrap_or_else(default_unhealthy_threshold),
    })
}

#[async_trait]
impl ArmResource for ApplicationGateway {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Network",
            "applicationGateways",
            &self.name,
        )
    }

    fn to_arm(&self, subscription_id: &str) -> Result<Value> {
        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": {
                "sku": self.sku_value(),
                "gatewayIPConfigurations": [{
                    "name": GATEWAY_IP,
                    "properties": { "subnet": value::id_ref(&self.subnet_id) },
                }],
                "frontendIPConfigurations": self.frontend_ip_value(),
                "frontendPorts": self.frontend_ports_value(),
                "backendAddressPools": self.backend_pools_value(),
                "backendHttpSettingsCollection": self.http_settings_value(subscription_id),
                "httpListeners": self.listeners_value(subscription_id),
                "requestRoutingRules": self.rules_value(subscription_id),
                "probes": self.probes_value(),
                "sslCertificates": self.certificates_value(),
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
            sku: value::enum_at(v, "/properties/sku/name")?,
            instance_count: value::uint_at(v, "/properties/sku/capacity")?
                .unwrap_or_else(default_instance_count),
            subnet_id: value::str_at(
                v,
                "/properties/gatewayIPConfigurations/0/properties/subnet/id",
            )
            .unwrap_or_default(),
            public_ip_address_id: value::str_at(
                v,
                "/properties/frontendIPConfigurations/0/properties/publicIPAddress/id",
            ),
            frontend_ports: collect(v, "/properties/frontendPorts", frontend_port_from_arm)?,
            backend_pools: collect(v, "/properties/backendAddressPools", backend_pool_from_arm)?,
            http_settings: collect(
                v,
                "/properties/backendHttpSettingsCollection",
                http_settings_from_arm,
            )?,
            listeners: collect(v, "/properties/httpListeners", listener_from_arm)?,
            rules: collect(v, "/properties/requestRoutingRules", rule_from_arm)?,
            probes: collect(v, "/properties/probes", probe_from_arm)?,
            certificates: collect(v, "/properties/sslCertificates", SslCertificate::from_arm)?,
            tags: value::tags_of(v),
            operational_state: value::str_at(v, "/properties/operationalState"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.operational_state = live.operational_state;
        self.id = live.id;
    }

    /// Uploaded PFX data and passwords are write-only
    fn keep_declared(&mut self, declared: &Self) {
        for certificate in &mut self.certificates {
            let declared_pfx = declared.certificates.iter().find(|c| {
                c.name == certificate.name && matches!(c.source, CertificateSource::Pfx { .. })
            });
            if let (Some(declared), CertificateSource::Pfx { .. }) =
                (declared_pfx, &certificate.source)
            {
                certificate.source = declared.source.clone();
            }
        }
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Network", "applicationGateways");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for ApplicationGateway {
    const TYPE: &'static str = "application-gateway";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if !(1..=self.sku.max_instances()).contains(&self.instance_count) {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!(
                    "instance-count must be between 1 and {} for {:?}",
                    self.sku.max_instances(),
                    self.sku
                ),
            ));
        }

        if self.sku.is_v2() {
            if self.public_ip_address_id.is_none() {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    "v2 gateways need public-ip-address-id",
                ));
            }
            if let Some(rule) = self.rules.iter().find(|r| r.priority.is_none()) {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!("rule '{}' needs a priority on a v2 gateway", rule.name),
                ));
            }
        }

        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.priority.is_some_and(|p| !(1..=20000).contains(&p)))
        {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!("rule '{}': priority must be between 1 and 20000", rule.name),
            ));
        }

        for listener in &self.listeners {
            match (listener.protocol, &listener.certificate) {
                (Protocol::Https, None) => {
                    return Err(CloudError::invalid(
                        Self::TYPE,
                        format!("https listener '{}' needs a certificate", listener.name),
                    ));
                }
                (Protocol::Http, Some(_)) => {
                    return Err(CloudError::invalid(
                        Self::TYPE,
                        format!("http listener '{}' cannot use a certificate", listener.name),
                    ));
                }
                _ => {}
            }
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

        if diff.changed(|g| &g.sku) || diff.changed(|g| &g.instance_count) {
            update.set("sku", "/properties/sku", self.sku_value());
        }

        if diff.changed(|g| &g.frontend_ports) {
            update.set(
                "frontend-ports",
                "/properties/frontendPorts",
                self.frontend_ports_value(),
            );
        }

        if diff.changed(|g| &g.backend_pools) {
            update.set(
                "backend-pools",
                "/properties/backendAddressPools",
                self.backend_pools_value(),
            );
        }

        if diff.changed(|g| &g.probes) {
            update.set("probes", "/properties/probes", self.probes_value());
        }

        if diff.changed(|g| &g.http_settings) {
            update.set(
                "http-settings",
                "/properties/backendHttpSettingsCollection",
                self.http_settings_value(subscription_id),
            );
        }

        if diff.changed(|g| &g.certificates) {
            // Unchanged certificates keep their live entry; the API does not
            // accept them back without their material.
            let untouched: BTreeSet<String> = self
                .certificates
                .iter()
                .filter(|c| current.certificates.contains(c))
                .map(|c| c.name.clone())
                .collect();
            let declared = self.certificates.clone();
            update.edit("certificates", move |body| {
                let live = value::array_at(body, "/properties/sslCertificates").to_vec();
                let merged: Vec<Value> = declared
                    .iter()
                    .map(|certificate| {
                        live.iter()
                            .find(|entry| {
                                untouched.contains(&certificate.name)
                                    && value::str_at(entry, "/name").as_deref()
                                        == Some(certificate.name.as_str())
                            })
                            .cloned()
                            .unwrap_or_else(|| certificate.to_arm())
                    })
                    .collect();
                value::set_pointer(body, "/properties/sslCertificates", Value::Array(merged));
            });
        }

        if diff.changed(|g| &g.listeners) {
            update.set(
                "listeners",
                "/properties/httpListeners",
                self.listeners_value(subscription_id),
            );
        }

        if diff.changed(|g| &g.rules) {
            update.set(
                "rules",
                "/properties/requestRoutingRules",
                self.rules_value(subscription_id),
            );
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapter::ArmFinder;
    use crate::testing::{ArmCall, FakeArm};
    use cirrus_cloud::{Finder, ResourceRegistry};

    pub(crate) fn gateway() -> ApplicationGateway {
        let mut gateway = ApplicationGateway::new(
            "agw-example",
            "rg",
            "japaneast",
            GatewaySku::Standard_v2,
            "/subnets/gateway",
        );
        gateway.public_ip_address_id = Some("/publicIPAddresses/agw".into());
        gateway.frontend_ports = vec![
            FrontendPort {
                name: "http".into(),
                port: 80,
            },
            FrontendPort {
                name: "https".into(),
                port: 443,
            },
        ];
        gateway.backend_pools.push(BackendPool {
            name: "web".into(),
            addresses: vec!["10.0.1.4".into(), "web.internal.example.com".into()],
        });
        gateway.http_settings.push(HttpSettings {
            name: "web-http".into(),
            port: 80,
            protocol: Protocol::Http,
            cookie_based_affinity: false,
            request_timeout: 30,
            host_name: None,
            probe: None,
        });
        gateway.certificates.push(SslCertificate {
            name: "site".into(),
            source: CertificateSource::Pfx {
                data: "MIIKcQIBAzCC".into(),
                password: Some("secret".into()),
            },
        });
        gateway.listeners = vec![
            Listener {
                name: "http".into(),
                frontend_port: "http".into(),
                protocol: Protocol::Http,
                host_name: None,
                certificate: None,
            },
            Listener {
                name: "https".into(),
                frontend_port: "https".into(),
                protocol: Protocol::Https,
                host_name: None,
                certificate: Some("site".into()),
            },
        ];
        gateway.rules = vec![
            RoutingRule {
                name: "web-http".into(),
                listener: "http".into(),
                backend_pool: "web".into(),
                http_settings: "web-http".into(),
                priority: Some(100),
            },
            RoutingRule {
                name: "web-https".into(),
                listener: "https".into(),
                backend_pool: "web".into(),
                http_settings: "web-http".into(),
                priority: Some(110),
            },
        ];
        gateway
    }

    #[tokio::test]
    async fn test_create_then_refresh_round_trip() {
        let fake = FakeArm::new("sub");
        let mut declared = gateway();
        declared.create(&fake).await.unwrap();

        let live = fake.object(declared.id.as_deref().unwrap()).unwrap();
        assert_eq!(live["properties"]["sku"]["tier"], "Standard_v2");
        assert_eq!(
            live["properties"]["backendAddressPools"][0]["properties"]["backendAddresses"][1]["fqdn"],
            "web.internal.example.com"
        );

        let mut refreshed = declared.clone();
        assert!(refreshed.refresh(&fake).await.unwrap());
        assert_eq!(refreshed, declared);
    }

    #[tokio::test]
    async fn test_instance_count_only_touches_sku() {
        let fake = FakeArm::new("sub");
        let mut current = gateway();
        current.create(&fake).await.unwrap();
        let before = fake.object(current.id.as_deref().unwrap()).unwrap();
        fake.clear_calls();

        let mut desired = current.clone();
        desired.instance_count = 4;
        desired.update(&fake, &current).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        assert_eq!(body["properties"]["sku"]["capacity"], 4);
        assert_eq!(
            body["properties"]["httpListeners"],
            before["properties"]["httpListeners"]
        );
    }

    #[tokio::test]
    async fn test_new_certificate_keeps_live_entries() {
        let fake = FakeArm::new("sub");
        let mut current = gateway();
        current.create(&fake).await.unwrap();

        // The live object only exposes the public part of uploaded certificates.
        let id = current.id.clone().unwrap();
        let mut live = fake.object(&id).unwrap();
        live["properties"]["sslCertificates"][0]["properties"] = json!({ "publicCertData": "PUB" });
        fake.insert(&id, live);
        fake.clear_calls();

        let mut desired = current.clone();
        desired.certificates.push(SslCertificate {
            name: "vault".into(),
            source: CertificateSource::KeyVault {
                secret_id: "https://kv.vault.azure.net/secrets/site".into(),
            },
        });
        desired.update(&fake, &current).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        let certificates = body["properties"]["sslCertificates"].as_array().unwrap();
        assert_eq!(certificates.len(), 2);
        assert_eq!(certificates[0]["properties"]["publicCertData"], "PUB");
        assert_eq!(
            certificates[1]["properties"]["keyVaultSecretId"],
            "https://kv.vault.azure.net/secrets/site"
        );
    }

    #[test]
    fn test_https_listener_needs_certificate() {
        let mut declared = gateway();
        declared.listeners[1].certificate = None;
        let err = declared.validate().unwrap_err();
        assert!(err.to_string().contains("https listener 'https' needs a certificate"));
    }

    #[test]
    fn test_v2_rules_need_priority() {
        let mut declared = gateway();
        declared.rules[0].priority = None;
        assert!(declared.validate().is_err());

        declared.sku = GatewaySku::Standard_Medium;
        assert!(declared.validate().is_ok());
    }

    #[test]
    fn test_unknown_reference() {
        let mut declared = gateway();
        declared.rules[0].http_settings = "missing".into();
        let err = declared.validate().unwrap_err();
        assert!(err.to_string().contains("unknown http settings 'missing'"));
    }

    #[test]
    fn test_unknown_sku_is_invalid_config() {
        let mut registry: ResourceRegistry<dyn Arm> = ResourceRegistry::new();
        registry.register::<ApplicationGateway>();
        let mut config = serde_json::to_value(gateway()).unwrap();
        config["sku"] = json!("Basic_v3");
        assert!(matches!(
            registry.resource("application-gateway", config),
            Err(CloudError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_finder() {
        let fake = FakeArm::new("sub");
        let finder = ArmFinder::<ApplicationGateway>::new();
        assert!(finder.find_all(&fake).await.unwrap().is_empty());

        let mut declared = gateway();
        declared.create(&fake).await.unwrap();
        let found = finder.find_all(&fake).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].listeners, declared.listeners);
    }
}
