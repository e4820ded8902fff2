use super::zone::{self, DnsZone, ZoneRef};
use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

const FIELDS: &[Field] = &[
    Field::required("dns-zone"),
    Field::required("name"),
    Field::required("type"),
    Field::optional("ttl").updatable(),
    Field::optional("metadata").updatable(),
    Field::optional("addresses").updatable(),
    Field::optional("cname").updatable(),
    Field::optional("mx-records").updatable(),
    Field::optional("name-servers").updatable(),
    Field::optional("domain-names").updatable(),
    Field::optional("srv-records").updatable(),
    Field::optional("values").updatable(),
    Field::output("fqdn"),
    Field::output("id"),
];

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    SRV,
    TXT,
}

impl RecordType {
    const ALL: [RecordType; 8] = [
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::MX,
        RecordType::NS,
        RecordType::PTR,
        RecordType::SRV,
        RecordType::TXT,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SRV => "SRV",
            RecordType::TXT => "TXT",
        }
    }

    /// Record type segment of a record set id; `None` for SOA and other unmanaged types
    pub fn from_id(id: &ResourceId) -> Option<Self> {
        let segment = id.resource_type()?;
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(segment))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// Record data, keyed by the `type` discriminator
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Records {
    A {
        addresses: Vec<String>,
    },
    AAAA {
        addresses: Vec<String>,
    },
    CNAME {
        cname: String,
    },
    MX {
        #[serde(rename = "mx-records")]
        records: Vec<MxRecord>,
    },
    NS {
        #[serde(rename = "name-servers")]
        name_servers: Vec<String>,
    },
    PTR {
        #[serde(rename = "domain-names")]
        domain_names: Vec<String>,
    },
    SRV {
        #[serde(rename = "srv-records")]
        records: Vec<SrvRecord>,
    },
    TXT {
        values: Vec<String>,
    },
}

impl Records {
    pub fn record_type(&self) -> RecordType {
        match self {
            Records::A { .. } => RecordType::A,
            Records::AAAA { .. } => RecordType::AAAA,
            Records::CNAME { .. } => RecordType::CNAME,
            Records::MX { .. } => RecordType::MX,
            Records::NS { .. } => RecordType::NS,
            Records::PTR { .. } => RecordType::PTR,
            Records::SRV { .. } => RecordType::SRV,
            Records::TXT { .. } => RecordType::TXT,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Records::A { addresses } | Records::AAAA { addresses } => addresses.is_empty(),
            Records::CNAME { cname } => cname.trim().is_empty(),
            Records::MX { records } => records.is_empty(),
            Records::NS { name_servers } => name_servers.is_empty(),
            Records::PTR { domain_names } => domain_names.is_empty(),
            Records::SRV { records } => records.is_empty(),
            Records::TXT { values } => values.is_empty(),
        }
    }

    /// (property name, property value) in the ARM record set body
    fn to_arm(&self) -> (&'static str, Value) {
        match self {
            Records::A { addresses } => (
                "ARecords",
                addresses.iter().map(|a| json!({ "ipv4Address": a })).collect(),
            ),
            Records::AAAA { addresses } => (
                "AAAARecords",
                addresses.iter().map(|a| json!({ "ipv6Address": a })).collect(),
            ),
            Records::CNAME { cname } => ("CNAMERecord", json!({ "cname": cname })),
            Records::MX { records } => (
                "MXRecords",
                records
                    .iter()
                    .map(|r| json!({ "preference": r.preference, "exchange": r.exchange }))
                    .collect(),
            ),
            Records::NS { name_servers } => (
                "NSRecords",
                name_servers.iter().map(|n| json!({ "nsdname": n })).collect(),
            ),
            Records::PTR { domain_names } => (
                "PTRRecords",
                domain_names.iter().map(|d| json!({ "ptrdname": d })).collect(),
            ),
            Records::SRV { records } => (
                "SRVRecords",
                records
                    .iter()
                    .map(|r| {
                        json!({
                            "priority": r.priority,
                            "weight": r.weight,
                            "port": r.port,
                            "target": r.target,
                        })
                    })
                    .collect(),
            ),
            Records::TXT { values } => (
                "TXTRecords",
                values
                    .iter()
                    .map(|v| json!({ "value": txt_chunks(v) }))
                    .collect(),
            ),
        }
    }

    fn from_arm(record_type: RecordType, properties: &Value) -> Result<Self> {
        let items = |key: &str, field: &str| -> Vec<String> {
            value::array_at(properties, &format!("/{}", key))
                .iter()
                .filter_map(|item| value::str_at(item, &format!("/{}", field)))
                .collect()
        };

        Ok(match record_type {
            RecordType::A => Records::A {
                addresses: items("ARecords", "ipv4Address"),
            },
            RecordType::AAAA => Records::AAAA {
                addresses: items("AAAARecords", "ipv6Address"),
            },
            RecordType::CNAME => Records::CNAME {
                cname: value::str_at(properties, "/CNAMERecord/cname").unwrap_or_default(),
            },
            RecordType::MX => Records::MX {
                records: value::array_at(properties, "/MXRecords")
                    .iter()
                    .map(|r| -> Result<MxRecord> {
                        Ok(MxRecord {
                            preference: value::uint_at(r, "/preference")?.unwrap_or_default(),
                            exchange: value::str_at(r, "/exchange").unwrap_or_default(),
                        })
                    })
                    .collect::<Result<_>>()?,
            },
            RecordType::NS => Records::NS {
                name_servers: items("NSRecords", "nsdname"),
            },
            RecordType::PTR => Records::PTR {
                domain_names: items("PTRRecords", "ptrdname"),
            },
            RecordType::SRV => Records::SRV {
                records: value::array_at(properties, "/SRVRecords")
                    .iter()
                    .map(|r| -> Result<SrvRecord> {
                        Ok(SrvRecord {
                            priority: value::uint_at(r, "/priority")?.unwrap_or_default(),
                            weight: value::uint_at(r, "/weight")?.unwrap_or_default(),
                            port: value::uint_at(r, "/port")?.unwrap_or_default(),
                            target: value::str_at(r, "/target").unwrap_or_default(),
                        })
                    })
                    .collect::<Result<_>>()?,
            },
            // TXT values longer than 255 characters come back split into chunks
            RecordType::TXT => Records::TXT {
                values: value::array_at(properties, "/TXTRecords")
                    .iter()
                    .map(|r| value::strings_at(r, "/value").concat())
                    .collect(),
            },
        })
    }
}

/// Longest string a single TXT character-string may hold
const TXT_CHUNK: usize = 255;

/// Split a TXT value into character-strings of at most 255 bytes
fn txt_chunks(value: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = value;
    while rest.len() > TXT_CHUNK {
        let mut end = TXT_CHUNK;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

/// Creates a record set in a DNS zone.
///
/// ```text
/// azure::dns-record-set dns-record-set-example
///     dns-zone: $(azure::dns-zone dns-zone-example)
///     name: "www"
///     ttl: 300
///     type: "A"
///     addresses: ["10.0.0.1", "10.0.0.2"]
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsRecordSet {
    pub dns_zone: ZoneRef,
    pub name: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub metadata: Tags,
    #[serde(flatten)]
    pub records: Records,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn default_ttl() -> u32 {
    3600
}

impl DnsRecordSet {
    pub fn new(zone: &DnsZone, name: impl Into<String>, records: Records) -> Self {
        Self {
            dns_zone: ZoneRef::from(zone),
            name: name.into(),
            ttl: default_ttl(),
            metadata: Tags::new(),
            records,
            fqdn: None,
            id: None,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.records.record_type()
    }
}

#[async_trait]
impl ArmResource for DnsRecordSet {
    const API_VERSION: &'static str = zone::API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        self.dns_zone
            .arm_id(subscription_id)
            .child(self.record_type().as_str(), &self.name)
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let (key, records) = self.records.to_arm();
        let mut properties = json!({
            "TTL": self.ttl,
            "metadata": tags_value(&self.metadata),
        });
        properties[key] = records;
        Ok(json!({ "properties": properties }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;
        let record_type = RecordType::from_id(&parsed).ok_or_else(|| {
            CloudError::OperationFailed(format!("unsupported record set {}", id))
        })?;
        let dns_zone = ZoneRef::from_record_set_id(&parsed).ok_or_else(|| {
            CloudError::OperationFailed(format!("record set {} has no zone", id))
        })?;
        let properties = v.get("properties").cloned().unwrap_or(Value::Null);

        Ok(Self {
            dns_zone,
            name: value::required_str(v, "/name")?,
            ttl: value::uint_at(&properties, "/TTL")?.unwrap_or_else(default_ttl),
            metadata: value::string_map_at(&properties, "/metadata"),
            records: Records::from_arm(record_type, &properties)?,
            fqdn: value::str_at(&properties, "/fqdn"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.fqdn = live.fqdn;
        self.id = live.id;
    }

    /// Record sets of every zone in the subscription, minus SOA and other
    /// types this provider does not manage
    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let mut record_sets = Vec::new();
        for zone in DnsZone::list_all(client).await? {
            let Some(zone_id) = value::str_at(&zone, "/id") else {
                continue;
            };
            let listed = client
                .list(&format!("{}/recordsets", zone_id), zone::API_VERSION)
                .await?;
            record_sets.extend(listed.into_iter().filter(|rs| {
                value::str_at(rs, "/id")
                    .and_then(|id| ResourceId::parse(&id))
                    .and_then(|id| RecordType::from_id(&id))
                    .is_some()
            }));
        }
        Ok(record_sets)
    }
}

#[async_trait]
impl Resource for DnsRecordSet {
    const TYPE: &'static str = "dns-record-set";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if self.records.is_empty() {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!("{} record set '{}' has no records", self.record_type(), self.name),
            ));
        }
        if self.record_type() == RecordType::CNAME && self.name == "@" {
            return Err(CloudError::invalid(
                Self::TYPE,
                "a CNAME record cannot be placed at the zone apex",
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
        if current.record_type() != self.record_type() {
            return Err(CloudError::invalid(
                Self::TYPE,
                "record type cannot change in place",
            ));
        }

        let diff = self.diff(current);
        let mut update = adapter::begin_update(self, client).await?;

        if diff.changed(|r| &r.ttl) {
            update.set("ttl", "/properties/TTL", json!(self.ttl));
        }

        if diff.changed(|r| &r.metadata) {
            update.set("metadata", "/properties/metadata", tags_value(&self.metadata));
        }

        if diff.changed(|r| &r.records) {
            let (key, records) = self.records.to_arm();
            update.set("records", &format!("/properties/{}", key), records);
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
    use crate::testing::{ArmCall, FakeArm};
    use cirrus_cloud::{ActionType, Finder, ResourceRegistry, plan_change};

    fn zone() -> DnsZone {
        DnsZone::new("example.com", "rg")
    }

    fn www() -> DnsRecordSet {
        DnsRecordSet::new(
            &zone(),
            "www",
            Records::A {
                addresses: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            },
        )
    }

    #[tokio::test]
    async fn test_id_comes_from_parent_zone() {
        let fake = FakeArm::new("sub");
        let mut record_set = www();
        record_set.create(&fake).await.unwrap();
        assert_eq!(
            record_set.id.as_deref(),
            Some("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/A/www")
        );
    }

    #[tokio::test]
    async fn test_create_then_refresh_round_trip() {
        let fake = FakeArm::new("sub");
        let mut declared = DnsRecordSet::new(
            &zone(),
            "@",
            Records::MX {
                records: vec![MxRecord {
                    preference: 10,
                    exchange: "mail.example.com".into(),
                }],
            },
        );
        declared.metadata.insert("owner".into(), "mail".into());
        declared.create(&fake).await.unwrap();

        let mut refreshed = declared.clone();
        assert!(refreshed.refresh(&fake).await.unwrap());
        assert_eq!(refreshed, declared);
    }

    #[tokio::test]
    async fn test_ttl_update_touches_only_ttl() {
        let fake = FakeArm::new("sub");
        let mut current = www();
        current.create(&fake).await.unwrap();
        fake.clear_calls();

        let mut desired = current.clone();
        desired.ttl = 300;
        desired.update(&fake, &current).await.unwrap();

        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        assert_eq!(body["properties"]["TTL"], 300);
        assert_eq!(body["properties"]["ARecords"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_type_change_is_a_replacement() {
        let current = www();
        let mut desired = current.clone();
        desired.records = Records::CNAME {
            cname: "example.net".into(),
        };
        let action = plan_change("www", Some(&current), Some(&desired)).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
        assert!(action.fields.contains("type"));
    }

    #[test]
    fn test_txt_chunks_are_joined() {
        let records = Records::from_arm(
            RecordType::TXT,
            &json!({ "TXTRecords": [{ "value": ["v=spf1 ", "-all"] }] }),
        )
        .unwrap();
        assert_eq!(
            records,
            Records::TXT {
                values: vec!["v=spf1 -all".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_long_txt_value_is_split() {
        let fake = FakeArm::new("sub");
        let key = format!("v=DKIM1; k=rsa; p={}", "A".repeat(580));
        let mut declared = DnsRecordSet::new(
            &zone(),
            "selector._domainkey",
            Records::TXT {
                values: vec![key.clone(), "short".into()],
            },
        );
        declared.create(&fake).await.unwrap();

        let writes = fake.writes();
        let ArmCall::Put { body, .. } = &writes[0] else {
            panic!("expected PUT");
        };
        let chunks = body["properties"]["TXTRecords"][0]["value"].as_array().unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.as_str().unwrap().len() <= 255));
        assert_eq!(body["properties"]["TXTRecords"][1]["value"], json!(["short"]));

        let mut refreshed = declared.clone();
        assert!(refreshed.refresh(&fake).await.unwrap());
        assert_eq!(refreshed.records, declared.records);
    }

    #[test]
    fn test_txt_chunks_respect_char_boundaries() {
        let value = "é".repeat(200);
        let chunks = txt_chunks(&value);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 254);
        assert_eq!(chunks.concat(), value);
        assert_eq!(txt_chunks(""), vec![""]);
    }

    #[test]
    fn test_out_of_range_mx_preference_is_an_error() {
        let result = Records::from_arm(
            RecordType::MX,
            &json!({ "MXRecords": [{ "preference": 70000, "exchange": "mail.example.com" }] }),
        );
        assert!(matches!(result, Err(CloudError::OperationFailed(_))));
    }

    #[test]
    fn test_config_discriminator() {
        let mut registry: ResourceRegistry<dyn Arm> = ResourceRegistry::new();
        registry.register::<DnsRecordSet>();

        let cname = registry.resource(
            "dns-record-set",
            json!({
                "dns-zone": { "resource-group": "rg", "name": "example.com" },
                "name": "blog",
                "type": "CNAME",
                "cname": "example.github.io",
            }),
        );
        assert!(cname.is_ok());

        let caa = registry.resource(
            "dns-record-set",
            json!({
                "dns-zone": { "resource-group": "rg", "name": "example.com" },
                "name": "@",
                "type": "CAA",
            }),
        );
        assert!(matches!(caa, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_records_rejected() {
        let record_set = DnsRecordSet::new(&zone(), "www", Records::A { addresses: vec![] });
        assert!(record_set.validate().is_err());
    }

    #[tokio::test]
    async fn test_finder_walks_zones_and_skips_soa() {
        let fake = FakeArm::new("sub");
        let finder = ArmFinder::<DnsRecordSet>::new();
        assert!(finder.find_all(&fake).await.unwrap().is_empty());

        let mut zone = zone();
        zone.create(&fake).await.unwrap();
        let zone_id = zone.id.clone().unwrap();
        fake.insert(&format!("{}/SOA/@", zone_id), json!({}));
        www().create(&fake).await.unwrap();

        let found = finder.find_all(&fake).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "www");
        assert_eq!(found[0].dns_zone, ZoneRef::from(&zone));

        assert!(
            finder
                .find(&fake, &format!("{}/A/missing", zone_id))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            finder
                .find(&fake, &format!("{}/SOA/@", zone_id))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
