use super::profile::{self, CdnProfile, CdnSku, ProfileRef};
use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, value};
use async_trait::async_trait;
use cirrus_cloud::{
    CloudError, Field, Finder, Resource, Result, SubResource,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;

const FIELDS: &[Field] = &[
    Field::required("cdn-profile"),
    Field::required("name"),
    Field::optional("region"),
    Field::optional("type"),
    Field::required("origin"),
    Field::optional("origin-host-header").updatable(),
    Field::optional("origin-path").updatable(),
    Field::optional("http-allowed").updatable(),
    Field::optional("https-allowed").updatable(),
    Field::optional("compression-enabled").updatable(),
    Field::optional("content-types-to-compress").updatable(),
    Field::optional("query-string-caching").updatable(),
    Field::optional("geo-filters").updatable(),
    Field::optional("custom-domains").updatable(),
    Field::optional("tags").updatable(),
    Field::output("host-name"),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointType {
    #[default]
    Standard,
    Premium,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStringCaching {
    #[default]
    IgnoreQueryString,
    BypassCaching,
    UseQueryString,
    NotSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoFilterAction {
    Allow,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeoFilter {
    pub relative_path: String,
    pub action: GeoFilterAction,
    pub country_codes: BTreeSet<String>,
}

impl SubResource for GeoFilter {
    type Key = String;

    fn primary_key(&self) -> String {
        self.relative_path.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Origin {
    pub name: String,
    pub host_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,
}

/// Creates a CDN endpoint.
///
/// ```text
/// azure::cdn-endpoint cdn-endpoint-example
///     cdn-profile: $(azure::cdn-profile cdn-profile-example)
///     name: "cdn-endpoint-example"
///     type: "standard"
///     origin
///         name: "origin"
///         host-name: "www.example.com"
///     end
///     query-string-caching: "IgnoreQueryString"
///     custom-domains: ["cdn.example.com"]
///
///     geo-filter
///         relative-path: "/"
///         action: "Allow"
///         country-codes: ["JP", "US"]
///     end
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CdnEndpoint {
    pub cdn_profile: ProfileRef,
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, rename = "type")]
    pub endpoint_type: EndpointType,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_host_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_path: Option<String>,
    #[serde(default = "enabled")]
    pub http_allowed: bool,
    #[serde(default = "enabled")]
    pub https_allowed: bool,
    #[serde(default)]
    pub compression_enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_types_to_compress: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_caching: Option<QueryStringCaching>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geo_filters: Vec<GeoFilter>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub custom_domains: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn default_region() -> String {
    "global".to_string()
}

fn enabled() -> bool {
    true
}

/// Custom domain child names cannot contain dots
fn custom_domain_name(host_name: &str) -> String {
    host_name.replace('.', "-")
}

impl CdnEndpoint {
    pub fn new(profile: &CdnProfile, name: impl Into<String>, origin: Origin) -> Self {
        Self {
            cdn_profile: ProfileRef::from(profile),
            name: name.into(),
            region: default_region(),
            endpoint_type: profile.sku.endpoint_type(),
            origin,
            origin_host_header: None,
            origin_path: None,
            http_allowed: true,
            https_allowed: true,
            compression_enabled: false,
            content_types_to_compress: Vec::new(),
            query_string_caching: None,
            geo_filters: Vec::new(),
            custom_domains: BTreeSet::new(),
            tags: Tags::new(),
            host_name: None,
            id: None,
        }
    }

    /// Settings a premium endpoint manages through the rules engine instead
    fn standard_only_settings(&self) -> Vec<&'static str> {
        let mut settings = Vec::new();
        if !self.geo_filters.is_empty() {
            settings.push("geo-filters");
        }
        if self.query_string_caching.is_some() {
            settings.push("query-string-caching");
        }
        if self.compression_enabled || !self.content_types_to_compress.is_empty() {
            settings.push("compression");
        }
        settings
    }

    fn origins_value(&self) -> Value {
        let mut properties = json!({ "hostName": self.origin.host_name });
        if let Some(port) = self.origin.http_port {
            properties["httpPort"] = json!(port);
        }
        if let Some(port) = self.origin.https_port {
            properties["httpsPort"] = json!(port);
        }
        json!([{ "name": self.origin.name, "properties": properties }])
    }

    fn geo_filters_value(&self) -> Value {
        Value::Array(
            self.geo_filters
                .iter()
                .map(|filter| {
                    json!({
                        "relativePath": filter.relative_path,
                        "action": filter.action,
                        "countryCodes": filter.country_codes,
                    })
                })
                .collect(),
        )
    }

    fn custom_domain_id(&self, client: &dyn Arm, host_name: &str) -> String {
        ResourceId::parse(&adapter::resolved_id(self, client))
            .unwrap_or_else(|| self.arm_id(client.subscription_id()))
            .child("customDomains", &custom_domain_name(host_name))
            .to_string()
    }

    async fn add_custom_domain(&self, client: &dyn Arm, host_name: &str) -> Result<()> {
        let id = self.custom_domain_id(client, host_name);
        tracing::info!("Adding custom domain {} to {}", host_name, self.name);
        client
            .put(
                &id,
                profile::API_VERSION,
                &json!({ "properties": { "hostName": host_name } }),
            )
            .await?;
        Ok(())
    }

    async fn remove_custom_domain(&self, client: &dyn Arm, host_name: &str) -> Result<()> {
        let id = self.custom_domain_id(client, host_name);
        tracing::info!("Removing custom domain {} from {}", host_name, self.name);
        client.delete(&id, profile::API_VERSION).await
    }

    async fn live_custom_domains(&self, client: &dyn Arm) -> Result<BTreeSet<String>> {
        let path = format!("{}/customDomains", adapter::resolved_id(self, client));
        Ok(client
            .list(&path, profile::API_VERSION)
            .await?
            .iter()
            .filter_map(|d| value::str_at(d, "/properties/hostName"))
            .collect())
    }

    /// Endpoint as listed under a profile whose sku is known
    fn from_listing(v: &Value, sku: Option<CdnSku>) -> Result<Self> {
        let mut endpoint = Self::from_arm(v)?;
        if let Some(sku) = sku {
            endpoint.cdn_profile.sku = Some(sku);
            endpoint.endpoint_type = sku.endpoint_type();
            if endpoint.endpoint_type == EndpointType::Premium {
                endpoint.query_string_caching = None;
                endpoint.compression_enabled = false;
                endpoint.content_types_to_compress.clear();
            }
        }
        Ok(endpoint)
    }
}

#[async_trait]
impl ArmResource for CdnEndpoint {
    const API_VERSION: &'static str = profile::API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        self.cdn_profile
            .arm_id(subscription_id)
            .child("endpoints", &self.name)
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let mut properties = json!({
            "origins": self.origins_value(),
            "isHttpAllowed": self.http_allowed,
            "isHttpsAllowed": self.https_allowed,
        });
        if let Some(header) = &self.origin_host_header {
            properties["originHostHeader"] = json!(header);
        }
        if let Some(path) = &self.origin_path {
            properties["originPath"] = json!(path);
        }

        if self.endpoint_type == EndpointType::Standard {
            properties["isCompressionEnabled"] = json!(self.compression_enabled);
            properties["contentTypesToCompress"] = json!(self.content_types_to_compress);
            properties["geoFilters"] = self.geo_filters_value();
            if let Some(caching) = self.query_string_caching {
                properties["queryStringCachingBehavior"] = json!(caching);
            }
        }

        Ok(json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": properties,
        }))
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;
        let cdn_profile = ProfileRef::from_endpoint_id(&parsed).ok_or_else(|| {
            CloudError::OperationFailed(format!("endpoint {} has no profile", id))
        })?;

        let origin = value::array_at(v, "/properties/origins")
            .first()
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self {
            cdn_profile,
            name: value::required_str(v, "/name")?,
            region: value::str_at(v, "/location").unwrap_or_else(default_region),
            endpoint_type: EndpointType::Standard,
            origin: Origin {
                name: value::str_at(&origin, "/name").unwrap_or_default(),
                host_name: value::str_at(&origin, "/properties/hostName").unwrap_or_default(),
                http_port: value::uint_at(&origin, "/properties/httpPort")?,
                https_port: value::uint_at(&origin, "/properties/httpsPort")?,
            },
            origin_host_header: value::str_at(v, "/properties/originHostHeader"),
            origin_path: value::str_at(v, "/properties/originPath"),
            http_allowed: value::bool_at(v, "/properties/isHttpAllowed").unwrap_or(true),
            https_allowed: value::bool_at(v, "/properties/isHttpsAllowed").unwrap_or(true),
            compression_enabled: value::bool_at(v, "/properties/isCompressionEnabled")
                .unwrap_or(false),
            content_types_to_compress: value::strings_at(v, "/properties/contentTypesToCompress"),
            query_string_caching: value::enum_at(v, "/properties/queryStringCachingBehavior")
                .ok(),
            geo_filters: value::array_at(v, "/properties/geoFilters")
                .iter()
                .map(|f| {
                    Ok(GeoFilter {
                        relative_path: value::required_str(f, "/relativePath")?,
                        action: value::enum_at(f, "/action")?,
                        country_codes: value::strings_at(f, "/countryCodes").into_iter().collect(),
                    })
                })
                .collect::<Result<_>>()?,
            custom_domains: BTreeSet::new(),
            tags: value::tags_of(v),
            host_name: value::str_at(v, "/properties/hostName"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.host_name = live.host_name;
        self.id = live.id;
    }

    /// The response carries neither the profile sku nor the declared type
    fn keep_declared(&mut self, declared: &Self) {
        self.cdn_profile.sku = declared.cdn_profile.sku;
        self.endpoint_type = declared.endpoint_type;
        if self.endpoint_type == EndpointType::Premium {
            self.query_string_caching = declared.query_string_caching;
        }
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let mut endpoints = Vec::new();
        for profile in CdnProfile::list_all(client).await? {
            if let Some(profile_id) = value::str_at(&profile, "/id") {
                let path = format!("{}/endpoints", profile_id);
                endpoints.extend(client.list(&path, profile::API_VERSION).await?);
            }
        }
        Ok(endpoints)
    }
}

#[async_trait]
impl Resource for CdnEndpoint {
    const TYPE: &'static str = "cdn-endpoint";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if let Some(sku) = self.cdn_profile.sku
            && sku.endpoint_type() != self.endpoint_type
        {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!(
                    "a {:?} profile cannot host a {:?} endpoint",
                    sku, self.endpoint_type
                ),
            ));
        }

        if self.endpoint_type == EndpointType::Premium {
            let settings = self.standard_only_settings();
            if !settings.is_empty() {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!(
                        "premium endpoints do not support {}",
                        settings.join(", ")
                    ),
                ));
            }
        }

        if !self.http_allowed && !self.https_allowed {
            return Err(CloudError::invalid(
                Self::TYPE,
                "at least one of http-allowed and https-allowed must be true",
            ));
        }
        Ok(())
    }

    async fn refresh(&mut self, client: &dyn Arm) -> Result<bool> {
        if !adapter::refresh(self, client).await? {
            return Ok(false);
        }
        self.custom_domains = self.live_custom_domains(client).await?;
        Ok(true)
    }

    async fn create(&mut self, client: &dyn Arm) -> Result<()> {
        adapter::create(self, client).await?;
        for host_name in &self.custom_domains {
            self.add_custom_domain(client, host_name).await?;
        }
        Ok(())
    }

    async fn update(&self, client: &dyn Arm, current: &Self) -> Result<()> {
        self.validate()?;
        let diff = self.diff(current);
        let mut update = adapter::begin_update(self, client).await?;

        if diff.changed(|e| &e.origin_host_header) {
            update.set(
                "origin-host-header",
                "/properties/originHostHeader",
                json!(self.origin_host_header),
            );
        }

        if diff.changed(|e| &e.origin_path) {
            update.set(
                "origin-path",
                "/properties/originPath",
                json!(self.origin_path),
            );
        }

        if diff.changed(|e| &e.http_allowed) {
            update.set(
                "http-allowed",
                "/properties/isHttpAllowed",
                json!(self.http_allowed),
            );
        }

        if diff.changed(|e| &e.https_allowed) {
            update.set(
                "https-allowed",
                "/properties/isHttpsAllowed",
                json!(self.https_allowed),
            );
        }

        if self.endpoint_type == EndpointType::Standard {
            if diff.changed(|e| &e.compression_enabled) {
                update.set(
                    "compression-enabled",
                    "/properties/isCompressionEnabled",
                    json!(self.compression_enabled),
                );
            }

            if diff.changed(|e| &e.content_types_to_compress) {
                update.set(
                    "content-types-to-compress",
                    "/properties/contentTypesToCompress",
                    json!(self.content_types_to_compress),
                );
            }

            if diff.changed(|e| &e.query_string_caching) {
                update.set(
                    "query-string-caching",
                    "/properties/queryStringCachingBehavior",
                    json!(self.query_string_caching),
                );
            }

            if diff.changed(|e| &e.geo_filters) {
                update.set(
                    "geo-filters",
                    "/properties/geoFilters",
                    self.geo_filters_value(),
                );
            }
        }

        if diff.changed(|e| &e.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;

        for host_name in current.custom_domains.difference(&self.custom_domains) {
            self.remove_custom_domain(client, host_name).await?;
        }
        for host_name in self.custom_domains.difference(&current.custom_domains) {
            self.add_custom_domain(client, host_name).await?;
        }
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}

/// Finder for endpoints across every profile
///
/// Walks the profiles first so each endpoint knows its profile sku and type.
#[derive(Debug, Default)]
pub struct EndpointFinder;

#[async_trait]
impl Finder for EndpointFinder {
    const TYPE: &'static str = CdnEndpoint::TYPE;
    type Client = dyn Arm;
    type Output = CdnEndpoint;

    async fn find_all(&self, client: &dyn Arm) -> Result<Vec<CdnEndpoint>> {
        let mut found = Vec::new();
        for profile in CdnProfile::list_all(client).await? {
            // Front Door profiles and other skus this provider does not model
            let Some(profile) = adapter::from_arm_or_skip::<CdnProfile>(&profile) else {
                continue;
            };
            let Some(profile_id) = profile.id.as_deref() else {
                continue;
            };
            let path = format!("{}/endpoints", profile_id);
            for endpoint in client.list(&path, profile::API_VERSION).await? {
                match CdnEndpoint::from_listing(&endpoint, Some(profile.sku)) {
                    Ok(endpoint) => found.push(endpoint),
                    Err(e) => tracing::debug!("Skipping endpoint in {}: {}", profile_id, e),
                }
            }
        }
        Ok(found)
    }

    async fn find(&self, client: &dyn Arm, id: &str) -> Result<Vec<CdnEndpoint>> {
        let Some(parsed) = ResourceId::parse(id) else {
            tracing::debug!("'{}' is not a resource id", id);
            return Ok(Vec::new());
        };
        let Some(endpoint) = client.get(id, profile::API_VERSION).await? else {
            return Ok(Vec::new());
        };

        let sku = match parsed.parent() {
            Some(profile_id) => client
                .get(&profile_id.to_string(), profile::API_VERSION)
                .await?
                .and_then(|p| value::enum_at(&p, "/sku/name").ok()),
            None => None,
        };
        match CdnEndpoint::from_listing(&endpoint, sku) {
            Ok(endpoint) => Ok(vec![endpoint]),
            Err(e) => {
                tracing::debug!("Skipping endpoint {}: {}", id, e);
                Ok(Vec::new())
            }
        }
    }
}
