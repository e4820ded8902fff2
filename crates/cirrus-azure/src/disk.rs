//! Managed disks

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const API_VERSION: &str = "2023-04-02";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::optional("size-gb").updatable(),
    Field::optional("sku").updatable(),
    Field::optional("os-type"),
    Field::optional("source"),
    Field::optional("tags").updatable(),
    Field::output("id"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskSku {
    #[default]
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
    #[serde(rename = "StandardSSD_LRS")]
    StandardSsdLrs,
    #[serde(rename = "UltraSSD_LRS")]
    UltraSsdLrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
}

/// Where the disk's initial content comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiskSource {
    #[default]
    Empty,
    /// Copy of another managed disk or snapshot
    #[serde(rename_all = "kebab-case")]
    Copy { source_id: String },
    /// Import of a VHD blob
    #[serde(rename_all = "kebab-case")]
    Import {
        vhd_uri: String,
        storage_account_id: String,
    },
}

impl DiskSource {
    fn creation_data(&self) -> Value {
        match self {
            DiskSource::Empty => json!({ "createOption": "Empty" }),
            DiskSource::Copy { source_id } => json!({
                "createOption": "Copy",
                "sourceResourceId": source_id,
            }),
            DiskSource::Import {
                vhd_uri,
                storage_account_id,
            } => json!({
                "createOption": "Import",
                "sourceUri": vhd_uri,
                "storageAccountId": storage_account_id,
            }),
        }
    }

    fn from_creation_data(v: &Value) -> Self {
        let option = value::str_at(v, "/createOption").unwrap_or_default();
        match option.as_str() {
            "Copy" => DiskSource::Copy {
                source_id: value::str_at(v, "/sourceResourceId").unwrap_or_default(),
            },
            "Import" => DiskSource::Import {
                vhd_uri: value::str_at(v, "/sourceUri").unwrap_or_default(),
                storage_account_id: value::str_at(v, "/storageAccountId").unwrap_or_default(),
            },
            _ => DiskSource::Empty,
        }
    }
}

/// Creates a managed disk.
///
/// ```text
/// azure::disk disk-example
///     name: "disk-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     size-gb: 10
///     sku: "Standard_LRS"
///     source
///         type: "empty"
///     end
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Disk {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_gb: Option<u32>,
    #[serde(default)]
    pub sku: DiskSku,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,
    #[serde(default)]
    pub source: DiskSource,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Disk {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            size_gb: None,
            sku: DiskSku::default(),
            os_type: None,
            source: DiskSource::default(),
            tags: Tags::new(),
            id: None,
        }
    }
}

#[async_trait]
impl ArmResource for Disk {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Compute",
            "disks",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let mut body = json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "sku": { "name": self.sku },
            "properties": { "creationData": self.source.creation_data() }
        });
        if let Some(size) = self.size_gb {
            body["properties"]["diskSizeGB"] = json!(size);
        }
        if let Some(os_type) = self.os_type {
            body["properties"]["osType"] = json!(os_type);
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
            size_gb: value::uint_at(v, "/properties/diskSizeGB")?,
            sku: value::optional_enum_at(v, "/sku/name")?.unwrap_or_default(),
            os_type: value::enum_at(v, "/properties/osType").ok(),
            source: v
                .pointer("/properties/creationData")
                .map(DiskSource::from_creation_data)
                .unwrap_or_default(),
            tags: value::tags_of(v),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.id = live.id;
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Compute", "disks");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for Disk {
    const TYPE: &'static str = "disk";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if self.source == DiskSource::Empty && self.size_gb.is_none() {
            return Err(CloudError::invalid(
                Self::TYPE,
                "size-gb is required for an empty disk",
            ));
        }
        if self.size_gb == Some(0) {
            return Err(CloudError::invalid(Self::TYPE, "size-gb must be positive"));
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

        if let Some(size) = diff.desired_if_changed(|d| &d.size_gb) {
            if let (Some(from), Some(to)) = (current.size_gb, *size)
                && to < from
            {
                return Err(CloudError::invalid(
                    Self::TYPE,
                    format!("disks can only grow ({} GB -> {} GB)", from, to),
                ));
            }
            update.set("size-gb", "/properties/diskSizeGB", json!(size));
        }

        if diff.changed(|d| &d.sku) {
            update.set("sku", "/sku/name", json!(self.sku));
        }

        if diff.changed(|d| &d.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}
