//! Virtual machines

use crate::adapter::{self, ArmResource, Tags, tags_value};
use crate::arm::{Arm, ResourceId, collection_path, value};
use crate::disk::OsType;
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Field, Resource, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;

const API_VERSION: &str = "2023-09-01";
const DATA_DISKS: &str = "/properties/storageProfile/dataDisks";

const FIELDS: &[Field] = &[
    Field::required("name"),
    Field::required("resource-group"),
    Field::required("region"),
    Field::required("size").updatable(),
    Field::required("image"),
    Field::required("os-type"),
    Field::optional("admin-username"),
    Field::optional("admin-password"),
    Field::optional("ssh-public-keys"),
    Field::required("network-interface-ids"),
    Field::optional("data-disk-ids").updatable(),
    Field::optional("tags").updatable(),
    Field::output("vm-id"),
    Field::output("id"),
];

/// Well-known images addressable by a short name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopularImage {
    #[serde(rename = "ubuntu-22.04")]
    Ubuntu2204,
    #[serde(rename = "ubuntu-24.04")]
    Ubuntu2404,
    #[serde(rename = "debian-12")]
    Debian12,
    #[serde(rename = "windows-server-2022")]
    WindowsServer2022,
    #[serde(rename = "windows-server-2019")]
    WindowsServer2019,
}

impl PopularImage {
    const ALL: [PopularImage; 5] = [
        PopularImage::Ubuntu2204,
        PopularImage::Ubuntu2404,
        PopularImage::Debian12,
        PopularImage::WindowsServer2022,
        PopularImage::WindowsServer2019,
    ];

    /// (publisher, offer, sku)
    pub fn reference(self) -> (&'static str, &'static str, &'static str) {
        match self {
            PopularImage::Ubuntu2204 => (
                "Canonical",
                "0001-com-ubuntu-server-jammy",
                "22_04-lts-gen2",
            ),
            PopularImage::Ubuntu2404 => ("Canonical", "ubuntu-24_04-lts", "server"),
            PopularImage::Debian12 => ("Debian", "debian-12", "12-gen2"),
            PopularImage::WindowsServer2022 => (
                "MicrosoftWindowsServer",
                "WindowsServer",
                "2022-datacenter-azure-edition",
            ),
            PopularImage::WindowsServer2019 => (
                "MicrosoftWindowsServer",
                "WindowsServer",
                "2019-datacenter-gensecond",
            ),
        }
    }

    pub fn os_type(self) -> OsType {
        match self {
            PopularImage::WindowsServer2022 | PopularImage::WindowsServer2019 => OsType::Windows,
            _ => OsType::Linux,
        }
    }

    fn matching(publisher: &str, offer: &str, sku: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|image| {
            let (p, o, s) = image.reference();
            p.eq_ignore_ascii_case(publisher)
                && o.eq_ignore_ascii_case(offer)
                && s.eq_ignore_ascii_case(sku)
        })
    }
}

/// What the OS disk is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "image-type", rename_all = "kebab-case")]
pub enum Image {
    Popular {
        name: PopularImage,
    },
    Marketplace {
        publisher: String,
        offer: String,
        sku: String,
        #[serde(default = "latest")]
        version: String,
    },
    #[serde(rename_all = "kebab-case")]
    Custom { image_id: String },
    /// Attach an existing OS disk; no OS profile is applied
    #[serde(rename_all = "kebab-case")]
    SpecializedDisk { disk_id: String },
}

fn latest() -> String {
    "latest".to_string()
}

impl Image {
    fn image_reference(&self) -> Option<Value> {
        match self {
            Image::Popular { name } => {
                let (publisher, offer, sku) = name.reference();
                Some(json!({
                    "publisher": publisher,
                    "offer": offer,
                    "sku": sku,
                    "version": "latest",
                }))
            }
            Image::Marketplace {
                publisher,
                offer,
                sku,
                version,
            } => Some(json!({
                "publisher": publisher,
                "offer": offer,
                "sku": sku,
                "version": version,
            })),
            Image::Custom { image_id } => Some(value::id_ref(image_id)),
            Image::SpecializedDisk { .. } => None,
        }
    }

    fn from_storage_profile(storage: &Value) -> Result<Self> {
        let attached = value::str_at(storage, "/osDisk/createOption")
            .is_some_and(|o| o.eq_ignore_ascii_case("attach"));
        if attached {
            return Ok(Image::SpecializedDisk {
                disk_id: value::required_str(storage, "/osDisk/managedDisk/id")?,
            });
        }

        if let Some(image_id) = value::str_at(storage, "/imageReference/id") {
            return Ok(Image::Custom { image_id });
        }

        let publisher = value::required_str(storage, "/imageReference/publisher")?;
        let offer = value::required_str(storage, "/imageReference/offer")?;
        let sku = value::required_str(storage, "/imageReference/sku")?;
        let version = value::str_at(storage, "/imageReference/version").unwrap_or_else(latest);

        match PopularImage::matching(&publisher, &offer, &sku) {
            Some(name) if version == "latest" => Ok(Image::Popular { name }),
            _ => Ok(Image::Marketplace {
                publisher,
                offer,
                sku,
                version,
            }),
        }
    }
}

/// Creates a virtual machine.
///
/// ```text
/// azure::virtual-machine virtual-machine-example
///     name: "virtual-machine-example"
///     resource-group: $(azure::resource-group resource-group-example)
///     size: "Standard_B1s"
///     os-type: "Linux"
///     image
///         image-type: "popular"
///         name: "ubuntu-22.04"
///     end
///     admin-username: "azureuser"
///     ssh-public-keys: ["ssh-ed25519 AAAA..."]
///     network-interface-ids: [$(azure::network-interface network-interface-example | id)]
/// end
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VirtualMachine {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub size: String,
    pub image: Image,
    pub os_type: OsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_public_keys: Vec<String>,
    pub network_interface_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_disk_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl VirtualMachine {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
        image: Image,
        os_type: OsType,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            region: region.into(),
            size: size.into(),
            image,
            os_type,
            admin_username: None,
            admin_password: None,
            ssh_public_keys: Vec::new(),
            network_interface_ids: Vec::new(),
            data_disk_ids: Vec::new(),
            tags: Tags::new(),
            vm_id: None,
            id: None,
        }
    }

    /// Data disk entries for the declared ids
    ///
    /// A disk that is already attached keeps its LUN; a newly attached disk
    /// takes the lowest LUN not in use.
    fn data_disks_value(&self, attached: &[Value]) -> Value {
        let live_lun = |id: &str| {
            attached.iter().find_map(|d| {
                value::str_at(d, "/managedDisk/id")
                    .filter(|attached_id| attached_id.eq_ignore_ascii_case(id))
                    .and_then(|_| value::u64_at(d, "/lun"))
            })
        };

        let kept: Vec<Option<u64>> = self.data_disk_ids.iter().map(|id| live_lun(id)).collect();
        let mut taken: BTreeSet<u64> = kept.iter().flatten().copied().collect();
        let mut disks: Vec<(u64, &String)> = self
            .data_disk_ids
            .iter()
            .zip(kept)
            .map(|(id, lun)| {
                let lun = lun.unwrap_or_else(|| {
                    let free = (0..).find(|n| !taken.contains(n)).unwrap_or_default();
                    taken.insert(free);
                    free
                });
                (lun, id)
            })
            .collect();
        disks.sort_by_key(|(lun, _)| *lun);

        Value::Array(
            disks
                .into_iter()
                .map(|(lun, id)| {
                    json!({
                        "lun": lun,
                        "createOption": "Attach",
                        "managedDisk": { "id": id },
                    })
                })
                .collect(),
        )
    }

    fn os_profile(&self) -> Option<Value> {
        if matches!(self.image, Image::SpecializedDisk { .. }) {
            return None;
        }

        let username = self.admin_username.clone().unwrap_or_default();
        let mut profile = json!({
            "computerName": self.name,
            "adminUsername": username,
        });
        if let Some(password) = &self.admin_password {
            profile["adminPassword"] = json!(password);
        }
        if self.os_type == OsType::Linux {
            let keys: Vec<Value> = self
                .ssh_public_keys
                .iter()
                .map(|key| {
                    json!({
                        "path": format!("/home/{}/.ssh/authorized_keys", username),
                        "keyData": key,
                    })
                })
                .collect();
            profile["linuxConfiguration"] = json!({
                "disablePasswordAuthentication": self.admin_password.is_none(),
                "ssh": { "publicKeys": keys },
            });
        }
        Some(profile)
    }
}

#[async_trait]
impl ArmResource for VirtualMachine {
    const API_VERSION: &'static str = API_VERSION;

    fn arm_id(&self, subscription_id: &str) -> ResourceId {
        ResourceId::new(
            subscription_id,
            &self.resource_group,
            "Microsoft.Compute",
            "virtualMachines",
            &self.name,
        )
    }

    fn to_arm(&self, _subscription_id: &str) -> Result<Value> {
        let mut storage = json!({ "dataDisks": self.data_disks_value(&[]) });
        match &self.image {
            Image::SpecializedDisk { disk_id } => {
                storage["osDisk"] = json!({
                    "osType": self.os_type,
                    "createOption": "Attach",
                    "managedDisk": { "id": disk_id },
                });
            }
            image => {
                storage["osDisk"] = json!({
                    "osType": self.os_type,
                    "createOption": "FromImage",
                });
                if let Some(reference) = image.image_reference() {
                    storage["imageReference"] = reference;
                }
            }
        }

        let interfaces: Vec<Value> = self
            .network_interface_ids
            .iter()
            .enumerate()
            .map(|(i, id)| json!({ "id": id, "properties": { "primary": i == 0 } }))
            .collect();

        let mut body = json!({
            "location": self.region,
            "tags": tags_value(&self.tags),
            "properties": {
                "hardwareProfile": { "vmSize": self.size },
                "storageProfile": storage,
                "networkProfile": { "networkInterfaces": interfaces },
            }
        });
        if let Some(profile) = self.os_profile() {
            body["properties"]["osProfile"] = profile;
        }
        Ok(body)
    }

    fn from_arm(v: &Value) -> Result<Self> {
        let id = value::required_str(v, "/id")?;
        let parsed = ResourceId::parse(&id)
            .ok_or_else(|| CloudError::OperationFailed(format!("malformed id {}", id)))?;
        let storage = v
            .pointer("/properties/storageProfile")
            .cloned()
            .unwrap_or(Value::Null);

        let mut data_disks = value::array_at(&storage, "/dataDisks").to_vec();
        data_disks.sort_by_key(|d| value::u64_at(d, "/lun").unwrap_or_default());

        Ok(Self {
            name: value::required_str(v, "/name")?,
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
            region: value::str_at(v, "/location").unwrap_or_default(),
            size: value::str_at(v, "/properties/hardwareProfile/vmSize").unwrap_or_default(),
            image: Image::from_storage_profile(&storage)?,
            os_type: value::enum_at(&storage, "/osDisk/osType")?,
            admin_username: value::str_at(v, "/properties/osProfile/adminUsername"),
            admin_password: None,
            ssh_public_keys: value::array_at(
                v,
                "/properties/osProfile/linuxConfiguration/ssh/publicKeys",
            )
            .iter()
            .filter_map(|k| value::str_at(k, "/keyData"))
            .collect(),
            network_interface_ids: value::array_at(
                v,
                "/properties/networkProfile/networkInterfaces",
            )
            .iter()
            .filter_map(|n| value::str_at(n, "/id"))
            .collect(),
            data_disk_ids: data_disks
                .iter()
                .filter_map(|d| value::str_at(d, "/managedDisk/id"))
                .collect(),
            tags: value::tags_of(v),
            vm_id: value::str_at(v, "/properties/vmId"),
            id: Some(id),
        })
    }

    fn take_outputs(&mut self, live: Self) {
        self.vm_id = live.vm_id;
        self.id = live.id;
    }

    fn keep_declared(&mut self, declared: &Self) {
        self.admin_password = declared.admin_password.clone();

        // Live disks come back in LUN order; the same disks declared in a
        // different order are not a change.
        let normalized = |ids: &[String]| -> BTreeSet<String> {
            ids.iter().map(|id| id.to_ascii_lowercase()).collect()
        };
        if self.data_disk_ids.len() == declared.data_disk_ids.len()
            && normalized(&self.data_disk_ids) == normalized(&declared.data_disk_ids)
        {
            self.data_disk_ids = declared.data_disk_ids.clone();
        }
    }

    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>> {
        let path = collection_path(client, "Microsoft.Compute", "virtualMachines");
        client.list(&path, API_VERSION).await
    }
}

#[async_trait]
impl Resource for VirtualMachine {
    const TYPE: &'static str = "virtual-machine";
    type Client = dyn Arm;

    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn validate(&self) -> Result<()> {
        adapter::validate_required(self)?;

        if let Image::Popular { name } = self.image
            && name.os_type() != self.os_type
        {
            return Err(CloudError::invalid(
                Self::TYPE,
                format!("image {:?} is not a {:?} image", name, self.os_type),
            ));
        }

        if matches!(self.image, Image::SpecializedDisk { .. }) {
            return Ok(());
        }

        if self.admin_username.as_deref().is_none_or(str::is_empty) {
            return Err(CloudError::invalid(
                Self::TYPE,
                "admin-username is required unless the image is a specialized disk",
            ));
        }

        match self.os_type {
            OsType::Linux
                if self.admin_password.is_none() && self.ssh_public_keys.is_empty() =>
            {
                Err(CloudError::invalid(
                    Self::TYPE,
                    "a Linux machine needs admin-password or ssh-public-keys",
                ))
            }
            OsType::Windows if self.admin_password.is_none() => Err(CloudError::invalid(
                Self::TYPE,
                "a Windows machine needs admin-password",
            )),
            _ => Ok(()),
        }
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

        if diff.changed(|m| &m.size) {
            update.set(
                "size",
                "/properties/hardwareProfile/vmSize",
                json!(self.size),
            );
        }

        if diff.changed(|m| &m.data_disk_ids) {
            update.edit("data-disk-ids", |body| {
                let attached = value::array_at(body, DATA_DISKS).to_vec();
                value::set_pointer(body, DATA_DISKS, self.data_disks_value(&attached));
            });
        }

        if diff.changed(|m| &m.tags) {
            update.set("tags", "/tags", tags_value(&self.tags));
        }

        update.apply(client).await?;
        Ok(())
    }

    async fn delete(&self, client: &dyn Arm) -> Result<()> {
        adapter::delete(self, client).await
    }
}
