//! SSL certificate management on a live application gateway
//!
//! Each operation reads the gateway, edits its `sslCertificates` list and
//! writes it back with one PUT. Listeners and everything else on the
//! gateway are left as they are.

use super::{API_VERSION, CertificateSource, SslCertificate};
use crate::arm::{Arm, ArmUpdate, ResourceId, name_of, value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cirrus_cloud::{CloudError, Result};
use serde_json::Value;
use std::path::Path;

const CERTIFICATES: &str = "/properties/sslCertificates";

/// Summary of one certificate as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub name: String,
    /// `pfx` or `key-vault`
    pub source: &'static str,
    pub provisioning_state: Option<String>,
}

pub fn gateway_id(subscription_id: &str, resource_group: &str, gateway: &str) -> ResourceId {
    ResourceId::new(
        subscription_id,
        resource_group,
        "Microsoft.Network",
        "applicationGateways",
        gateway,
    )
}

/// Read a PFX file and base64-encode it for upload
pub async fn read_pfx(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    if bytes.is_empty() {
        return Err(CloudError::InvalidConfig(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(STANDARD.encode(bytes))
}

async fn begin(client: &dyn Arm, resource_group: &str, gateway: &str) -> Result<ArmUpdate> {
    let id = gateway_id(client.subscription_id(), resource_group, gateway).to_string();
    ArmUpdate::begin(client, &id, API_VERSION).await
}

fn entry_name(entry: &Value) -> Option<String> {
    value::str_at(entry, "/name")
}

/// Gateway child names are case-insensitive
fn named(entry: &Value, name: &str) -> bool {
    entry_name(entry).is_some_and(|n| n.eq_ignore_ascii_case(name))
}

fn has_certificate(update: &ArmUpdate, name: &str) -> bool {
    value::array_at(update.body(), CERTIFICATES)
        .iter()
        .any(|entry| named(entry, name))
}

async fn append(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    certificate: SslCertificate,
) -> Result<()> {
    let mut update = begin(client, resource_group, gateway).await?;
    if has_certificate(&update, &certificate.name) {
        return Err(CloudError::InvalidConfig(format!(
            "certificate '{}' already exists on {}",
            certificate.name, gateway
        )));
    }

    update.edit("certificates", |body| {
        let mut entries = value::array_at(body, CERTIFICATES).to_vec();
        entries.push(certificate.to_arm());
        value::set_pointer(body, CERTIFICATES, Value::Array(entries));
    });
    update.apply(client).await?;
    Ok(())
}

/// Upload a PFX certificate (`data` is base64)
pub async fn add_certificate(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
    data: String,
    password: Option<String>,
) -> Result<()> {
    tracing::info!("Adding certificate {} to {}", name, gateway);
    let certificate = SslCertificate {
        name: name.to_string(),
        source: CertificateSource::Pfx { data, password },
    };
    append(client, resource_group, gateway, certificate).await
}

/// Reference a certificate stored as a Key Vault secret
pub async fn import_certificate(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
    secret_id: &str,
) -> Result<()> {
    tracing::info!("Importing certificate {} into {} from {}", name, gateway, secret_id);
    let certificate = SslCertificate {
        name: name.to_string(),
        source: CertificateSource::KeyVault {
            secret_id: secret_id.to_string(),
        },
    };
    append(client, resource_group, gateway, certificate).await
}

pub async fn list_certificates(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
) -> Result<Vec<CertificateInfo>> {
    let update = begin(client, resource_group, gateway).await?;
    Ok(value::array_at(update.body(), CERTIFICATES)
        .iter()
        .filter_map(|entry| {
            Some(CertificateInfo {
                name: entry_name(entry)?,
                source: if entry.pointer("/properties/keyVaultSecretId").is_some() {
                    "key-vault"
                } else {
                    "pfx"
                },
                provisioning_state: value::str_at(entry, "/properties/provisioningState"),
            })
        })
        .collect())
}

/// Remove a certificate no listener uses any more
pub async fn remove_certificate(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
) -> Result<()> {
    let mut update = begin(client, resource_group, gateway).await?;
    if !has_certificate(&update, name) {
        return Err(CloudError::ResourceNotFound(format!(
            "certificate '{}' on {}",
            name, gateway
        )));
    }

    let users: Vec<String> = value::array_at(update.body(), "/properties/httpListeners")
        .iter()
        .filter(|listener| {
            value::str_at(listener, "/properties/sslCertificate/id")
                .is_some_and(|id| name_of(&id).eq_ignore_ascii_case(name))
        })
        .filter_map(entry_name)
        .collect();
    if !users.is_empty() {
        return Err(CloudError::InvalidConfig(format!(
            "certificate '{}' is used by listener(s) {}",
            name,
            users.join(", ")
        )));
    }

    tracing::info!("Removing certificate {} from {}", name, gateway);
    update.edit("certificates", |body| {
        let entries: Vec<Value> = value::array_at(body, CERTIFICATES)
            .iter()
            .filter(|entry| !named(entry, name))
            .cloned()
            .collect();
        value::set_pointer(body, CERTIFICATES, Value::Array(entries));
    });
    update.apply(client).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_gateway::gateway::tests::gateway;
    use crate::testing::{ArmCall, FakeArm};
    use cirrus_cloud::Resource;
    use std::io::Write;

    async fn live_gateway(fake: &FakeArm) {
        gateway().create(fake).await.unwrap();
        fake.clear_calls();
    }

    fn put_body(fake: &FakeArm) -> Value {
        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            ArmCall::Put { body, .. } => body.clone(),
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_add_certificate() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        add_certificate(&fake, "rg", "agw-example", "api", "AAAA".into(), Some("pw".into()))
            .await
            .unwrap();

        let body = put_body(&fake);
        let certificates = body["properties"]["sslCertificates"].as_array().unwrap();
        assert_eq!(certificates.len(), 2);
        assert_eq!(certificates[1]["name"], "api");
        assert_eq!(certificates[1]["properties"]["data"], "AAAA");
        assert_eq!(certificates[1]["properties"]["password"], "pw");
    }

    #[tokio::test]
    async fn test_add_duplicate_is_invalid() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        let err = add_certificate(&fake, "rg", "agw-example", "site", "AAAA".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn test_names_differing_in_case_collide() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        let err = import_certificate(&fake, "rg", "agw-example", "SITE", "https://kv/secrets/site")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
        assert!(fake.writes().is_empty());

        import_certificate(&fake, "rg", "agw-example", "old", "https://kv/secrets/old")
            .await
            .unwrap();
        fake.clear_calls();
        remove_certificate(&fake, "rg", "agw-example", "OLD").await.unwrap();
        let names: Vec<String> = list_certificates(&fake, "rg", "agw-example")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["site"]);
    }

    #[tokio::test]
    async fn test_import_and_list() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        import_certificate(
            &fake,
            "rg",
            "agw-example",
            "vault",
            "https://kv.vault.azure.net/secrets/vault",
        )
        .await
        .unwrap();

        let certificates = list_certificates(&fake, "rg", "agw-example").await.unwrap();
        let summary: Vec<(&str, &str)> = certificates
            .iter()
            .map(|c| (c.name.as_str(), c.source))
            .collect();
        assert_eq!(summary, vec![("site", "pfx"), ("vault", "key-vault")]);
    }

    #[tokio::test]
    async fn test_remove_unused_certificate() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;
        import_certificate(&fake, "rg", "agw-example", "old", "https://kv/secrets/old")
            .await
            .unwrap();
        fake.clear_calls();

        remove_certificate(&fake, "rg", "agw-example", "old").await.unwrap();

        let body = put_body(&fake);
        let names: Vec<&str> = body["properties"]["sslCertificates"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["name"].as_str())
            .collect();
        assert_eq!(names, vec!["site"]);
    }

    #[tokio::test]
    async fn test_remove_certificate_in_use() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        let err = remove_certificate(&fake, "rg", "agw-example", "site")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("listener(s) https"));
        assert!(fake.writes().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_certificate() {
        let fake = FakeArm::new("sub");
        live_gateway(&fake).await;

        let err = remove_certificate(&fake, "rg", "agw-example", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_gateway() {
        let fake = FakeArm::new("sub");
        let err = list_certificates(&fake, "rg", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_pfx() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x30, 0x82, 0x01]).unwrap();
        assert_eq!(read_pfx(file.path()).await.unwrap(), "MIIB");

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(read_pfx(empty.path()).await.is_err());
    }
}
