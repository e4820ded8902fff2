//! cirrus application-gateway コマンドハンドラ

use anyhow::Context;
use cirrus_azure::Arm;
use cirrus_azure::application_gateway::certificate::{self, CertificateInfo};
use colored::Colorize;
use std::path::Path;

pub async fn read_pfx(path: &Path) -> anyhow::Result<String> {
    certificate::read_pfx(path)
        .await
        .with_context(|| format!("Failed to read certificate {}", path.display()))
}

/// Ask for the PFX password; an empty answer means the file has none
pub fn prompt_password() -> anyhow::Result<Option<String>> {
    let password = dialoguer::Password::new()
        .with_prompt("PFX password")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read password")?;
    Ok(Some(password).filter(|p| !p.is_empty()))
}

pub async fn handle_add(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
    data: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    certificate::add_certificate(client, resource_group, gateway, name, data, password).await?;
    println!("{} Added certificate {} to {}", "✓".green(), name.cyan(), gateway);
    Ok(())
}

pub async fn handle_import(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
    secret_id: &str,
) -> anyhow::Result<()> {
    certificate::import_certificate(client, resource_group, gateway, name, secret_id).await?;
    println!(
        "{} Imported certificate {} into {}",
        "✓".green(),
        name.cyan(),
        gateway
    );
    Ok(())
}

pub async fn handle_list(client: &dyn Arm, resource_group: &str, gateway: &str) -> anyhow::Result<()> {
    let certificates = certificate::list_certificates(client, resource_group, gateway).await?;
    print!("{}", render_list(gateway, &certificates));
    Ok(())
}

pub async fn handle_remove(
    client: &dyn Arm,
    resource_group: &str,
    gateway: &str,
    name: &str,
) -> anyhow::Result<()> {
    certificate::remove_certificate(client, resource_group, gateway, name).await?;
    println!(
        "{} Removed certificate {} from {}",
        "✓".green(),
        name.cyan(),
        gateway
    );
    Ok(())
}

fn render_list(gateway: &str, certificates: &[CertificateInfo]) -> String {
    if certificates.is_empty() {
        return format!("No certificates on {}\n", gateway);
    }

    let mut out = format!("{}  {}\n", "Certificates:".bold(), gateway);
    for info in certificates {
        out.push_str(&format!(
            "  {:<24} {:<10} {}\n",
            info.name.green(),
            info.source,
            info.provisioning_state.as_deref().unwrap_or("-").dimmed()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_azure::testing::FakeArm;
    use serde_json::json;

    const GATEWAY: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/applicationGateways/agw";

    fn fake_with_gateway() -> FakeArm {
        let fake = FakeArm::new("sub");
        fake.insert(
            GATEWAY,
            json!({
                "location": "japaneast",
                "properties": {
                    "sslCertificates": [
                        { "name": "site", "properties": { "publicCertData": "PUB", "provisioningState": "Succeeded" } }
                    ],
                    "httpListeners": []
                }
            }),
        );
        fake
    }

    #[test]
    fn test_render_empty_list() {
        colored::control::set_override(false);
        assert_eq!(render_list("agw", &[]), "No certificates on agw\n");
    }

    #[test]
    fn test_render_list() {
        colored::control::set_override(false);
        let out = render_list(
            "agw",
            &[CertificateInfo {
                name: "site".into(),
                source: "key-vault",
                provisioning_state: None,
            }],
        );
        assert!(out.starts_with("Certificates:  agw\n"));
        assert!(out.contains("site"));
        assert!(out.contains("key-vault"));
        assert!(out.trim_end().ends_with('-'));
    }

    #[tokio::test]
    async fn test_import_then_remove() {
        let fake = fake_with_gateway();
        handle_import(&fake, "rg", "agw", "vault", "https://kv.vault.azure.net/secrets/vault")
            .await
            .unwrap();
        handle_remove(&fake, "rg", "agw", "site").await.unwrap();

        let live = fake.object(GATEWAY).unwrap();
        let certificates = live["properties"]["sslCertificates"].as_array().unwrap();
        assert_eq!(certificates.len(), 1);
        assert_eq!(certificates[0]["name"], "vault");
    }

    #[tokio::test]
    async fn test_missing_gateway_is_an_error() {
        let fake = FakeArm::new("sub");
        assert!(handle_list(&fake, "rg", "agw").await.is_err());
    }
}
