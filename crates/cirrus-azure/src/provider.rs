//! Azure provider entry point

use crate::adapter::{ArmFinder, ArmResource};
use crate::application_gateway::ApplicationGateway;
use crate::arm::{Arm, ArmClient, ArmClientConfig};
use crate::cdn::{CdnEndpoint, CdnProfile, EndpointFinder};
use crate::disk::Disk;
use crate::dns::{DnsRecordSet, DnsZone};
use crate::load_balancer::LoadBalancer;
use crate::network::Network;
use crate::network_interface::NetworkInterface;
use crate::network_security_group::NetworkSecurityGroup;
use crate::public_ip::PublicIpAddress;
use crate::resource_group::ResourceGroup;
use crate::virtual_machine::VirtualMachine;
use cirrus_cloud::{CloudError, ResourceRegistry, Result};
use cirrus_config::AzureCredentials;
use tokio::sync::OnceCell;

/// Azure provider
///
/// The management client is built on first use, so commands that never
/// reach Azure (listing types, validating configuration) need no
/// credentials.
pub struct AzureProvider {
    credentials: Option<AzureCredentials>,
    config: ArmClientConfig,
    client: OnceCell<ArmClient>,
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureProvider {
    /// Provider that discovers credentials when the client is first needed
    pub fn new() -> Self {
        Self {
            credentials: None,
            config: ArmClientConfig::default(),
            client: OnceCell::new(),
        }
    }

    pub fn with_credentials(credentials: AzureCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::new()
        }
    }

    pub fn with_client_config(mut self, config: ArmClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        "azure"
    }

    /// Shared management client, created on the first call
    pub async fn client(&self) -> Result<&ArmClient> {
        self.client
            .get_or_try_init(|| async {
                let credentials = match &self.credentials {
                    Some(credentials) => credentials.clone(),
                    None => cirrus_config::load_credentials()
                        .map_err(|e| CloudError::AuthenticationFailed(e.to_string()))?,
                };
                tracing::debug!(
                    "Connecting to subscription {}",
                    credentials.subscription_id
                );
                ArmClient::with_config(credentials, self.config.clone())
            })
            .await
    }

    /// Every resource and finder type this provider implements
    pub fn registry() -> ResourceRegistry<dyn Arm> {
        let mut registry = ResourceRegistry::new();
        register::<ResourceGroup>(&mut registry);
        register::<Network>(&mut registry);
        register::<PublicIpAddress>(&mut registry);
        register::<NetworkSecurityGroup>(&mut registry);
        register::<NetworkInterface>(&mut registry);
        register::<Disk>(&mut registry);
        register::<VirtualMachine>(&mut registry);
        register::<LoadBalancer>(&mut registry);
        register::<DnsZone>(&mut registry);
        register::<DnsRecordSet>(&mut registry);
        register::<CdnProfile>(&mut registry);
        register::<ApplicationGateway>(&mut registry);

        // Endpoints are found through their profiles, which know the sku
        registry
            .register::<CdnEndpoint>()
            .register_finder(EndpointFinder);
        registry
    }
}

fn register<R: ArmResource>(registry: &mut ResourceRegistry<dyn Arm>) {
    registry
        .register::<R>()
        .register_finder(ArmFinder::<R>::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeArm;
    use serde_json::json;

    const TYPES: &[&str] = &[
        "application-gateway",
        "cdn-endpoint",
        "cdn-profile",
        "disk",
        "dns-record-set",
        "dns-zone",
        "load-balancer",
        "network",
        "network-interface",
        "network-security-group",
        "public-ip-address",
        "resource-group",
        "virtual-machine",
    ];

    fn credentials() -> AzureCredentials {
        AzureCredentials {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            subscription_id: "sub".into(),
        }
    }

    #[test]
    fn test_registry_types() {
        let registry = AzureProvider::registry();
        let resources: Vec<&str> = registry.resource_types().collect();
        let finders: Vec<&str> = registry.finder_types().collect();
        assert_eq!(resources, TYPES);
        assert_eq!(finders, TYPES);
    }

    #[test]
    fn test_unknown_type() {
        let registry = AzureProvider::registry();
        assert!(matches!(
            registry.resource("sql-server", json!({})),
            Err(CloudError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_round_trip_through_fake() {
        let fake = FakeArm::new("sub");
        let registry = AzureProvider::registry();

        let mut group = registry
            .resource(
                "resource-group",
                json!({ "name": "rg", "region": "japaneast" }),
            )
            .unwrap();
        group.create(&fake).await.unwrap();
        assert_eq!(group.id(), Some("/subscriptions/sub/resourceGroups/rg"));

        let found = registry
            .finder("resource-group")
            .unwrap()
            .find_all(&fake)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "rg");
    }

    #[tokio::test]
    async fn test_client_is_built_once() {
        let provider = AzureProvider::with_credentials(credentials());
        let first = provider.client().await.unwrap() as *const ArmClient;
        let second = provider.client().await.unwrap() as *const ArmClient;
        assert_eq!(first, second);
        assert_eq!(provider.client().await.unwrap().subscription_id(), "sub");
    }
}
