//! Azure provider for Cirrus
//!
//! Maps declared configuration onto Azure Resource Manager objects. Every
//! resource type implements [`cirrus_cloud::Resource`] and has a matching
//! [`cirrus_cloud::Finder`]; [`AzureProvider::registry`] binds them to the
//! type tags used in configuration.
//!
//! # Supported resources
//!
//! - **Compute**: `virtual-machine`, `disk`
//! - **Network**: `resource-group`, `network`, `public-ip-address`,
//!   `network-security-group`, `network-interface`, `load-balancer`,
//!   `application-gateway`
//! - **DNS**: `dns-zone`, `dns-record-set`
//! - **CDN**: `cdn-profile`, `cdn-endpoint`
//!
//! # Requirements
//!
//! A service principal, taken from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
//! `AZURE_CLIENT_SECRET` and `AZURE_SUBSCRIPTION_ID` or from a
//! `credentials.yaml` (see [`cirrus_config::find_credentials_file`]).
//!
//! # Example
//!
//! ```ignore
//! use cirrus_azure::AzureProvider;
//!
//! let provider = AzureProvider::new();
//! let registry = AzureProvider::registry();
//!
//! let client = provider.client().await?;
//! let disks = registry.finder("disk")?.find_all(client).await?;
//! ```

pub mod adapter;
pub mod application_gateway;
pub mod arm;
pub mod cdn;
pub mod disk;
pub mod dns;
pub mod load_balancer;
pub mod network;
pub mod network_interface;
pub mod network_security_group;
pub mod provider;
pub mod public_ip;
pub mod resource_group;
pub mod virtual_machine;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{ArmFinder, ArmResource, Tags};
pub use application_gateway::ApplicationGateway;
pub use arm::{Arm, ArmClient, ArmClientConfig, ResourceId};
pub use cdn::{CdnEndpoint, CdnProfile};
pub use disk::Disk;
pub use dns::{DnsRecordSet, DnsZone};
pub use load_balancer::LoadBalancer;
pub use network::Network;
pub use network_interface::NetworkInterface;
pub use network_security_group::NetworkSecurityGroup;
pub use provider::AzureProvider;
pub use public_ip::PublicIpAddress;
pub use resource_group::ResourceGroup;
pub use virtual_machine::VirtualMachine;
