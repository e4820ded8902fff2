//! Azure Resource Manager access
//!
//! [`Arm`] is the seam between resource adapters and the management API.
//! [`ArmClient`] talks to `management.azure.com`; tests use the in-memory
//! double from [`crate::testing`].

mod auth;
mod client;
mod id;
mod update;
pub mod value;

pub use auth::{AccessToken, TokenCredential};
pub use client::{ArmClient, ArmClientConfig};
pub use id::{ResourceId, name_of};
pub use update::ArmUpdate;

use async_trait::async_trait;
use cirrus_cloud::Result;
use serde_json::Value;

/// Operations of the Azure management API used by resource adapters
///
/// Writes block until any long-running operation has finished and return
/// the resulting object.
#[async_trait]
pub trait Arm: Send + Sync {
    fn subscription_id(&self) -> &str;

    /// Fetch an object; `None` when it does not exist
    async fn get(&self, id: &str, api_version: &str) -> Result<Option<Value>>;

    /// Create or replace an object
    async fn put(&self, id: &str, api_version: &str, body: &Value) -> Result<Value>;

    async fn patch(&self, id: &str, api_version: &str, body: &Value) -> Result<Value>;

    /// Invoke an action endpoint such as `.../start`
    async fn post(&self, path: &str, api_version: &str, body: Option<&Value>) -> Result<Value>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, id: &str, api_version: &str) -> Result<()>;

    /// List a collection, following `nextLink` pages
    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>>;
}

/// Subscription-wide collection path for a provider type
pub fn collection_path(client: &dyn Arm, namespace: &str, resource_type: &str) -> String {
    format!(
        "/subscriptions/{}/providers/{}/{}",
        client.subscription_id(),
        namespace,
        resource_type
    )
}
