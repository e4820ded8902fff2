//! Resource and finder contracts
//!
//! A resource is a typed configuration bag for one cloud object together
//! with the four lifecycle operations the engine drives. A finder is a
//! read-only query over objects of one type.

use crate::diff::Diff;
use crate::error::Result;
use crate::schema::{self, Field};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Lifecycle contract for a single cloud resource type
///
/// The engine deserializes the declared configuration into `Self`, then:
///
/// - calls [`create`](Resource::create) when the resource is new,
/// - calls [`refresh`](Resource::refresh) on later runs to pull live state,
/// - calls [`update`](Resource::update) with the previously known state when
///   declared and live state differ,
/// - calls [`delete`](Resource::delete) when the resource leaves the configuration.
#[async_trait]
pub trait Resource: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync {
    /// Type name bound by the configuration language (e.g. "cdn-endpoint")
    const TYPE: &'static str;

    /// Handle to the cloud SDK this resource talks to
    type Client: ?Sized + Send + Sync;

    /// Declared configuration keys
    fn fields() -> &'static [Field];

    /// Provider-assigned identity, available after create or refresh
    fn id(&self) -> Option<&str>;

    /// Validate the declared configuration before any SDK call
    fn validate(&self) -> Result<()> {
        let value = serde_json::to_value(self)?;
        schema::validate_required(Self::TYPE, &value, Self::fields())
    }

    /// Pull live state into `self`. Returns `false` when the object no longer exists.
    async fn refresh(&mut self, client: &Self::Client) -> Result<bool>;

    /// Create the object and record its outputs
    async fn create(&mut self, client: &Self::Client) -> Result<()>;

    /// Apply the fields that differ between `current` and `self`
    async fn update(&self, client: &Self::Client, current: &Self) -> Result<()>;

    async fn delete(&self, client: &Self::Client) -> Result<()>;

    /// Typed comparison of `current` against this declared state
    fn diff<'a>(&'a self, current: &'a Self) -> Diff<'a, Self> {
        Diff::new(current, self)
    }
}

/// Read-only query adapter for one resource type
#[async_trait]
pub trait Finder: Send + Sync {
    /// Type name bound by the configuration language
    const TYPE: &'static str;

    type Client: ?Sized + Send + Sync;

    type Output: Resource;

    /// Every object of this type visible to the client
    async fn find_all(&self, client: &Self::Client) -> Result<Vec<Self::Output>>;

    /// Objects matching `id`; empty when nothing matches
    async fn find(&self, client: &Self::Client, id: &str) -> Result<Vec<Self::Output>>;
}
