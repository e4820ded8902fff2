//! Type-name registry for resources and finders
//!
//! The configuration language refers to resources by string tags such as
//! `"disk"` or `"cdn-endpoint"`. The registry binds those tags to typed
//! implementations and hands them back type-erased over JSON configuration.

use crate::error::{CloudError, Result};
use crate::resource::{Finder, Resource};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// A resource whose concrete type is only known through its type tag
#[async_trait]
pub trait DynResource<C: ?Sized + Send + Sync>: Send + Sync {
    fn resource_type(&self) -> &'static str;

    fn id(&self) -> Option<&str>;

    fn to_value(&self) -> Result<Value>;

    fn validate(&self) -> Result<()>;

    async fn refresh(&mut self, client: &C) -> Result<bool>;

    async fn create(&mut self, client: &C) -> Result<()>;

    /// `current` is the previously known state in configuration form
    async fn update(&self, client: &C, current: &Value) -> Result<()>;

    async fn delete(&self, client: &C) -> Result<()>;
}

#[async_trait]
impl<R, C> DynResource<C> for R
where
    R: Resource<Client = C>,
    C: ?Sized + Send + Sync,
{
    fn resource_type(&self) -> &'static str {
        R::TYPE
    }

    fn id(&self) -> Option<&str> {
        Resource::id(self)
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn validate(&self) -> Result<()> {
        Resource::validate(self)
    }

    async fn refresh(&mut self, client: &C) -> Result<bool> {
        Resource::refresh(self, client).await
    }

    async fn create(&mut self, client: &C) -> Result<()> {
        Resource::create(self, client).await
    }

    async fn update(&self, client: &C, current: &Value) -> Result<()> {
        let current: R = parse_config(current.clone())?;
        Resource::update(self, client, &current).await
    }

    async fn delete(&self, client: &C) -> Result<()> {
        Resource::delete(self, client).await
    }
}

/// A finder whose results are returned in configuration form
#[async_trait]
pub trait DynFinder<C: ?Sized + Send + Sync>: Send + Sync {
    async fn find_all(&self, client: &C) -> Result<Vec<Value>>;

    async fn find(&self, client: &C, id: &str) -> Result<Vec<Value>>;
}

#[async_trait]
impl<F, C> DynFinder<C> for F
where
    F: Finder<Client = C>,
    C: ?Sized + Send + Sync,
{
    async fn find_all(&self, client: &C) -> Result<Vec<Value>> {
        to_values(Finder::find_all(self, client).await?)
    }

    async fn find(&self, client: &C, id: &str) -> Result<Vec<Value>> {
        to_values(Finder::find(self, client, id).await?)
    }
}

fn to_values<R: Resource>(resources: Vec<R>) -> Result<Vec<Value>> {
    resources
        .iter()
        .map(|r| serde_json::to_value(r).map_err(CloudError::from))
        .collect()
}

/// Deserialize declared configuration into a resource
///
/// Malformed configuration, including unknown discriminator values, is
/// reported as `InvalidConfig`.
pub fn parse_config<R: Resource>(config: Value) -> Result<R> {
    serde_json::from_value(config).map_err(|e| CloudError::invalid(R::TYPE, e))
}

type ResourceFactory<C> = fn(Value) -> Result<Box<dyn DynResource<C>>>;

fn build_resource<R, C>(config: Value) -> Result<Box<dyn DynResource<C>>>
where
    R: Resource<Client = C> + 'static,
    C: ?Sized + Send + Sync + 'static,
{
    let resource: R = parse_config(config)?;
    Resource::validate(&resource)?;
    Ok(Box::new(resource))
}

/// Resource and finder types available to the engine
pub struct ResourceRegistry<C: ?Sized + Send + Sync + 'static> {
    resources: BTreeMap<&'static str, ResourceFactory<C>>,
    finders: BTreeMap<&'static str, Box<dyn DynFinder<C>>>,
}

impl<C: ?Sized + Send + Sync + 'static> Default for ResourceRegistry<C> {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            finders: BTreeMap::new(),
        }
    }
}

impl<C: ?Sized + Send + Sync + 'static> ResourceRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R>(&mut self) -> &mut Self
    where
        R: Resource<Client = C> + 'static,
    {
        self.resources.insert(R::TYPE, build_resource::<R, C>);
        self
    }

    pub fn register_finder<F>(&mut self, finder: F) -> &mut Self
    where
        F: Finder<Client = C> + 'static,
    {
        self.finders.insert(F::TYPE, Box::new(finder));
        self
    }

    /// Build and validate a resource of type `type_name` from configuration
    pub fn resource(&self, type_name: &str, config: Value) -> Result<Box<dyn DynResource<C>>> {
        let factory = self
            .resources
            .get(type_name)
            .ok_or_else(|| CloudError::UnknownType(type_name.to_string()))?;
        factory(config)
    }

    pub fn finder(&self, type_name: &str) -> Result<&dyn DynFinder<C>> {
        self.finders
            .get(type_name)
            .map(|f| f.as_ref())
            .ok_or_else(|| CloudError::UnknownType(type_name.to_string()))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn finder_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.finders.keys().copied()
    }
}
