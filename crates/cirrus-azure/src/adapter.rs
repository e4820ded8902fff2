//! Shared plumbing between resource types and the management API
//!
//! Each resource describes how it maps to an ARM object ([`ArmResource`]);
//! the lifecycle functions here do the rest the same way for every type.

use crate::arm::{Arm, ArmUpdate, ResourceId, value};
use async_trait::async_trait;
use cirrus_cloud::{Finder, Resource, Result, schema};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;

pub type Tags = BTreeMap<String, String>;

/// Mapping between a declared resource and its ARM representation
#[async_trait]
pub trait ArmResource: Resource<Client = dyn Arm> + 'static {
    const API_VERSION: &'static str;

    /// Id the object has (or will have) in the subscription
    fn arm_id(&self, subscription_id: &str) -> ResourceId;

    /// Request body for create; child references are resolved against `subscription_id`
    fn to_arm(&self, subscription_id: &str) -> Result<Value>;

    /// Declared-shape copy of a live object
    fn from_arm(value: &Value) -> Result<Self>;

    /// Copy output fields of a freshly written object into `self`
    fn take_outputs(&mut self, live: Self);

    /// Carry over declared values the API never returns (secrets, parent metadata)
    fn keep_declared(&mut self, _declared: &Self) {}

    /// Raw objects of this type across the subscription
    async fn list_all(client: &dyn Arm) -> Result<Vec<Value>>;
}

/// Id to address `resource` with: the recorded output if known, else the computed one
pub fn resolved_id<R: ArmResource>(resource: &R, client: &dyn Arm) -> String {
    resource
        .id()
        .map(String::from)
        .unwrap_or_else(|| resource.arm_id(client.subscription_id()).to_string())
}

/// Required-field check shared by every `validate` override
pub fn validate_required<R: Resource>(resource: &R) -> Result<()> {
    let value = serde_json::to_value(resource)?;
    schema::validate_required(R::TYPE, &value, R::fields())
}

pub async fn create<R: ArmResource>(resource: &mut R, client: &dyn Arm) -> Result<()> {
    resource.validate()?;

    let id = resource.arm_id(client.subscription_id()).to_string();
    tracing::info!("Creating {} {}", R::TYPE, id);

    let body = resource.to_arm(client.subscription_id())?;
    let response = client.put(&id, R::API_VERSION, &body).await?;
    let live = R::from_arm(&response)?;
    resource.take_outputs(live);
    Ok(())
}

pub async fn refresh<R: ArmResource>(resource: &mut R, client: &dyn Arm) -> Result<bool> {
    let id = resolved_id(resource, client);

    match client.get(&id, R::API_VERSION).await? {
        None => {
            tracing::debug!("{} {} no longer exists", R::TYPE, id);
            Ok(false)
        }
        Some(value) => {
            let mut live = R::from_arm(&value)?;
            live.keep_declared(resource);
            *resource = live;
            Ok(true)
        }
    }
}

pub async fn delete<R: ArmResource>(resource: &R, client: &dyn Arm) -> Result<()> {
    let id = resolved_id(resource, client);
    tracing::info!("Deleting {} {}", R::TYPE, id);
    client.delete(&id, R::API_VERSION).await
}

/// Fetch the live object as the starting point of an update
pub async fn begin_update<R: ArmResource>(resource: &R, client: &dyn Arm) -> Result<ArmUpdate> {
    let id = resolved_id(resource, client);
    ArmUpdate::begin(client, &id, R::API_VERSION).await
}

pub fn tags_value(tags: &Tags) -> Value {
    serde_json::to_value(tags).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Finder backed by [`ArmResource::list_all`] and a GET by id
pub struct ArmFinder<R>(PhantomData<fn() -> R>);

impl<R> ArmFinder<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for ArmFinder<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: ArmResource> Finder for ArmFinder<R> {
    const TYPE: &'static str = R::TYPE;
    type Client = dyn Arm;
    type Output = R;

    /// Objects this type cannot represent (an unsupported sku or record
    /// type, say) are left out of the result.
    async fn find_all(&self, client: &dyn Arm) -> Result<Vec<R>> {
        Ok(R::list_all(client)
            .await?
            .iter()
            .filter_map(from_arm_or_skip::<R>)
            .collect())
    }

    async fn find(&self, client: &dyn Arm, id: &str) -> Result<Vec<R>> {
        if ResourceId::parse(id).is_none() {
            tracing::debug!("'{}' is not a resource id", id);
            return Ok(Vec::new());
        }

        match client.get(id, R::API_VERSION).await? {
            Some(value) => Ok(from_arm_or_skip::<R>(&value).into_iter().collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// Map a found object, or log and drop it when `R` cannot represent it
pub(crate) fn from_arm_or_skip<R: ArmResource>(object: &Value) -> Option<R> {
    match R::from_arm(object) {
        Ok(resource) => Some(resource),
        Err(e) => {
            tracing::debug!(
                "Skipping {} {}: {}",
                R::TYPE,
                value::str_at(object, "/id").unwrap_or_default(),
                e
            );
            None
        }
    }
}
