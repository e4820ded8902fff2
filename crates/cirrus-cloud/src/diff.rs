//! Typed comparison between known and declared state

use crate::error::Result;
use crate::resource::Resource;
use crate::schema;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Comparison of a resource's current state against its declared state
pub struct Diff<'a, T> {
    pub current: &'a T,
    pub desired: &'a T,
}

impl<'a, T> Diff<'a, T> {
    pub fn new(current: &'a T, desired: &'a T) -> Self {
        Self { current, desired }
    }

    /// Whether the field selected by `field` differs
    pub fn changed<V, F>(&self, field: F) -> bool
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> &V,
    {
        field(self.current) != field(self.desired)
    }

    /// Declared value of a field, but only if it changed
    pub fn desired_if_changed<V, F>(&self, field: F) -> Option<&'a V>
    where
        V: PartialEq + ?Sized,
        F: Fn(&'a T) -> &'a V,
    {
        let current = field(self.current);
        let desired = field(self.desired);
        (current != desired).then_some(desired)
    }
}

impl<T: Resource> Diff<'_, T> {
    /// Configuration keys whose values differ, output fields excluded
    pub fn changed_fields(&self) -> Result<BTreeSet<String>> {
        let current = to_map(self.current)?;
        let desired = to_map(self.desired)?;
        let fields = T::fields();

        let keys: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();
        Ok(keys
            .into_iter()
            .filter(|k| !schema::field(fields, k).is_some_and(|f| f.is_output()))
            .filter(|k| current.get(*k) != desired.get(*k))
            .cloned()
            .collect())
    }

    /// Changed keys that cannot be applied in place
    pub fn replacement_fields(&self) -> Result<BTreeSet<String>> {
        let fields = T::fields();
        Ok(self
            .changed_fields()?
            .into_iter()
            .filter(|k| !schema::field(fields, k).is_some_and(|f| f.updatable))
            .collect())
    }
}

fn to_map<T: Serialize>(value: &T) -> Result<BTreeMap<String, serde_json::Value>> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect()),
        _ => Ok(BTreeMap::new()),
    }
}

/// A nested configuration object without its own lifecycle
///
/// The primary key is what matches an old instance with a new one when a
/// parent resource is updated.
pub trait SubResource: Clone + PartialEq {
    type Key: Ord + Clone + Display;

    fn primary_key(&self) -> Self::Key;
}

/// Result of matching two lists of sub-resources by primary key
#[derive(Debug, Clone, PartialEq)]
pub struct SubResourceChanges<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub modified: Vec<T>,
}

impl<T> SubResourceChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Match `current` and `desired` sub-resources by primary key
pub fn diff_subresources<T: SubResource>(current: &[T], desired: &[T]) -> SubResourceChanges<T> {
    let current_by_key: BTreeMap<T::Key, &T> =
        current.iter().map(|s| (s.primary_key(), s)).collect();
    let desired_keys: BTreeSet<T::Key> = desired.iter().map(|s| s.primary_key()).collect();

    let mut changes = SubResourceChanges {
        added: Vec::new(),
        removed: Vec::new(),
        modified: Vec::new(),
    };

    for item in desired {
        match current_by_key.get(&item.primary_key()) {
            None => changes.added.push(item.clone()),
            Some(existing) if *existing != item => changes.modified.push(item.clone()),
            Some(_) => {}
        }
    }

    for item in current {
        if !desired_keys.contains(&item.primary_key()) {
            changes.removed.push(item.clone());
        }
    }

    changes
}
