//! Field metadata declared by each resource type
//!
//! The engine needs three facts per configuration key: whether it must be
//! set, whether a change can be applied in place, and whether it is an
//! output the provider fills in after creation.

use crate::error::{CloudError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Required,
    Optional,
    Output,
}

/// A single configuration key of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub updatable: bool,
}

impl Field {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Required,
            updatable: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Optional,
            updatable: false,
        }
    }

    pub const fn output(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Output,
            updatable: false,
        }
    }

    /// Mark the field as changeable without replacing the resource
    pub const fn updatable(mut self) -> Self {
        self.updatable = true;
        self
    }

    pub fn is_output(&self) -> bool {
        self.kind == FieldKind::Output
    }
}

/// Look up a field by its configuration key
pub fn field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields.iter().find(|f| f.name == name)
}

/// Check that every required field is present and not blank
pub fn validate_required(resource_type: &str, value: &Value, fields: &[Field]) -> Result<()> {
    for f in fields.iter().filter(|f| f.kind == FieldKind::Required) {
        let blank = match value.get(f.name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            Some(_) => false,
        };
        if blank {
            return Err(CloudError::invalid(
                resource_type,
                format!("missing required field '{}'", f.name),
            ));
        }
    }
    Ok(())
}
