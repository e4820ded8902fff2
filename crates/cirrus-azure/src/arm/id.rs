//! Azure Resource Manager resource ids
//!
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{type}/{name}...]`

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: Option<String>,
    namespace: Option<String>,
    segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Id of a resource group
    pub fn resource_group(subscription_id: &str, name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: Some(name.to_string()),
            namespace: None,
            segments: Vec::new(),
        }
    }

    /// Id of a top-level resource inside a resource group
    pub fn new(
        subscription_id: &str,
        resource_group: &str,
        namespace: &str,
        resource_type: &str,
        name: &str,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: Some(resource_group.to_string()),
            namespace: Some(namespace.to_string()),
            segments: vec![(resource_type.to_string(), name.to_string())],
        }
    }

    /// Id of a nested resource below this one
    pub fn child(&self, resource_type: &str, name: &str) -> Self {
        let mut id = self.clone();
        id.segments
            .push((resource_type.to_string(), name.to_string()));
        id
    }

    pub fn parse(id: &str) -> Option<Self> {
        let parts: Vec<&str> = id.split('/').filter(|p| !p.is_empty()).collect();
        let mut iter = parts.into_iter();

        if !iter.next()?.eq_ignore_ascii_case("subscriptions") {
            return None;
        }
        let subscription_id = iter.next()?.to_string();

        let mut resource_group = None;
        let mut namespace = None;
        let mut segments = Vec::new();

        while let Some(key) = iter.next() {
            if key.eq_ignore_ascii_case("resourceGroups") && resource_group.is_none() {
                resource_group = Some(iter.next()?.to_string());
            } else if key.eq_ignore_ascii_case("providers") && namespace.is_none() {
                namespace = Some(iter.next()?.to_string());
            } else {
                let name = iter.next()?;
                segments.push((key.to_string(), name.to_string()));
            }
        }

        if namespace.is_some() && segments.is_empty() {
            return None;
        }

        Some(Self {
            subscription_id,
            resource_group,
            namespace,
            segments,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    /// Name of the innermost resource
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .or(self.resource_group.as_deref())
            .unwrap_or(&self.subscription_id)
    }

    /// Type segment of the innermost resource (e.g. "virtualNetworks", "A")
    pub fn resource_type(&self) -> Option<&str> {
        self.segments.last().map(|(t, _)| t.as_str())
    }

    /// Enclosing resource for nested ids
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut id = self.clone();
        id.segments.pop();
        Some(id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/resourceGroups/{}", rg)?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, "/providers/{}", ns)?;
        }
        for (resource_type, name) in &self.segments {
            write!(f, "/{}/{}", resource_type, name)?;
        }
        Ok(())
    }
}

/// Last path segment of an ARM id, which is the referenced object's name
pub fn name_of(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_nested() {
        let zone = ResourceId::new("sub", "rg", "Microsoft.Network", "dnsZones", "example.com");
        let record = zone.child("A", "www");
        assert_eq!(
            record.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/dnsZones/example.com/A/www"
        );
        assert_eq!(record.parent(), Some(zone));
        assert_eq!(record.name(), "www");
        assert_eq!(record.resource_type(), Some("A"));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let id = ResourceId::parse(
            "/subscriptions/sub/resourcegroups/RG/providers/Microsoft.Cdn/profiles/p/endpoints/e",
        )
        .unwrap();
        assert_eq!(id.resource_group_name(), Some("RG"));
        assert_eq!(id.name(), "e");
        assert_eq!(id.parent().unwrap().name(), "p");
    }

    #[test]
    fn test_parse_resource_group() {
        let id = ResourceId::parse("/subscriptions/sub/resourceGroups/rg").unwrap();
        assert_eq!(id, ResourceId::resource_group("sub", "rg"));
        assert_eq!(id.name(), "rg");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ResourceId::parse("not-an-id").is_none());
        assert!(ResourceId::parse("/subscriptions/sub/resourceGroups").is_none());
        assert!(ResourceId::parse("/subscriptions/sub/resourceGroups/rg/providers/X").is_none());
    }

    #[test]
    fn test_name_of() {
        assert_eq!(name_of("/a/b/frontendPorts/https"), "https");
        assert_eq!(name_of("plain"), "plain");
    }
}
