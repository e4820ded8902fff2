//! Planned actions for declared resources

use crate::error::Result;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Represents a planned action for a cloud resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Resource type (e.g., "network", "dns-record-set")
    pub resource_type: String,

    /// Resource name as declared
    pub resource_name: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Configuration keys behind an update or replacement
    pub fields: BTreeSet<String>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete and recreate because a non-updatable field changed
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Decide what the engine has to do to move `current` to `desired`
pub fn plan_change<R: Resource>(
    name: &str,
    current: Option<&R>,
    desired: Option<&R>,
) -> Result<Action> {
    let (action_type, fields) = match (current, desired) {
        (None, None) => (ActionType::NoOp, BTreeSet::new()),
        (None, Some(_)) => (ActionType::Create, BTreeSet::new()),
        (Some(_), None) => (ActionType::Delete, BTreeSet::new()),
        (Some(current), Some(desired)) => {
            let diff = desired.diff(current);
            let changed = diff.changed_fields()?;
            let replace = diff.replacement_fields()?;
            if changed.is_empty() {
                (ActionType::NoOp, changed)
            } else if !replace.is_empty() {
                (ActionType::Replace, replace)
            } else {
                (ActionType::Update, changed)
            }
        }
    };

    tracing::debug!(
        "{} {}: {} {:?}",
        R::TYPE,
        name,
        action_type,
        fields
    );

    Ok(Action {
        resource_type: R::TYPE.to_string(),
        resource_name: name.to_string(),
        action_type,
        fields,
    })
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Whether the plan has any changes
    pub fn has_changes(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type != ActionType::NoOp)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            replace: self.actions_by_type(ActionType::Replace).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct Bucket {
        name: String,
        region: String,
        versioning: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    }

    #[async_trait]
    impl Resource for Bucket {
        const TYPE: &'static str = "bucket";
        type Client = ();

        fn fields() -> &'static [Field] {
            const FIELDS: &[Field] = &[
                Field::required("name"),
                Field::required("region"),
                Field::optional("versioning").updatable(),
                Field::output("id"),
            ];
            FIELDS
        }

        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        async fn refresh(&mut self, _client: &()) -> Result<bool> {
            Ok(true)
        }

        async fn create(&mut self, _client: &()) -> Result<()> {
            Ok(())
        }

        async fn update(&self, _client: &(), _current: &Self) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _client: &()) -> Result<()> {
            Ok(())
        }
    }

    fn bucket(region: &str, versioning: bool, id: Option<&str>) -> Bucket {
        Bucket {
            name: "logs".to_string(),
            region: region.to_string(),
            versioning,
            id: id.map(String::from),
        }
    }

    #[test]
    fn test_plan_update_for_updatable_field() {
        let current = bucket("japaneast", false, Some("/b/logs"));
        let desired = bucket("japaneast", true, None);

        let action = plan_change("logs", Some(&current), Some(&desired)).unwrap();
        assert_eq!(action.action_type, ActionType::Update);
        assert_eq!(action.fields, BTreeSet::from(["versioning".to_string()]));
    }

    #[test]
    fn test_plan_replace_for_fixed_field() {
        let current = bucket("japaneast", false, Some("/b/logs"));
        let desired = bucket("westus", true, None);

        let action = plan_change("logs", Some(&current), Some(&desired)).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
        assert_eq!(action.fields, BTreeSet::from(["region".to_string()]));
    }

    #[test]
    fn test_plan_ignores_outputs() {
        let current = bucket("japaneast", false, Some("/b/logs"));
        let desired = bucket("japaneast", false, None);

        let action = plan_change("logs", Some(&current), Some(&desired)).unwrap();
        assert_eq!(action.action_type, ActionType::NoOp);
    }

    #[test]
    fn test_plan_summary() {
        let desired = bucket("japaneast", false, None);
        let mut plan = Plan::default();
        plan.push(plan_change("a", None, Some(&desired)).unwrap());
        plan.push(plan_change::<Bucket>("b", Some(&desired), None).unwrap());
        plan.push(plan_change("c", Some(&desired), Some(&desired)).unwrap());

        assert!(plan.has_changes());
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 0 to replace, 1 to delete, 1 unchanged"
        );
    }
}
