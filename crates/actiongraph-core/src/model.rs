//! Domain objects of the composition graph.
//!
//! An [`Action`] returned by a load is fully aggregated: its parameters,
//! requirements and bound children are attached. Call-site overrides of a
//! child live in its [`Binding`], never on the child's own fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{ActionId, ActionType, GroupId, UserId};

// ---------------------------------------------------------------------------
// Parameter / Requirement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Free text; `list` and `secret` carry special meaning.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub advanced: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value: value.into(),
            description: String::new(),
            advanced: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    /// Owning action. Rewritten to the parent when a propagated requirement
    /// is persisted.
    #[serde(default)]
    pub action_id: ActionId,
}

impl Requirement {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            value: value.into(),
            action_id: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Binding / ChildAction
// ---------------------------------------------------------------------------

/// Call-site properties of a child inside its parent's composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Empty means "use the child's name".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step_name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub always_executed: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            step_name: String::new(),
            optional: false,
            always_executed: false,
            enabled: true,
        }
    }
}

/// A child bound into a parent. `action` is a copy of the canonical child
/// whose parameter values already carry the edge overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildAction {
    pub action: Action,
    #[serde(default)]
    pub binding: Binding,
}

impl ChildAction {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            binding: Binding::default(),
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    pub fn step_name(&self) -> &str {
        if self.binding.step_name.is_empty() {
            &self.action.name
        } else {
            &self.binding.step_name
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Zero until the action has been persisted.
    #[serde(default)]
    pub id: ActionId,
    pub group_id: GroupId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ActionType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Action {
    /// A new enabled `Default` action owned by `group_id`.
    pub fn new(group_id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            group_id,
            name: name.into(),
            kind: ActionType::Default,
            description: String::new(),
            enabled: true,
            deprecated: false,
            requirements: Vec::new(),
            parameters: Vec::new(),
            children: Vec::new(),
            last_modified: None,
        }
    }

    pub fn with_kind(mut self, kind: ActionType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_parameter(mut self, p: Parameter) -> Self {
        self.parameters.push(p);
        self
    }

    pub fn with_requirement(mut self, r: Requirement) -> Self {
        self.requirements.push(r);
        self
    }

    pub fn with_child(mut self, child: ChildAction) -> Self {
        self.children.push(child);
        self
    }

    /// Distinct ids of the children, in first-seen order.
    pub fn unique_children_ids(&self) -> Vec<ActionId> {
        let mut seen = BTreeSet::new();
        self.children
            .iter()
            .map(|c| c.action.id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Checks the fields every submitted action must carry.
    pub fn is_valid(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::ActionError::InvalidInput(
                "action name is required".into(),
            ));
        }
        if self.group_id <= 0 {
            return Err(crate::ActionError::InvalidInput(format!(
                "action '{}' has no group",
                self.name
            )));
        }
        for child in &self.children {
            if child.action.id <= 0 {
                return Err(crate::ActionError::InvalidInput(format!(
                    "child '{}' of action '{}' has no id",
                    child.action.name, self.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Group / ActionAudit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

/// Snapshot of an action taken right before it was changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAudit {
    pub action_id: ActionId,
    pub user_id: UserId,
    pub change: String,
    pub versioned: DateTime<Utc>,
    pub action: Action,
}
