use serde::{Deserialize, Serialize};
use std::fmt;

pub type ActionId = i64;
pub type GroupId = i64;
pub type UserId = i64;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// Kind of catalog entry. Only `Default` actions are created, edited or
/// deleted by the composition engine; the others are seeded externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionType {
    /// Atomic action shipped with the platform. Never has children.
    Builtin,
    /// User-defined composite action.
    #[default]
    Default,
    Plugin,
    /// Action backing a pipeline job.
    Joined,
}

impl ActionType {
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::Builtin,
            ActionType::Default,
            ActionType::Plugin,
            ActionType::Joined,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Builtin => "Builtin",
            ActionType::Default => "Default",
            ActionType::Plugin => "Plugin",
            ActionType::Joined => "Joined",
        }
    }

    /// Whether the type can appear as a child in a composition.
    pub fn is_composable(self) -> bool {
        matches!(self, ActionType::Builtin | ActionType::Default)
    }

    pub fn has_children(self) -> bool {
        self != ActionType::Builtin
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Builtin" => Ok(ActionType::Builtin),
            "Default" => Ok(ActionType::Default),
            "Plugin" => Ok(ActionType::Plugin),
            "Joined" => Ok(ActionType::Joined),
            _ => Err(crate::error::ActionError::InvalidInput(format!(
                "unknown action type '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Well-known parameter and requirement types
// ---------------------------------------------------------------------------

pub const LIST_PARAMETER: &str = "list";
pub const SECRET_PARAMETER: &str = "secret";
pub const STRING_PARAMETER: &str = "string";

pub const BINARY_REQUIREMENT: &str = "binary";
pub const MODEL_REQUIREMENT: &str = "model";
pub const HOSTNAME_REQUIREMENT: &str = "hostname";
