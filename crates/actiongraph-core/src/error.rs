use thiserror::Error;

use crate::types::ActionId;

/// Coarse error category, used by callers to pick a response (HTTP status,
/// exit code, user message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Forbidden,
    Internal,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("not initialized: run 'actiongraph init'")]
    NotInitialized,

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("group '{0}' already exists")]
    GroupExists(String),

    #[error("some given children can not be found: {}", format_ids(.missing))]
    ChildrenNotFound { missing: Vec<ActionId> },

    #[error("an action named '{name}' already exists in group {group}")]
    ActionExists { name: String, group: String },

    #[error("action '{0}' is used by a pipeline or another action")]
    ActionInUse(String),

    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("duplicate requirement '{name}' of type '{kind}'")]
    DuplicateRequirement { name: String, kind: String },

    #[error("an action can not have more than one model requirement")]
    DuplicateModelRequirement,

    #[error("an action can not have more than one hostname requirement")]
    DuplicateHostnameRequirement,

    #[error("parameter '{0}' is a secret: secrets can not be declared on an action")]
    SecretParameter(String),

    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("builtin action '{0}' can not have children")]
    BuiltinWithChildren(String),

    #[error("action '{name}' has type {kind} and is read-only")]
    ReadOnlyAction { name: String, kind: String },

    #[error("action '{0}' can not be moved to another group")]
    GroupChange(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("composition loop detected: {0}")]
    GraphCycle(String),

    #[error("action graph deeper than {0} levels")]
    GraphTooDeep(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised by callers that put access control in front of the graph;
    /// the engine itself has no notion of users beyond audit ids.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ActionNotFound(_) | Self::GroupNotFound(_) | Self::ChildrenNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::ActionExists { .. } | Self::ActionInUse(_) | Self::GroupExists(_) => {
                ErrorKind::Conflict
            }
            Self::InvalidRequirement(_)
            | Self::DuplicateRequirement { .. }
            | Self::DuplicateModelRequirement
            | Self::DuplicateHostnameRequirement
            | Self::SecretParameter(_)
            | Self::DuplicateParameter(_)
            | Self::BuiltinWithChildren(_)
            | Self::ReadOnlyAction { .. }
            | Self::GroupChange(_)
            | Self::InvalidInput(_)
            | Self::GraphCycle(_)
            | Self::GraphTooDeep(_)
            | Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotInitialized | Self::Sql(_) | Self::Json(_) | Self::Yaml(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn format_ids(ids: &[ActionId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            ActionError::ActionNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ActionError::ActionInUse("x".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ActionError::SecretParameter("token".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ActionError::Forbidden("team".into()).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            ActionError::InvalidConfig("max_graph_depth".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ActionError::Sql(rusqlite::Error::InvalidQuery).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn missing_children_are_listed() {
        let err = ActionError::ChildrenNotFound {
            missing: vec![4, 9],
        };
        assert_eq!(
            err.to_string(),
            "some given children can not be found: 4, 9"
        );
    }
}
