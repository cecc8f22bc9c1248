//! Mutations of the action graph.
//!
//! A [`CompositionEngine`] works on one connection, normally an open
//! transaction owned by the caller. It never commits: when any step fails the
//! caller drops the transaction and nothing is written.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::audit;
use crate::error::{ActionError, Result};
use crate::loader::Loader;
use crate::model::{Action, ChildAction, Group, Parameter, Requirement};
use crate::requirement;
use crate::store::{self, ActionFilter, EdgeRow};
use crate::types::{ActionId, ActionType, GroupId, UserId, LIST_PARAMETER, SECRET_PARAMETER};
use crate::usage::UsageIndex;
use crate::validate::GraphValidator;

pub struct CompositionEngine<'c> {
    conn: &'c Connection,
    shared_group_id: GroupId,
    max_depth: usize,
}

impl<'c> CompositionEngine<'c> {
    pub fn new(conn: &'c Connection, shared_group_id: GroupId, max_depth: usize) -> Self {
        Self {
            conn,
            shared_group_id,
            max_depth,
        }
    }

    fn loader(&self) -> Loader<'c> {
        Loader::new(self.conn, self.max_depth)
    }

    fn validator(&self) -> GraphValidator<'c> {
        GraphValidator::new(self.conn, self.max_depth)
    }

    /// Groups whose actions `group_id` may use as children.
    fn allowed_groups(&self, group_id: GroupId) -> Vec<GroupId> {
        if group_id == self.shared_group_id {
            vec![group_id]
        } else {
            vec![group_id, self.shared_group_id]
        }
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Creates a `Default` action with its edges, parameters and the union of
    /// its own and its children's requirements. Returns the stored action,
    /// fully aggregated.
    pub fn insert(&self, action: &Action) -> Result<Action> {
        action.is_valid()?;
        check_editable_kind(action)?;
        check_parameters(&action.parameters)?;
        let group = self.group(action.group_id)?;
        self.check_name_free(action, &group)?;
        self.validator()
            .check_children_exist(action, &self.allowed_groups(action.group_id))?;

        let id = store::insert_action(self.conn, action, Utc::now())?;
        debug!(action = id, name = %action.name, "inserted base row");

        let canonical = self.canonical_children(action)?;
        self.insert_children(id, &action.children, &canonical)?;
        self.insert_requirements(id, action, &canonical)?;
        for p in &action.parameters {
            store::insert_parameter(self.conn, id, p)?;
        }

        self.loader().load_by_id(id)
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Fully replaces the edges, parameters and requirements of `action.id`,
    /// then its scalar fields. The previous state goes to the audit history.
    /// Returns the state before and after the change.
    pub fn update(&self, action: &Action, user_id: UserId) -> Result<(Action, Action)> {
        action.is_valid()?;
        let current = store::get_action(self.conn, action.id)?
            .ok_or_else(|| ActionError::ActionNotFound(action.id.to_string()))?;
        if current.kind != ActionType::Default {
            return Err(ActionError::ReadOnlyAction {
                name: current.name,
                kind: current.kind.to_string(),
            });
        }
        if current.group_id != action.group_id {
            return Err(ActionError::GroupChange(current.name));
        }
        check_editable_kind(action)?;
        check_parameters(&action.parameters)?;
        let group = self.group(action.group_id)?;
        self.check_name_free(action, &group)?;

        let validator = self.validator();
        validator.check_children_exist_with_loop(action, &self.allowed_groups(action.group_id))?;
        validator.check_not_own_descendant(action)?;

        let before = audit::record(&self.loader(), action.id, user_id, audit::CHANGE_UPDATE)?;

        let canonical = self.canonical_children(action)?;
        store::delete_edges_by_parent_id(self.conn, action.id)?;
        self.insert_children(action.id, &action.children, &canonical)?;

        store::delete_parameters_by_action_id(self.conn, action.id)?;
        for p in &action.parameters {
            store::insert_parameter(self.conn, action.id, p)?;
        }

        store::delete_requirements_by_action_id(self.conn, action.id)?;
        self.insert_requirements(action.id, action, &canonical)?;

        store::update_action(self.conn, action, Utc::now())?;

        let after = self.loader().load_by_id(action.id)?;
        Ok((before, after))
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Removes an unreferenced `Default` action. Returns its last state.
    pub fn delete(&self, id: ActionId, user_id: UserId) -> Result<Action> {
        let current = store::get_action(self.conn, id)?
            .ok_or_else(|| ActionError::ActionNotFound(id.to_string()))?;
        if current.kind != ActionType::Default {
            return Err(ActionError::ReadOnlyAction {
                name: current.name,
                kind: current.kind.to_string(),
            });
        }
        if UsageIndex::new(self.conn, self.shared_group_id).used(id)? {
            warn!(action = id, name = %current.name, "refusing to delete an action in use");
            return Err(ActionError::ActionInUse(current.name));
        }

        let before = audit::record(&self.loader(), id, user_id, audit::CHANGE_DELETE)?;
        store::delete_action(self.conn, id)?;
        Ok(before)
    }

    // -----------------------------------------------------------------------
    // Seed
    // -----------------------------------------------------------------------

    /// Writes a `Builtin` or `Plugin` catalog entry. These are owned by the
    /// platform: no children, no audit.
    pub fn seed(&self, action: &Action) -> Result<Action> {
        action.is_valid()?;
        match action.kind {
            ActionType::Builtin | ActionType::Plugin => {}
            other => {
                return Err(ActionError::InvalidInput(format!(
                    "only Builtin and Plugin actions can be seeded, got {other}"
                )))
            }
        }
        if !action.children.is_empty() {
            return Err(ActionError::BuiltinWithChildren(action.name.clone()));
        }
        check_parameters(&action.parameters)?;
        self.group(action.group_id)?;

        let mut requirements = action.requirements.clone();
        requirement::validate(&requirements)?;
        requirement::sort(&mut requirements);

        let id = store::insert_action(self.conn, action, Utc::now())?;
        for mut r in requirements {
            r.action_id = id;
            store::insert_requirement(self.conn, &r)?;
        }
        for p in &action.parameters {
            store::insert_parameter(self.conn, id, p)?;
        }
        self.loader().load_by_id(id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn group(&self, id: GroupId) -> Result<Group> {
        store::get_group_by_id(self.conn, id)?
            .ok_or_else(|| ActionError::GroupNotFound(id.to_string()))
    }

    fn check_name_free(&self, action: &Action, group: &Group) -> Result<()> {
        match store::get_default_action_by_name_and_group(self.conn, &action.name, group.id)? {
            Some(existing) if existing.id != action.id => {
                Err(ActionError::ActionExists {
                    name: action.name.clone(),
                    group: group.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Fully aggregated canonical children of `action`, by id.
    fn canonical_children(&self, action: &Action) -> Result<HashMap<ActionId, Action>> {
        let ids = action.unique_children_ids();
        let children = self.loader().load_many(&ids, ActionFilter::default())?;
        Ok(children.into_iter().map(|c| (c.id, c)).collect())
    }

    /// One edge per child, in list order, with its parameter overrides.
    fn insert_children(
        &self,
        parent_id: ActionId,
        children: &[ChildAction],
        canonical: &HashMap<ActionId, Action>,
    ) -> Result<()> {
        for (i, child) in children.iter().enumerate() {
            let base = canonical
                .get(&child.action.id)
                .ok_or_else(|| ActionError::ChildrenNotFound {
                    missing: vec![child.action.id],
                })?;

            let mut binding = child.binding.clone();
            if binding.step_name.to_lowercase() == base.name.to_lowercase() {
                binding.step_name.clear();
            }

            let edge_id = store::insert_edge(
                self.conn,
                &EdgeRow {
                    id: 0,
                    parent_id,
                    child_id: base.id,
                    exec_order: i as i64 + 1,
                    binding,
                },
            )?;

            let params = if child.action.parameters.is_empty() {
                &base.parameters
            } else {
                &child.action.parameters
            };
            for p in params {
                store::insert_edge_parameter(self.conn, edge_id, &collapse_list_value(p))?;
            }
        }
        Ok(())
    }

    /// Persists the effective requirement set of `action` under `id`.
    fn insert_requirements(
        &self,
        id: ActionId,
        action: &Action,
        canonical: &HashMap<ActionId, Action>,
    ) -> Result<()> {
        let requirements = effective_requirements(action, canonical);
        requirement::validate(&requirements)?;
        for mut r in requirements {
            r.action_id = id;
            store::insert_requirement(self.conn, &r)?;
        }
        Ok(())
    }
}

/// Only `Default` actions go through insert and update.
fn check_editable_kind(action: &Action) -> Result<()> {
    match action.kind {
        ActionType::Default => Ok(()),
        ActionType::Builtin if !action.children.is_empty() => {
            Err(ActionError::BuiltinWithChildren(action.name.clone()))
        }
        other => Err(ActionError::ReadOnlyAction {
            name: action.name.clone(),
            kind: other.to_string(),
        }),
    }
}

fn check_parameters(params: &[Parameter]) -> Result<()> {
    let mut seen = HashSet::new();
    for p in params {
        if p.name.trim().is_empty() {
            return Err(ActionError::InvalidInput("parameter name is required".into()));
        }
        if p.kind == SECRET_PARAMETER {
            return Err(ActionError::SecretParameter(p.name.clone()));
        }
        if !seen.insert(p.name.as_str()) {
            return Err(ActionError::DuplicateParameter(p.name.clone()));
        }
    }
    Ok(())
}

/// A list parameter bound without a choice takes its first item:
/// `"aa;bb;cc"` is stored as `"aa"`.
fn collapse_list_value(p: &Parameter) -> Parameter {
    let mut p = p.clone();
    if p.kind == LIST_PARAMETER {
        if let Some((first, _)) = p.value.split_once(';') {
            p.value = first.to_string();
        }
    }
    p
}

/// Own requirements plus those of every enabled child, or nothing when the
/// action is disabled. A child submitted without requirements contributes
/// its stored ones.
fn effective_requirements(
    action: &Action,
    canonical: &HashMap<ActionId, Action>,
) -> Vec<Requirement> {
    if !action.enabled {
        return Vec::new();
    }
    let mut merged = action.requirements.clone();
    for child in action.children.iter().filter(|c| c.binding.enabled) {
        let inherited = if child.action.requirements.is_empty() {
            canonical
                .get(&child.action.id)
                .map(|c| c.requirements.as_slice())
                .unwrap_or(&[])
        } else {
            child.action.requirements.as_slice()
        };
        requirement::union_into(&mut merged, inherited);
    }
    requirement::sort(&mut merged);
    merged
}
