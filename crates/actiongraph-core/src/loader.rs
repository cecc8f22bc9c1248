//! Read side of the engine: base rows from the store, run through the
//! aggregation pipeline. Everything returned here is fully aggregated.

use rusqlite::Connection;
use tracing::debug;

use crate::aggregate;
use crate::error::{ActionError, Result};
use crate::model::Action;
use crate::store::{self, ActionFilter};
use crate::types::{ActionId, GroupId};

pub struct Loader<'c> {
    conn: &'c Connection,
    max_depth: usize,
}

impl<'c> Loader<'c> {
    pub fn new(conn: &'c Connection, max_depth: usize) -> Self {
        Self { conn, max_depth }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn aggregated(&self, mut actions: Vec<Action>, depth: usize) -> Result<Vec<Action>> {
        aggregate::run(self, &mut actions, depth)?;
        Ok(actions)
    }

    fn aggregated_one(&self, action: Option<Action>, what: impl FnOnce() -> String) -> Result<Action> {
        let action = action.ok_or_else(|| ActionError::ActionNotFound(what()))?;
        let mut one = self.aggregated(vec![action], 0)?;
        Ok(one.remove(0))
    }

    pub fn load_by_id(&self, id: ActionId) -> Result<Action> {
        let base = store::get_action(self.conn, id)?;
        self.aggregated_one(base, || id.to_string())
    }

    /// Builtin or Default action called `name` in `group_id`, ignoring case.
    pub fn load_by_name_and_group(&self, name: &str, group_id: GroupId) -> Result<Action> {
        let base = store::get_action_by_name_and_group(self.conn, name, group_id)?;
        self.aggregated_one(base, || format!("{name} (group {group_id})"))
    }

    /// Builtin or Default action called `name` in any group. When several
    /// groups own one, the oldest wins.
    pub fn load_by_name(&self, name: &str) -> Result<Action> {
        let base = store::get_actions_by_name(self.conn, name)?.into_iter().next();
        self.aggregated_one(base, || name.to_string())
    }

    /// Every Builtin or Default action owned by one of `group_ids`.
    pub fn load_all_for_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Action>> {
        let base = store::get_actions_for_groups(self.conn, group_ids)?;
        debug!(groups = ?group_ids, count = base.len(), "loading actions for groups");
        self.aggregated(base, 0)
    }

    pub fn load_all(&self) -> Result<Vec<Action>> {
        let base = store::get_all_actions(self.conn)?;
        self.aggregated(base, 0)
    }

    pub fn load_many(&self, ids: &[ActionId], filter: ActionFilter<'_>) -> Result<Vec<Action>> {
        self.load_many_at(ids, filter, 0)
    }

    pub(crate) fn load_many_at(
        &self,
        ids: &[ActionId],
        filter: ActionFilter<'_>,
        depth: usize,
    ) -> Result<Vec<Action>> {
        let base = store::get_actions_by_ids(self.conn, ids, filter)?;
        self.aggregated(base, depth)
    }
}
