//! Pre-commit checks on a proposed child list: existence, group scope and
//! composition loops.

use std::collections::HashSet;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{ActionError, Result};
use crate::model::Action;
use crate::store::{self, ActionFilter};
use crate::types::{ActionId, ActionType, GroupId};

pub struct GraphValidator<'c> {
    conn: &'c Connection,
    max_depth: usize,
}

impl<'c> GraphValidator<'c> {
    pub fn new(conn: &'c Connection, max_depth: usize) -> Self {
        Self { conn, max_depth }
    }

    /// Fails unless every distinct child of `action` is a Builtin or Default
    /// action owned by one of `allowed_group_ids`. Returns the resolved base
    /// rows.
    pub fn check_children_exist(
        &self,
        action: &Action,
        allowed_group_ids: &[GroupId],
    ) -> Result<Vec<Action>> {
        if action.children.is_empty() {
            return Ok(Vec::new());
        }
        self.resolve(&action.unique_children_ids(), allowed_group_ids)
    }

    /// Same as [`check_children_exist`](Self::check_children_exist), then
    /// re-applies the check to the persisted children of every child, down
    /// the whole reachable subgraph. A loop already present in that subgraph
    /// is reported as [`ActionError::GraphCycle`]; a walk deeper than the
    /// configured bound as [`ActionError::GraphTooDeep`].
    ///
    /// This only looks at what is stored below the proposed children. Use
    /// [`check_not_own_descendant`](Self::check_not_own_descendant) to catch
    /// a loop closed by the proposal itself.
    pub fn check_children_exist_with_loop(
        &self,
        action: &Action,
        allowed_group_ids: &[GroupId],
    ) -> Result<Vec<Action>> {
        if action.children.is_empty() || action.kind == ActionType::Builtin {
            return Ok(Vec::new());
        }
        let children = self.resolve(&action.unique_children_ids(), allowed_group_ids)?;

        let mut verified = HashSet::new();
        let mut path = Vec::new();
        for child in &children {
            self.walk(child, allowed_group_ids, &mut path, &mut verified)?;
        }
        Ok(children)
    }

    /// Fails when `action` would become its own descendant: either it lists
    /// itself as a child or one of its proposed children already reaches it
    /// through stored edges.
    pub fn check_not_own_descendant(&self, action: &Action) -> Result<()> {
        if action.id <= 0 {
            // not persisted yet, nothing can point at it
            return Ok(());
        }
        let mut frontier = action.unique_children_ids();
        let mut visited: HashSet<ActionId> = HashSet::new();
        let mut depth = 0;
        while !frontier.is_empty() {
            if frontier.contains(&action.id) {
                return Err(ActionError::GraphCycle(format!(
                    "action '{}' ({}) would contain itself",
                    action.name, action.id
                )));
            }
            depth += 1;
            if depth > self.max_depth {
                return Err(ActionError::GraphTooDeep(self.max_depth));
            }
            visited.extend(frontier.iter().copied());
            let edges = store::get_edges_by_parent_ids(self.conn, &frontier)?;
            let mut next: Vec<ActionId> = edges
                .into_iter()
                .map(|e| e.child_id)
                .filter(|id| !visited.contains(id))
                .collect();
            next.sort_unstable();
            next.dedup();
            frontier = next;
        }
        Ok(())
    }

    fn resolve(&self, ids: &[ActionId], allowed_group_ids: &[GroupId]) -> Result<Vec<Action>> {
        let found = store::get_actions_by_ids(
            self.conn,
            ids,
            ActionFilter::composable_in(allowed_group_ids),
        )?;
        if found.len() < ids.len() {
            let present: HashSet<ActionId> = found.iter().map(|a| a.id).collect();
            let missing = ids.iter().copied().filter(|id| !present.contains(id)).collect();
            return Err(ActionError::ChildrenNotFound { missing });
        }
        Ok(found)
    }

    fn walk(
        &self,
        node: &Action,
        allowed_group_ids: &[GroupId],
        path: &mut Vec<ActionId>,
        verified: &mut HashSet<ActionId>,
    ) -> Result<()> {
        if node.kind == ActionType::Builtin || verified.contains(&node.id) {
            return Ok(());
        }
        if path.contains(&node.id) {
            return Err(ActionError::GraphCycle(format!(
                "action '{}' ({}) is its own descendant",
                node.name, node.id
            )));
        }
        if path.len() >= self.max_depth {
            return Err(ActionError::GraphTooDeep(self.max_depth));
        }

        let child_ids = self.stored_child_ids(node.id)?;
        if !child_ids.is_empty() {
            debug!(action = node.id, children = child_ids.len(), "checking stored children");
            let children = self.resolve(&child_ids, allowed_group_ids)?;
            path.push(node.id);
            for child in &children {
                self.walk(child, allowed_group_ids, path, verified)?;
            }
            path.pop();
        }
        verified.insert(node.id);
        Ok(())
    }

    fn stored_child_ids(&self, parent: ActionId) -> Result<Vec<ActionId>> {
        let mut seen = HashSet::new();
        Ok(store::get_edges_by_parent_ids(self.conn, &[parent])?
            .into_iter()
            .map(|e| e.child_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Binding, ChildAction};
    use crate::store::{ActionStore, EdgeRow};
    use chrono::Utc;

    struct Fixture {
        store: ActionStore,
        group: GroupId,
        shared: GroupId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = ActionStore::open_in_memory().unwrap();
            let shared = store::insert_group(store.conn(), "shared.infra").unwrap().id;
            let group = store::insert_group(store.conn(), "team").unwrap().id;
            Self {
                store,
                group,
                shared,
            }
        }

        fn action(&self, group: GroupId, name: &str, kind: ActionType) -> Action {
            let mut a = Action::new(group, name).with_kind(kind);
            a.id = store::insert_action(self.store.conn(), &a, Utc::now()).unwrap();
            a
        }

        fn edge(&self, parent: &Action, child: &Action) {
            store::insert_edge(
                self.store.conn(),
                &EdgeRow {
                    id: 0,
                    parent_id: parent.id,
                    child_id: child.id,
                    exec_order: 1,
                    binding: Binding::default(),
                },
            )
            .unwrap();
        }

        fn validator(&self) -> GraphValidator<'_> {
            GraphValidator::new(self.store.conn(), 8)
        }

        fn groups(&self) -> [GroupId; 2] {
            [self.group, self.shared]
        }
    }

    fn proposal(id: ActionId, group: GroupId, children: &[&Action]) -> Action {
        let mut a = Action::new(group, "proposal");
        a.id = id;
        for c in children {
            a.children.push(ChildAction::new((*c).clone()));
        }
        a
    }

    #[test]
    fn children_from_own_and_shared_group_are_accepted() {
        let f = Fixture::new();
        let script = f.action(f.shared, "Script", ActionType::Builtin);
        let build = f.action(f.group, "build", ActionType::Default);
        let p = proposal(0, f.group, &[&script, &build, &script]);
        let found = f.validator().check_children_exist(&p, &f.groups()).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn child_from_foreign_group_is_not_found() {
        let f = Fixture::new();
        let foreign = store::insert_group(f.store.conn(), "foreign").unwrap().id;
        let theirs = f.action(foreign, "theirs", ActionType::Default);
        let p = proposal(0, f.group, &[&theirs]);
        let err = f.validator().check_children_exist(&p, &f.groups()).unwrap_err();
        assert!(matches!(err, ActionError::ChildrenNotFound { missing } if missing == vec![theirs.id]));
    }

    #[test]
    fn plugin_child_is_not_found() {
        let f = Fixture::new();
        let plugin = f.action(f.shared, "plugin-x", ActionType::Plugin);
        let p = proposal(0, f.group, &[&plugin]);
        assert!(f.validator().check_children_exist(&p, &f.groups()).is_err());
    }

    #[test]
    fn stored_loop_below_children_is_detected() {
        let f = Fixture::new();
        let b = f.action(f.group, "b", ActionType::Default);
        let c = f.action(f.group, "c", ActionType::Default);
        f.edge(&b, &c);
        f.edge(&c, &b);
        let p = proposal(0, f.group, &[&b]);
        let err = f
            .validator()
            .check_children_exist_with_loop(&p, &f.groups())
            .unwrap_err();
        assert!(matches!(err, ActionError::GraphCycle(_)));
    }

    #[test]
    fn grandchild_out_of_scope_is_reported() {
        let f = Fixture::new();
        let foreign = store::insert_group(f.store.conn(), "foreign").unwrap().id;
        let b = f.action(f.group, "b", ActionType::Default);
        let theirs = f.action(foreign, "theirs", ActionType::Default);
        f.edge(&b, &theirs);
        let p = proposal(0, f.group, &[&b]);
        assert!(matches!(
            f.validator().check_children_exist_with_loop(&p, &f.groups()),
            Err(ActionError::ChildrenNotFound { .. })
        ));
    }

    #[test]
    fn diamond_is_not_a_loop() {
        let f = Fixture::new();
        let b = f.action(f.group, "b", ActionType::Default);
        let c = f.action(f.group, "c", ActionType::Default);
        let d = f.action(f.shared, "Script", ActionType::Builtin);
        f.edge(&b, &d);
        f.edge(&c, &d);
        let p = proposal(0, f.group, &[&b, &c]);
        assert!(f
            .validator()
            .check_children_exist_with_loop(&p, &f.groups())
            .is_ok());
    }

    #[test]
    fn deep_chain_is_capped() {
        let f = Fixture::new();
        let mut prev = f.action(f.group, "n0", ActionType::Default);
        let first = prev.clone();
        for i in 1..12 {
            let next = f.action(f.group, &format!("n{i}"), ActionType::Default);
            f.edge(&prev, &next);
            prev = next;
        }
        let p = proposal(0, f.group, &[&first]);
        assert!(matches!(
            f.validator().check_children_exist_with_loop(&p, &f.groups()),
            Err(ActionError::GraphTooDeep(8))
        ));
    }

    #[test]
    fn proposal_closing_a_loop_is_rejected() {
        let f = Fixture::new();
        let a = f.action(f.group, "a", ActionType::Default);
        let b = f.action(f.group, "b", ActionType::Default);
        f.edge(&b, &a);
        // a -> b would close a -> b -> a; the stored subgraph below b is fine
        let p = proposal(a.id, f.group, &[&b]);
        assert!(f
            .validator()
            .check_children_exist_with_loop(&p, &f.groups())
            .is_ok());
        assert!(matches!(
            f.validator().check_not_own_descendant(&p),
            Err(ActionError::GraphCycle(_))
        ));
    }

    #[test]
    fn self_child_is_rejected() {
        let f = Fixture::new();
        let a = f.action(f.group, "a", ActionType::Default);
        let p = proposal(a.id, f.group, &[&a]);
        assert!(f.validator().check_not_own_descendant(&p).is_err());
    }
}
