//! Aggregation pipeline: turns base action rows into fully materialised
//! actions.
//!
//! Each aggregator batch-fetches one kind of related row for every action in
//! the batch with a single `IN (...)` query, groups the rows by owner and
//! attaches them. The aggregators write disjoint fields (requirements,
//! parameters, children) and never read each other's output, so their order
//! in [`AGGREGATORS`] is irrelevant.
//!
//! Requirement propagation is *not* an aggregator: it reads what both the
//! requirements and children aggregators produced, so it runs as a separate
//! pass once all of them are done.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::{ActionError, Result};
use crate::loader::Loader;
use crate::model::{Action, ChildAction, Parameter};
use crate::requirement;
use crate::store::{self, ActionFilter, EdgeRow};
use crate::types::ActionId;

/// Attaches one kind of related rows to a batch. `depth` is the nesting level
/// of the batch below the action originally requested.
pub(crate) type Aggregator = fn(&Loader<'_>, &mut [Action], usize) -> Result<()>;

pub(crate) const AGGREGATORS: &[(&str, Aggregator)] = &[
    ("requirements", aggregate_requirements),
    ("parameters", aggregate_parameters),
    ("children", aggregate_children),
];

/// Runs every aggregator over `actions`, then propagates requirements.
pub(crate) fn run(loader: &Loader<'_>, actions: &mut [Action], depth: usize) -> Result<()> {
    if actions.is_empty() {
        return Ok(());
    }
    for &(name, aggregator) in AGGREGATORS {
        debug!(aggregator = name, batch = actions.len(), depth, "aggregating");
        aggregator(loader, actions, depth)?;
    }
    for action in actions.iter_mut().filter(|a| a.kind.has_children()) {
        requirement::propagate(action);
    }
    Ok(())
}

fn ids_of(actions: &[Action]) -> Vec<ActionId> {
    actions.iter().map(|a| a.id).collect()
}

fn aggregate_requirements(loader: &Loader<'_>, actions: &mut [Action], _depth: usize) -> Result<()> {
    let rows = store::get_requirements_by_action_ids(loader.conn(), &ids_of(actions))?;
    let mut by_action: HashMap<ActionId, Vec<_>> = HashMap::new();
    for r in rows {
        by_action.entry(r.action_id).or_default().push(r);
    }
    for a in actions.iter_mut() {
        if let Some(rs) = by_action.remove(&a.id) {
            a.requirements = rs;
        }
    }
    Ok(())
}

fn aggregate_parameters(loader: &Loader<'_>, actions: &mut [Action], _depth: usize) -> Result<()> {
    let rows = store::get_parameters_by_action_ids(loader.conn(), &ids_of(actions))?;
    let mut by_action: HashMap<ActionId, Vec<Parameter>> = HashMap::new();
    for (id, p) in rows {
        by_action.entry(id).or_default().push(p);
    }
    for a in actions.iter_mut() {
        if let Some(ps) = by_action.remove(&a.id) {
            a.parameters = ps;
        }
    }
    Ok(())
}

fn aggregate_children(loader: &Loader<'_>, actions: &mut [Action], depth: usize) -> Result<()> {
    // builtins are leaves
    let parent_ids: Vec<ActionId> = actions
        .iter()
        .filter(|a| a.kind.has_children())
        .map(|a| a.id)
        .collect();
    if parent_ids.is_empty() {
        return Ok(());
    }

    let edges = store::get_edges_by_parent_ids(loader.conn(), &parent_ids)?;
    if edges.is_empty() {
        return Ok(());
    }
    if depth + 1 > loader.max_depth() {
        warn!(depth, "child resolution exceeded the configured depth");
        return Err(ActionError::GraphTooDeep(loader.max_depth()));
    }

    let overrides = edge_parameters(loader.conn(), &edges)?;
    let children = canonical_children(loader, &edges, depth + 1)?;

    let mut by_parent: HashMap<ActionId, Vec<ChildAction>> = HashMap::new();
    for edge in &edges {
        let Some(child) = children.get(&edge.child_id) else {
            warn!(
                parent = edge.parent_id,
                child = edge.child_id,
                "edge points at a missing action"
            );
            continue;
        };
        let params = overrides.get(&edge.id).map(Vec::as_slice).unwrap_or(&[]);
        by_parent
            .entry(edge.parent_id)
            .or_default()
            .push(bind(child, edge, params));
    }

    for a in actions.iter_mut() {
        if let Some(cs) = by_parent.remove(&a.id) {
            a.children = cs;
        }
    }
    Ok(())
}

fn edge_parameters(conn: &Connection, edges: &[EdgeRow]) -> Result<HashMap<i64, Vec<Parameter>>> {
    let ids: Vec<i64> = edges.iter().map(|e| e.id).collect();
    let mut by_edge: HashMap<i64, Vec<Parameter>> = HashMap::new();
    for (edge_id, p) in store::get_edge_parameters_by_edge_ids(conn, &ids)? {
        by_edge.entry(edge_id).or_default().push(p);
    }
    Ok(by_edge)
}

/// Loads every distinct child of `edges`, itself fully aggregated.
fn canonical_children(
    loader: &Loader<'_>,
    edges: &[EdgeRow],
    depth: usize,
) -> Result<HashMap<ActionId, Action>> {
    let mut ids: Vec<ActionId> = edges.iter().map(|e| e.child_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let children = loader.load_many_at(&ids, ActionFilter::default(), depth)?;
    Ok(children.into_iter().map(|c| (c.id, c)).collect())
}

/// Produces the bound instance of `child` for `edge`: the binding comes from
/// the edge, and each of the child's parameters takes the edge override of
/// the same name when there is one.
pub(crate) fn bind(child: &Action, edge: &EdgeRow, overrides: &[Parameter]) -> ChildAction {
    let mut action = child.clone();
    for p in action.parameters.iter_mut() {
        if let Some(o) = overrides.iter().find(|o| o.name == p.name) {
            p.value = o.value.clone();
        }
    }
    ChildAction {
        action,
        binding: edge.binding.clone(),
    }
}
