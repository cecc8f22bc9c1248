use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, Result};
use crate::model::{Action, Binding, Group, Parameter, Requirement};
use crate::types::{ActionId, ActionType, GroupId, UserId, BINARY_REQUIREMENT, SECRET_PARAMETER};

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

impl ToSql for ActionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ActionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: ActionError| FromSqlError::Other(Box::new(e)))
    }
}

const ACTION_COLUMNS: &str =
    "action.id, action.group_id, action.name, action.type, action.description, \
     action.enabled, action.deprecated, action.last_modified";

/// Only these types may be referenced as children or looked up by name.
const COMPOSABLE_TYPES: &str = "action.type IN ('Builtin', 'Default')";

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<Action> {
    Ok(Action {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        description: row.get(4)?,
        enabled: row.get(5)?,
        deprecated: row.get(6)?,
        requirements: Vec::new(),
        parameters: Vec::new(),
        children: Vec::new(),
        last_modified: row.get(7)?,
    })
}

fn parameter_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Parameter> {
    Ok(Parameter {
        name: row.get(offset)?,
        kind: row.get(offset + 1)?,
        value: row.get(offset + 2)?,
        description: row.get(offset + 3)?,
        advanced: row.get(offset + 4)?,
    })
}

/// `?, ?, ?` for an `IN (...)` clause of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Restricts a batch read by ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFilter<'a> {
    /// Keep only actions owned by one of these groups.
    pub group_ids: Option<&'a [GroupId]>,
    /// Keep only `Builtin` and `Default` actions.
    pub composable_only: bool,
}

impl<'a> ActionFilter<'a> {
    pub fn composable_in(group_ids: &'a [GroupId]) -> Self {
        Self {
            group_ids: Some(group_ids),
            composable_only: true,
        }
    }
}

/// Insert the base row and return its id. A duplicate name inside the group
/// is reported as [`ActionError::ActionExists`].
pub fn insert_action(conn: &Connection, a: &Action, now: DateTime<Utc>) -> Result<ActionId> {
    let res = conn.execute(
        "INSERT INTO action (group_id, name, type, description, enabled, deprecated, last_modified) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![a.group_id, a.name, a.kind, a.description, a.enabled, a.deprecated, now],
    );
    match res {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(action_exists(conn, a)),
        Err(e) => Err(e.into()),
    }
}

/// Conflict error naming the group, falling back to its id when the name
/// can not be read.
fn action_exists(conn: &Connection, a: &Action) -> ActionError {
    let group = conn
        .query_row(
            "SELECT name FROM action_group WHERE id = ?1",
            params![a.group_id],
            |row| row.get::<_, String>(0),
        )
        .unwrap_or_else(|_| format!("#{}", a.group_id));
    ActionError::ActionExists {
        name: a.name.clone(),
        group,
    }
}

/// Update the mutable scalar fields of the base row.
pub fn update_action(conn: &Connection, a: &Action, now: DateTime<Utc>) -> Result<()> {
    let res = conn.execute(
        "UPDATE action SET name = ?1, description = ?2, type = ?3, enabled = ?4, \
         deprecated = ?5, last_modified = ?6 WHERE id = ?7",
        params![a.name, a.description, a.kind, a.enabled, a.deprecated, now, a.id],
    );
    match res {
        Ok(0) => Err(ActionError::ActionNotFound(a.id.to_string())),
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(action_exists(conn, a)),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_action(conn: &Connection, id: ActionId) -> Result<()> {
    conn.execute("DELETE FROM action WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get_action(conn: &Connection, id: ActionId) -> Result<Option<Action>> {
    let sql = format!("SELECT {ACTION_COLUMNS} FROM action WHERE action.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], action_from_row)
        .optional()?)
}

/// Composable action with `name` (case-insensitive) owned by `group_id`.
/// A Default action shadows builtins of the same name; among builtins the
/// oldest wins.
pub fn get_action_by_name_and_group(
    conn: &Connection,
    name: &str,
    group_id: GroupId,
) -> Result<Option<Action>> {
    let sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action \
         WHERE lower(action.name) = lower(?1) AND action.group_id = ?2 AND {COMPOSABLE_TYPES} \
         ORDER BY action.type = 'Default' DESC, action.id LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![name, group_id], action_from_row)
        .optional()?)
}

/// The Default action holding `name` (case-insensitive) in `group_id`: the
/// one the unique name index guards.
pub fn get_default_action_by_name_and_group(
    conn: &Connection,
    name: &str,
    group_id: GroupId,
) -> Result<Option<Action>> {
    let sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action \
         WHERE lower(action.name) = lower(?1) AND action.group_id = ?2 \
           AND action.type = 'Default'"
    );
    Ok(conn
        .query_row(&sql, params![name, group_id], action_from_row)
        .optional()?)
}

/// Composable actions named `name` (case-insensitive), across all groups.
pub fn get_actions_by_name(conn: &Connection, name: &str) -> Result<Vec<Action>> {
    let sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action \
         WHERE lower(action.name) = lower(?1) AND {COMPOSABLE_TYPES} ORDER BY action.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![name], action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Batch read by ids, one query.
pub fn get_actions_by_ids(
    conn: &Connection,
    ids: &[ActionId],
    filter: ActionFilter<'_>,
) -> Result<Vec<Action>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action WHERE action.id IN ({})",
        placeholders(ids.len())
    );
    let mut values: Vec<i64> = ids.to_vec();
    if let Some(groups) = filter.group_ids {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        sql.push_str(&format!(" AND action.group_id IN ({})", placeholders(groups.len())));
        values.extend_from_slice(groups);
    }
    if filter.composable_only {
        sql.push_str(&format!(" AND {COMPOSABLE_TYPES}"));
    }
    sql.push_str(" ORDER BY action.name, action.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Composable actions owned by any of `group_ids`.
pub fn get_actions_for_groups(conn: &Connection, group_ids: &[GroupId]) -> Result<Vec<Action>> {
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action \
         WHERE action.group_id IN ({}) AND {COMPOSABLE_TYPES} ORDER BY action.name, action.id",
        placeholders(group_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(group_ids.iter()), action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Every composable action, regardless of group.
pub fn get_all_actions(conn: &Connection) -> Result<Vec<Action>> {
    let sql = format!(
        "SELECT {ACTION_COLUMNS} FROM action WHERE {COMPOSABLE_TYPES} ORDER BY action.name, action.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

pub fn get_requirements_by_action_ids(
    conn: &Connection,
    ids: &[ActionId],
) -> Result<Vec<Requirement>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT action_id, name, type, value FROM action_requirement \
         WHERE action_id IN ({}) ORDER BY name, type, value",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(Requirement {
                action_id: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                value: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_requirement(conn: &Connection, r: &Requirement) -> Result<()> {
    crate::requirement::check_row(r)?;
    conn.execute(
        "INSERT INTO action_requirement (action_id, name, type, value) VALUES (?1, ?2, ?3, ?4)",
        params![r.action_id, r.name, r.kind, r.value],
    )?;
    Ok(())
}

pub fn delete_requirements_by_action_id(conn: &Connection, id: ActionId) -> Result<()> {
    conn.execute(
        "DELETE FROM action_requirement WHERE action_id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Every distinct binary requirement value, denormalised so that name and
/// value are equal.
pub fn get_requirements_distinct_binary(conn: &Connection) -> Result<Vec<Requirement>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT value FROM action_requirement WHERE type = ?1 ORDER BY value",
    )?;
    let rows = stmt
        .query_map(params![BINARY_REQUIREMENT], |row| {
            let value: String = row.get(0)?;
            Ok(Requirement::new(value.clone(), BINARY_REQUIREMENT, value))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Rewrite every requirement of type `kind` valued `old` to `new`; returns
/// the ids of the touched actions.
pub fn update_requirements_value(
    conn: &Connection,
    old: &str,
    new: &str,
    kind: &str,
) -> Result<Vec<ActionId>> {
    let mut stmt = conn.prepare(
        "UPDATE action_requirement SET value = ?1 WHERE value = ?2 AND type = ?3 RETURNING action_id",
    )?;
    let mut ids = stmt
        .query_map(params![new, old, kind], |row| row.get::<_, ActionId>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

pub fn get_parameters_by_action_ids(
    conn: &Connection,
    ids: &[ActionId],
) -> Result<Vec<(ActionId, Parameter)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT action_id, name, type, value, description, advanced FROM action_parameter \
         WHERE action_id IN ({}) ORDER BY name",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get(0)?, parameter_from_row(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Secrets are managed elsewhere and are never stored as parameters.
pub fn insert_parameter(conn: &Connection, action_id: ActionId, p: &Parameter) -> Result<()> {
    if p.kind == SECRET_PARAMETER {
        return Err(ActionError::SecretParameter(p.name.clone()));
    }
    let res = conn.execute(
        "INSERT INTO action_parameter (action_id, name, type, value, description, advanced) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![action_id, p.name, p.kind, p.value, p.description, p.advanced],
    );
    match res {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(ActionError::DuplicateParameter(p.name.clone())),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_parameters_by_action_id(conn: &Connection, id: ActionId) -> Result<()> {
    conn.execute(
        "DELETE FROM action_parameter WHERE action_id = ?1",
        params![id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub id: i64,
    pub parent_id: ActionId,
    pub child_id: ActionId,
    /// 1-based position of the child in the parent's list.
    pub exec_order: i64,
    pub binding: Binding,
}

/// Edges of all `parent_ids`, ordered by parent then execution order.
pub fn get_edges_by_parent_ids(conn: &Connection, parent_ids: &[ActionId]) -> Result<Vec<EdgeRow>> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, parent_id, child_id, exec_order, enabled, optional, always_executed, step_name \
         FROM action_edge WHERE parent_id IN ({}) ORDER BY parent_id, exec_order ASC",
        placeholders(parent_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(parent_ids.iter()), |row| {
            Ok(EdgeRow {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                child_id: row.get(2)?,
                exec_order: row.get(3)?,
                binding: Binding {
                    enabled: row.get(4)?,
                    optional: row.get(5)?,
                    always_executed: row.get(6)?,
                    step_name: row.get(7)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_edge(conn: &Connection, e: &EdgeRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO action_edge \
         (parent_id, child_id, exec_order, enabled, optional, always_executed, step_name) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            e.parent_id,
            e.child_id,
            e.exec_order,
            e.binding.enabled,
            e.binding.optional,
            e.binding.always_executed,
            e.binding.step_name,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Removes the edges of `parent_id`; their parameter overrides cascade.
pub fn delete_edges_by_parent_id(conn: &Connection, parent_id: ActionId) -> Result<()> {
    conn.execute(
        "DELETE FROM action_edge WHERE parent_id = ?1",
        params![parent_id],
    )?;
    Ok(())
}

pub fn get_edge_parameters_by_edge_ids(
    conn: &Connection,
    edge_ids: &[i64],
) -> Result<Vec<(i64, Parameter)>> {
    if edge_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT action_edge_id, name, type, value, description, advanced FROM action_edge_parameter \
         WHERE action_edge_id IN ({}) ORDER BY name",
        placeholders(edge_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(edge_ids.iter()), |row| {
            Ok((row.get(0)?, parameter_from_row(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_edge_parameter(conn: &Connection, edge_id: i64, p: &Parameter) -> Result<()> {
    conn.execute(
        "INSERT INTO action_edge_parameter (action_edge_id, name, type, value, description, advanced) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![edge_id, p.name, p.kind, p.value, p.description, p.advanced],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub action_id: ActionId,
    pub user_id: UserId,
    pub change: String,
    pub versioned: DateTime<Utc>,
    pub action_json: String,
}

pub fn insert_audit(conn: &Connection, row: &AuditRow) -> Result<()> {
    conn.execute(
        "INSERT INTO action_audit (action_id, user_id, change, versioned, action_json) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.action_id,
            row.user_id,
            row.change,
            row.versioned,
            row.action_json
        ],
    )?;
    Ok(())
}

/// Audit rows of one action, newest first.
pub fn get_audits(conn: &Connection, action_id: ActionId) -> Result<Vec<AuditRow>> {
    let mut stmt = conn.prepare(
        "SELECT action_id, user_id, change, versioned, action_json FROM action_audit \
         WHERE action_id = ?1 ORDER BY versioned DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![action_id], |row| {
            Ok(AuditRow {
                action_id: row.get(0)?,
                user_id: row.get(1)?,
                change: row.get(2)?,
                versioned: row.get(3)?,
                action_json: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub fn insert_group(conn: &Connection, name: &str) -> Result<Group> {
    conn.execute("INSERT INTO action_group (name) VALUES (?1)", params![name])?;
    Ok(Group {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn get_group_by_id(conn: &Connection, id: GroupId) -> Result<Option<Group>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM action_group WHERE id = ?1",
            params![id],
            group_from_row,
        )
        .optional()?)
}

pub fn get_group_by_name(conn: &Connection, name: &str) -> Result<Option<Group>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM action_group WHERE name = ?1",
            params![name],
            group_from_row,
        )
        .optional()?)
}

pub fn get_groups(conn: &Connection) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare("SELECT id, name FROM action_group ORDER BY name")?;
    let rows = stmt
        .query_map([], group_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Pipeline jobs
// ---------------------------------------------------------------------------

/// A pipeline job whose steps are the children of `action_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    #[serde(default)]
    pub id: i64,
    pub project_key: String,
    pub project_name: String,
    pub pipeline_name: String,
    pub stage_name: String,
    pub job_name: String,
    pub group_id: GroupId,
    pub action_id: ActionId,
}

pub fn insert_pipeline_job(conn: &Connection, job: &PipelineJob) -> Result<i64> {
    conn.execute(
        "INSERT INTO pipeline_job \
         (project_key, project_name, pipeline_name, stage_name, job_name, group_id, action_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            job.project_key,
            job.project_name,
            job.pipeline_name,
            job.stage_name,
            job.job_name,
            job.group_id,
            job.action_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns false when no job had that id.
pub fn delete_pipeline_job(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM pipeline_job WHERE id = ?1", params![id])?;
    Ok(n > 0)
}
