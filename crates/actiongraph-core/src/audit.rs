//! Append-only change history. Each record holds the action as it was right
//! before the change.

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;
use crate::loader::Loader;
use crate::model::{Action, ActionAudit};
use crate::store::{self, AuditRow};
use crate::types::{ActionId, UserId};

pub const CHANGE_UPDATE: &str = "action update";
pub const CHANGE_DELETE: &str = "action delete";

/// Snapshots the persisted state of `action_id` and appends it to the
/// history. Fails with `ActionNotFound` when there is nothing to snapshot.
/// Returns the snapshot.
pub fn record(
    loader: &Loader<'_>,
    action_id: ActionId,
    user_id: UserId,
    change: &str,
) -> Result<Action> {
    let current = loader.load_by_id(action_id)?;
    store::insert_audit(
        loader.conn(),
        &AuditRow {
            action_id,
            user_id,
            change: change.to_string(),
            versioned: Utc::now(),
            action_json: serde_json::to_string(&current)?,
        },
    )?;
    Ok(current)
}

/// History of `action_id`, newest first. Still available after the action
/// itself was deleted.
pub fn history(conn: &Connection, action_id: ActionId) -> Result<Vec<ActionAudit>> {
    store::get_audits(conn, action_id)?
        .into_iter()
        .map(|row| {
            Ok(ActionAudit {
                action_id: row.action_id,
                user_id: row.user_id,
                change: row.change,
                versioned: row.versioned,
                action: serde_json::from_str(&row.action_json)?,
            })
        })
        .collect()
}
