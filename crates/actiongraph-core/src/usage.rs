//! Reverse lookups: who references an action. Gates deletion and feeds the
//! usage report.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ActionId, GroupId};

/// A pipeline job referencing an action, either as the job's own action or
/// as one of its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePipeline {
    pub project_key: String,
    pub project_name: String,
    pub pipeline_name: String,
    pub stage_name: String,
    pub job_id: i64,
    pub job_name: String,
    pub action_id: ActionId,
    pub action_name: String,
    /// The job belongs to a group that is neither the action's group nor
    /// the shared group.
    pub warning: bool,
}

/// A parent action holding an edge to the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAction {
    pub parent_action_id: ActionId,
    pub parent_action_name: String,
    pub action_id: ActionId,
    pub action_name: String,
    pub warning: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub pipelines: Vec<UsagePipeline>,
    pub actions: Vec<UsageAction>,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty() && self.actions.is_empty()
    }
}

pub struct UsageIndex<'c> {
    conn: &'c Connection,
    shared_group_id: GroupId,
}

impl<'c> UsageIndex<'c> {
    pub fn new(conn: &'c Connection, shared_group_id: GroupId) -> Self {
        Self {
            conn,
            shared_group_id,
        }
    }

    /// True while a pipeline job or another action's edge points at `id`.
    pub fn used(&self, id: ActionId) -> Result<bool> {
        let used: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM pipeline_job WHERE action_id = ?1) \
                 OR EXISTS (SELECT 1 FROM action_edge WHERE child_id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(used)
    }

    pub fn pipeline_usages(&self, id: ActionId) -> Result<Vec<UsagePipeline>> {
        let mut stmt = self.conn.prepare(
            "SELECT job.project_key, job.project_name, job.pipeline_name, job.stage_name, \
                    job.id, job.name, action.id, action.name, \
                    CASE WHEN job.group_id = action.group_id OR action.group_id = ?1 \
                         THEN 0 ELSE 1 END \
             FROM action \
             JOIN (SELECT id, project_key, project_name, pipeline_name, stage_name, \
                          job_name AS name, group_id, action_id FROM pipeline_job) AS job \
               ON job.action_id = action.id \
               OR job.action_id IN (SELECT parent_id FROM action_edge WHERE child_id = action.id) \
             WHERE action.id = ?2 \
             ORDER BY job.project_key, job.pipeline_name, job.name, job.id",
        )?;
        let rows = stmt
            .query_map(params![self.shared_group_id, id], |row| {
                Ok(UsagePipeline {
                    project_key: row.get(0)?,
                    project_name: row.get(1)?,
                    pipeline_name: row.get(2)?,
                    stage_name: row.get(3)?,
                    job_id: row.get(4)?,
                    job_name: row.get(5)?,
                    action_id: row.get(6)?,
                    action_name: row.get(7)?,
                    warning: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn action_usages(&self, id: ActionId) -> Result<Vec<UsageAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT parent.id, parent.name, action.id, action.name, \
                    CASE WHEN action.group_id = parent.group_id OR action.group_id = ?1 \
                         THEN 0 ELSE 1 END \
             FROM action \
             JOIN action_edge ON action_edge.child_id = action.id \
             JOIN action AS parent ON parent.id = action_edge.parent_id \
             WHERE action.id = ?2 \
             ORDER BY parent.name, parent.id",
        )?;
        let rows = stmt
            .query_map(params![self.shared_group_id, id], |row| {
                Ok(UsageAction {
                    parent_action_id: row.get(0)?,
                    parent_action_name: row.get(1)?,
                    action_id: row.get(2)?,
                    action_name: row.get(3)?,
                    warning: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn usage(&self, id: ActionId) -> Result<Usage> {
        Ok(Usage {
            pipelines: self.pipeline_usages(id)?,
            actions: self.action_usages(id)?,
        })
    }
}
