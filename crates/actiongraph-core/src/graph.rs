//! [`ActionGraph`]: the entry point. Owns the store, the configuration and
//! the event sink, and runs every mutation in its own transaction.

use std::path::Path;

use tracing::{debug, info};

use crate::audit;
use crate::config::{EngineConfig, WarnLevel};
use crate::engine::CompositionEngine;
use crate::error::{ActionError, Result};
use crate::event::{ActionEvent, EventSink, NoopSink};
use crate::export::{self, Format};
use crate::loader::Loader;
use crate::model::{Action, ActionAudit, Group, Requirement};
use crate::paths;
use crate::store::{self, ActionStore, PipelineJob};
use crate::types::{ActionId, GroupId, UserId};
use crate::usage::{Usage, UsageAction, UsageIndex, UsagePipeline};

pub struct ActionGraph {
    store: ActionStore,
    config: EngineConfig,
    shared_group: Group,
    events: Box<dyn EventSink>,
}

impl ActionGraph {
    /// Writes a default config under `root` unless one exists, then opens.
    pub fn init(root: &Path) -> Result<Self> {
        if !paths::config_path(root).exists() {
            EngineConfig::default().save(root)?;
            info!(root = %root.display(), "initialized action graph");
        }
        Self::open(root)
    }

    /// Refuses a configuration with error-level warnings before touching the
    /// database.
    pub fn open(root: &Path) -> Result<Self> {
        let config = EngineConfig::load(root)?;
        check_config(&config)?;
        let store = ActionStore::open(&config.database_path(root))?;
        Self::with_store(store, config)
    }

    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        check_config(&config)?;
        Self::with_store(ActionStore::open_in_memory()?, config)
    }

    fn with_store(store: ActionStore, config: EngineConfig) -> Result<Self> {
        let shared_group = match store::get_group_by_name(store.conn(), &config.shared_group)? {
            Some(g) => g,
            None => {
                debug!(name = %config.shared_group, "creating shared group");
                store::insert_group(store.conn(), &config.shared_group)?
            }
        };
        Ok(Self {
            store,
            config,
            shared_group,
            events: Box::new(NoopSink),
        })
    }

    pub fn with_events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Box::new(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared_group(&self) -> &Group {
        &self.shared_group
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(self.store.conn(), self.config.max_graph_depth)
    }

    fn usage_index(&self) -> UsageIndex<'_> {
        UsageIndex::new(self.store.conn(), self.shared_group.id)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn insert(&mut self, action: &Action, user_id: UserId) -> Result<Action> {
        let (shared, depth) = (self.shared_group.id, self.config.max_graph_depth);
        let tx = self.store.transaction()?;
        let stored = CompositionEngine::new(&tx, shared, depth).insert(action)?;
        tx.commit()?;

        info!(action = stored.id, name = %stored.name, "action inserted");
        self.events.publish(&ActionEvent::Added {
            action: stored.clone(),
            user_id,
        });
        Ok(stored)
    }

    pub fn update(&mut self, action: &Action, user_id: UserId) -> Result<Action> {
        let (shared, depth) = (self.shared_group.id, self.config.max_graph_depth);
        let tx = self.store.transaction()?;
        let (before, after) = CompositionEngine::new(&tx, shared, depth).update(action, user_id)?;
        tx.commit()?;

        info!(action = after.id, name = %after.name, user = user_id, "action updated");
        self.events.publish(&ActionEvent::Updated {
            before,
            after: after.clone(),
            user_id,
        });
        Ok(after)
    }

    pub fn delete(&mut self, id: ActionId, user_id: UserId) -> Result<()> {
        let (shared, depth) = (self.shared_group.id, self.config.max_graph_depth);
        let tx = self.store.transaction()?;
        let removed = CompositionEngine::new(&tx, shared, depth).delete(id, user_id)?;
        tx.commit()?;

        info!(action = id, name = %removed.name, user = user_id, "action deleted");
        self.events.publish(&ActionEvent::Deleted {
            action: removed,
            user_id,
        });
        Ok(())
    }

    /// Registers a platform-owned Builtin or Plugin action.
    pub fn seed(&mut self, action: &Action) -> Result<Action> {
        let (shared, depth) = (self.shared_group.id, self.config.max_graph_depth);
        let tx = self.store.transaction()?;
        let stored = CompositionEngine::new(&tx, shared, depth).seed(action)?;
        tx.commit()?;
        info!(action = stored.id, name = %stored.name, kind = %stored.kind, "action seeded");
        Ok(stored)
    }

    /// Rewrites the value of every `kind` requirement equal to `old`.
    /// Returns the ids of the affected actions.
    pub fn update_requirements_value(
        &mut self,
        old: &str,
        new: &str,
        kind: &str,
    ) -> Result<Vec<ActionId>> {
        if new.is_empty() {
            return Err(ActionError::InvalidRequirement(
                "new requirement value must not be empty".into(),
            ));
        }
        let tx = self.store.transaction()?;
        let ids = store::update_requirements_value(&tx, old, new, kind)?;
        tx.commit()?;
        info!(old, new, kind, actions = ids.len(), "requirement value renamed");
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn load_by_id(&self, id: ActionId) -> Result<Action> {
        self.loader().load_by_id(id)
    }

    pub fn load_by_name(&self, name: &str) -> Result<Action> {
        self.loader().load_by_name(name)
    }

    pub fn load_by_name_and_group(&self, name: &str, group_id: GroupId) -> Result<Action> {
        self.loader().load_by_name_and_group(name, group_id)
    }

    pub fn load_all_for_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Action>> {
        self.loader().load_all_for_groups(group_ids)
    }

    pub fn load_all(&self) -> Result<Vec<Action>> {
        self.loader().load_all()
    }

    pub fn used(&self, id: ActionId) -> Result<bool> {
        self.usage_index().used(id)
    }

    pub fn pipeline_usages(&self, id: ActionId) -> Result<Vec<UsagePipeline>> {
        self.usage_index().pipeline_usages(id)
    }

    pub fn action_usages(&self, id: ActionId) -> Result<Vec<UsageAction>> {
        self.usage_index().action_usages(id)
    }

    pub fn usage(&self, id: ActionId) -> Result<Usage> {
        self.usage_index().usage(id)
    }

    pub fn audits(&self, id: ActionId) -> Result<Vec<ActionAudit>> {
        audit::history(self.store.conn(), id)
    }

    pub fn export(&self, group_id: GroupId, name: &str, format: Format) -> Result<Vec<u8>> {
        let action = self.load_by_name_and_group(name, group_id)?;
        export::export_action(&action, format)
    }

    pub fn requirements_distinct_binary(&self) -> Result<Vec<Requirement>> {
        store::get_requirements_distinct_binary(self.store.conn())
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn create_group(&mut self, name: &str) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::InvalidInput("group name is required".into()));
        }
        if store::get_group_by_name(self.store.conn(), name)?.is_some() {
            return Err(ActionError::GroupExists(name.to_string()));
        }
        let group = store::insert_group(self.store.conn(), name)?;
        info!(group = group.id, name = %group.name, "group created");
        Ok(group)
    }

    pub fn group_by_name(&self, name: &str) -> Result<Group> {
        store::get_group_by_name(self.store.conn(), name)?
            .ok_or_else(|| ActionError::GroupNotFound(name.to_string()))
    }

    pub fn group_by_id(&self, id: GroupId) -> Result<Group> {
        store::get_group_by_id(self.store.conn(), id)?
            .ok_or_else(|| ActionError::GroupNotFound(id.to_string()))
    }

    pub fn groups(&self) -> Result<Vec<Group>> {
        store::get_groups(self.store.conn())
    }

    // -----------------------------------------------------------------------
    // Pipeline jobs
    // -----------------------------------------------------------------------

    pub fn add_pipeline_job(&mut self, job: &PipelineJob) -> Result<i64> {
        self.group_by_id(job.group_id)?;
        if store::get_action(self.store.conn(), job.action_id)?.is_none() {
            return Err(ActionError::ActionNotFound(job.action_id.to_string()));
        }
        let id = store::insert_pipeline_job(self.store.conn(), job)?;
        info!(job = id, action = job.action_id, name = %job.job_name, "pipeline job added");
        Ok(id)
    }

    /// Returns false when there was no such job.
    pub fn remove_pipeline_job(&mut self, id: i64) -> Result<bool> {
        let removed = store::delete_pipeline_job(self.store.conn(), id)?;
        if removed {
            info!(job = id, "pipeline job removed");
        }
        Ok(removed)
    }
}

fn check_config(config: &EngineConfig) -> Result<()> {
    match config
        .validate()
        .into_iter()
        .find(|w| w.level == WarnLevel::Error)
    {
        Some(w) => Err(ActionError::InvalidConfig(w.message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildAction, Parameter};
    use crate::types::ActionType;
    use tempfile::TempDir;

    #[test]
    fn open_without_init_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ActionGraph::open(dir.path()),
            Err(ActionError::NotInitialized)
        ));
    }

    #[test]
    fn init_creates_config_db_and_shared_group() {
        let dir = TempDir::new().unwrap();
        let graph = ActionGraph::init(dir.path()).unwrap();
        assert_eq!(graph.shared_group().name, "shared.infra");
        assert!(dir.path().join(".actiongraph/config.yaml").exists());
        assert!(dir.path().join(".actiongraph/actions.db").exists());

        let shared_id = graph.shared_group().id;
        drop(graph);
        let again = ActionGraph::init(dir.path()).unwrap();
        assert_eq!(again.shared_group().id, shared_id);
        assert_eq!(again.groups().unwrap().len(), 1);
    }

    #[test]
    fn open_refuses_config_with_errors() {
        let dir = TempDir::new().unwrap();
        drop(ActionGraph::init(dir.path()).unwrap());
        EngineConfig {
            max_graph_depth: 0,
            ..EngineConfig::default()
        }
        .save(dir.path())
        .unwrap();
        let err = ActionGraph::open(dir.path()).err().unwrap();
        assert!(matches!(err, ActionError::InvalidConfig(ref m) if m.contains("max_graph_depth")));

        let blank = EngineConfig {
            shared_group: " ".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            ActionGraph::in_memory(blank),
            Err(ActionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reorder_rewrites_edges_densely() {
        let mut graph = ActionGraph::in_memory(EngineConfig::default()).unwrap();
        let shared = graph.shared_group().id;
        let team = graph.create_group("team").unwrap();
        let b = graph
            .seed(
                &Action::new(shared, "B")
                    .with_kind(ActionType::Builtin)
                    .with_parameter(Parameter::new("branch", "string", "main")),
            )
            .unwrap();
        let c = graph
            .seed(&Action::new(shared, "C").with_kind(ActionType::Builtin))
            .unwrap();

        let mut b_child = ChildAction::new(b.clone());
        b_child.action.parameters[0].value = "release".into();
        let mut a = graph
            .insert(
                &Action::new(team.id, "A")
                    .with_child(b_child)
                    .with_child(ChildAction::new(c.clone())),
                1,
            )
            .unwrap();

        let conn = graph.store.conn();
        let before = store::get_edges_by_parent_ids(conn, &[a.id]).unwrap();
        let positions: Vec<_> = before.iter().map(|e| (e.child_id, e.exec_order)).collect();
        assert_eq!(positions, vec![(b.id, 1), (c.id, 2)]);
        let old_ids: Vec<i64> = before.iter().map(|e| e.id).collect();
        assert_eq!(
            store::get_edge_parameters_by_edge_ids(conn, &old_ids)
                .unwrap()
                .len(),
            1
        );

        a.children.reverse();
        graph.update(&a, 1).unwrap();

        let conn = graph.store.conn();
        let after = store::get_edges_by_parent_ids(conn, &[a.id]).unwrap();
        let positions: Vec<_> = after.iter().map(|e| (e.child_id, e.exec_order)).collect();
        assert_eq!(positions, vec![(c.id, 1), (b.id, 2)]);
        assert!(after.iter().all(|e| !old_ids.contains(&e.id)));
        assert!(store::get_edge_parameters_by_edge_ids(conn, &old_ids)
            .unwrap()
            .is_empty());

        let overrides = store::get_edge_parameters_by_edge_ids(conn, &[after[1].id]).unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].1.value, "release");
    }

    #[test]
    fn duplicate_group_is_conflict() {
        let mut graph = ActionGraph::in_memory(EngineConfig::default()).unwrap();
        graph.create_group("team").unwrap();
        let err = graph.create_group("team").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn failed_insert_leaves_nothing_behind() {
        let mut graph = ActionGraph::in_memory(EngineConfig::default()).unwrap();
        let team = graph.create_group("team").unwrap();
        let a = Action::new(team.id, "A")
            .with_requirement(Requirement::new("os", "model", "debian"))
            .with_requirement(Requirement::new("os", "model", "ubuntu"));
        assert!(graph.insert(&a, 1).is_err());
        assert!(graph.load_all().unwrap().is_empty());
    }

    #[test]
    fn pipeline_job_needs_existing_action() {
        let mut graph = ActionGraph::in_memory(EngineConfig::default()).unwrap();
        let team = graph.create_group("team").unwrap();
        let job = PipelineJob {
            id: 0,
            project_key: "P".into(),
            project_name: "P".into(),
            pipeline_name: "p".into(),
            stage_name: "s".into(),
            job_name: "j".into(),
            group_id: team.id,
            action_id: 404,
        };
        assert!(graph.add_pipeline_job(&job).unwrap_err().is_not_found());
    }
}
