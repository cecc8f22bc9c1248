//! YAML action documents. Children are named rather than numbered; they are
//! resolved against the graph before the action reaches the engine.
//!
//! ```yaml
//! name: build
//! group: team
//! requirements:
//!   - { name: docker, type: binary, value: docker }
//! parameters:
//!   - { name: target, type: string, value: all }
//! children:
//!   - name: GitClone
//!     step_name: checkout
//!     parameters:
//!       - { name: branch, value: release }
//!   - name: Script
//!     group: shared.infra
//!     always_executed: true
//! ```

use actiongraph_core::{
    Action, ActionGraph, ActionType, Binding, ChildAction, Group, Parameter, Requirement,
};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionFile {
    pub name: String,
    pub group: String,
    #[serde(rename = "type", default)]
    pub kind: ActionType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildRef {
    pub name: String,
    /// Owning group; when omitted the parent's group is tried, then the
    /// shared group.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub always_executed: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides by name; only `value` matters.
    #[serde(default)]
    pub parameters: Vec<ParameterOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterOverride {
    pub name: String,
    pub value: String,
}

impl ActionFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&data).with_context(|| format!("invalid action file {}", path.display()))
    }

    /// Builds the engine input: group and children resolved to ids, child
    /// parameter overrides applied on top of each child's declared defaults.
    pub fn resolve(&self, graph: &ActionGraph) -> anyhow::Result<Action> {
        let group = graph.group_by_name(&self.group)?;
        let mut action = Action::new(group.id, self.name.clone()).with_kind(self.kind);
        action.description = self.description.clone();
        action.enabled = self.enabled;
        action.deprecated = self.deprecated;
        action.requirements = self.requirements.clone();
        action.parameters = self.parameters.clone();

        for child in &self.children {
            action.children.push(child.resolve(graph, &group)?);
        }
        Ok(action)
    }
}

impl ChildRef {
    fn resolve(&self, graph: &ActionGraph, parent_group: &Group) -> anyhow::Result<ChildAction> {
        let mut canonical = match &self.group {
            Some(name) => {
                let group = graph.group_by_name(name)?;
                graph.load_by_name_and_group(&self.name, group.id)
            }
            None => graph
                .load_by_name_and_group(&self.name, parent_group.id)
                .or_else(|_| graph.load_by_name_and_group(&self.name, graph.shared_group().id)),
        }
        .with_context(|| format!("child '{}' not found", self.name))?;

        for o in &self.parameters {
            match canonical.parameters.iter_mut().find(|p| p.name == o.name) {
                Some(p) => p.value = o.value.clone(),
                None => bail!("child '{}' has no parameter '{}'", self.name, o.name),
            }
        }

        Ok(ChildAction::new(canonical).with_binding(Binding {
            step_name: self.step_name.clone(),
            optional: self.optional,
            always_executed: self.always_executed,
            enabled: self.enabled,
        }))
    }
}
