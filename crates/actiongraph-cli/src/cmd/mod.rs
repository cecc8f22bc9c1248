pub mod action;
pub mod group;
pub mod init;
pub mod job;

use actiongraph_core::event::LogSink;
use actiongraph_core::ActionGraph;
use anyhow::Context;
use std::path::Path;

pub fn open(root: &Path) -> anyhow::Result<ActionGraph> {
    let graph = ActionGraph::open(root)
        .with_context(|| format!("failed to open action graph in {}", root.display()))?;
    Ok(graph.with_events(LogSink))
}
