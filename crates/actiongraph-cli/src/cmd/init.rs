use crate::output::print_json;
use actiongraph_core::config::{EngineConfig, WarnLevel};
use actiongraph_core::{paths, ActionGraph};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let existed = paths::config_path(root).exists();
    let graph = ActionGraph::init(root)
        .with_context(|| format!("failed to initialize {}", root.display()))?;
    let config: &EngineConfig = graph.config();
    let warnings = config.validate();

    if json {
        return print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": !existed,
            "shared_group": graph.shared_group(),
            "database": config.database_path(root).display().to_string(),
            "warnings": warnings,
        }));
    }

    println!("Initializing action graph in: {}", root.display());
    if existed {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        println!("  created: {}", paths::CONFIG_FILE);
    }
    println!("  database: {}", config.database_path(root).display());
    println!("  shared group: {}", graph.shared_group().name);
    for w in &warnings {
        let level = match w.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        println!("  {level}: {}", w.message);
    }
    Ok(())
}
