use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum GroupSubcommand {
    /// Create a group
    Add { name: String },
    /// List all groups
    List,
}

pub fn run(root: &Path, subcmd: GroupSubcommand, json: bool) -> anyhow::Result<()> {
    let mut graph = super::open(root)?;
    match subcmd {
        GroupSubcommand::Add { name } => {
            let group = graph
                .create_group(&name)
                .with_context(|| format!("failed to create group '{name}'"))?;
            if json {
                print_json(&group)?;
            } else {
                println!("Created group '{}' (id {})", group.name, group.id);
            }
        }
        GroupSubcommand::List => {
            let groups = graph.groups()?;
            if json {
                print_json(&groups)?;
                return Ok(());
            }
            let shared = graph.shared_group().id;
            let rows: Vec<Vec<String>> = groups
                .iter()
                .map(|g| {
                    vec![
                        g.id.to_string(),
                        g.name.clone(),
                        if g.id == shared { "shared" } else { "" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "SCOPE"], &rows);
        }
    }
    Ok(())
}
