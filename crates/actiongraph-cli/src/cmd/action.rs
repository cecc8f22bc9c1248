use crate::file::ActionFile;
use crate::output::{flag, print_fields, print_json, print_table};
use actiongraph_core::export::Format;
use actiongraph_core::types::BINARY_REQUIREMENT;
use actiongraph_core::{Action, ActionGraph, UserId};
use anyhow::Context;
use clap::Subcommand;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Create a Default action from a YAML file
    Create {
        #[arg(long)]
        file: PathBuf,
        /// Acting user id
        #[arg(long, default_value = "0")]
        user: UserId,
    },
    /// Register a Builtin or Plugin action from a YAML file
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace an action's children, parameters and requirements from a YAML file
    Update {
        group: String,
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "0")]
        user: UserId,
    },
    /// Delete an action no pipeline or other action references
    Delete {
        group: String,
        name: String,
        #[arg(long, default_value = "0")]
        user: UserId,
    },
    /// Show an action with its children and effective requirements
    Show { group: String, name: String },
    /// List actions (all groups unless --group is given; repeatable)
    List {
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    /// Show the pipelines and actions referencing an action
    Usage { group: String, name: String },
    /// Show the change history of an action, newest first
    Audit { group: String, name: String },
    /// Print the fully resolved action as YAML or JSON
    Export {
        group: String,
        name: String,
        #[arg(long, default_value = "yaml")]
        format: String,
    },
    /// List every distinct binary requirement
    Requirements,
    /// Rewrite a requirement value across all actions
    RenameRequirement {
        old: String,
        new: String,
        #[arg(long = "type", default_value = BINARY_REQUIREMENT)]
        kind: String,
    },
}

pub fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    let mut graph = super::open(root)?;
    match subcmd {
        ActionSubcommand::Create { file, user } => create(&mut graph, &file, user, json),
        ActionSubcommand::Seed { file } => seed(&mut graph, &file, json),
        ActionSubcommand::Update {
            group,
            name,
            file,
            user,
        } => update(&mut graph, &group, &name, &file, user, json),
        ActionSubcommand::Delete { group, name, user } => {
            delete(&mut graph, &group, &name, user, json)
        }
        ActionSubcommand::Show { group, name } => show(&graph, &group, &name, json),
        ActionSubcommand::List { groups } => list(&graph, &groups, json),
        ActionSubcommand::Usage { group, name } => usage(&graph, &group, &name, json),
        ActionSubcommand::Audit { group, name } => audit(&graph, &group, &name, json),
        ActionSubcommand::Export {
            group,
            name,
            format,
        } => export(&graph, &group, &name, &format),
        ActionSubcommand::Requirements => requirements(&graph, json),
        ActionSubcommand::RenameRequirement { old, new, kind } => {
            rename_requirement(&mut graph, &old, &new, &kind, json)
        }
    }
}

fn find(graph: &ActionGraph, group: &str, name: &str) -> anyhow::Result<Action> {
    let g = graph.group_by_name(group)?;
    graph
        .load_by_name_and_group(name, g.id)
        .with_context(|| format!("no action '{name}' in group '{group}'"))
}

fn create(graph: &mut ActionGraph, file: &Path, user: UserId, json: bool) -> anyhow::Result<()> {
    let action = ActionFile::load(file)?.resolve(graph)?;
    let stored = graph
        .insert(&action, user)
        .with_context(|| format!("failed to create action '{}'", action.name))?;
    if json {
        print_json(&stored)
    } else {
        println!("Created action '{}' (id {})", stored.name, stored.id);
        Ok(())
    }
}

fn seed(graph: &mut ActionGraph, file: &Path, json: bool) -> anyhow::Result<()> {
    let action = ActionFile::load(file)?.resolve(graph)?;
    let stored = graph
        .seed(&action)
        .with_context(|| format!("failed to seed action '{}'", action.name))?;
    if json {
        print_json(&stored)
    } else {
        println!("Seeded {} action '{}' (id {})", stored.kind, stored.name, stored.id);
        Ok(())
    }
}

fn update(
    graph: &mut ActionGraph,
    group: &str,
    name: &str,
    file: &Path,
    user: UserId,
    json: bool,
) -> anyhow::Result<()> {
    let current = find(graph, group, name)?;
    let mut action = ActionFile::load(file)?.resolve(graph)?;
    action.id = current.id;
    let after = graph
        .update(&action, user)
        .with_context(|| format!("failed to update action '{name}'"))?;
    if json {
        print_json(&after)
    } else {
        println!("Updated action '{}' (id {})", after.name, after.id);
        Ok(())
    }
}

fn delete(
    graph: &mut ActionGraph,
    group: &str,
    name: &str,
    user: UserId,
    json: bool,
) -> anyhow::Result<()> {
    let action = find(graph, group, name)?;
    graph
        .delete(action.id, user)
        .with_context(|| format!("failed to delete action '{name}'"))?;
    if json {
        print_json(&serde_json::json!({ "deleted": action.id, "name": action.name }))
    } else {
        println!("Deleted action '{}'", action.name);
        Ok(())
    }
}

fn show(graph: &ActionGraph, group: &str, name: &str, json: bool) -> anyhow::Result<()> {
    let a = find(graph, group, name)?;
    if json {
        return print_json(&a);
    }

    print_fields(&[
        ("Action", a.name.clone()),
        ("Id", a.id.to_string()),
        ("Group", group.to_string()),
        ("Type", a.kind.to_string()),
        ("Enabled", flag(a.enabled)),
        ("Deprecated", flag(a.deprecated)),
        ("Description", a.description.clone()),
    ]);

    if !a.parameters.is_empty() {
        println!("\nParameters:");
        let rows: Vec<Vec<String>> = a
            .parameters
            .iter()
            .map(|p| vec![p.name.clone(), p.kind.clone(), p.value.clone()])
            .collect();
        print_table(&["NAME", "TYPE", "DEFAULT"], &rows);
    }

    if !a.children.is_empty() {
        println!("\nSteps:");
        let rows: Vec<Vec<String>> = a
            .children
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let params: Vec<String> = c
                    .action
                    .parameters
                    .iter()
                    .map(|p| format!("{}={}", p.name, p.value))
                    .collect();
                vec![
                    (i + 1).to_string(),
                    c.step_name().to_string(),
                    c.action.name.clone(),
                    flag(c.binding.enabled),
                    flag(c.binding.optional),
                    flag(c.binding.always_executed),
                    params.join(" "),
                ]
            })
            .collect();
        print_table(
            &["#", "STEP", "ACTION", "ENABLED", "OPTIONAL", "ALWAYS", "PARAMETERS"],
            &rows,
        );
    }

    if !a.requirements.is_empty() {
        println!("\nRequirements:");
        let rows: Vec<Vec<String>> = a
            .requirements
            .iter()
            .map(|r| vec![r.name.clone(), r.kind.clone(), r.value.clone()])
            .collect();
        print_table(&["NAME", "TYPE", "VALUE"], &rows);
    }
    Ok(())
}

fn list(graph: &ActionGraph, groups: &[String], json: bool) -> anyhow::Result<()> {
    let actions = if groups.is_empty() {
        graph.load_all()?
    } else {
        let ids = groups
            .iter()
            .map(|g| graph.group_by_name(g).map(|g| g.id))
            .collect::<Result<Vec<_>, _>>()?;
        graph.load_all_for_groups(&ids)?
    };

    if json {
        return print_json(&actions);
    }
    if actions.is_empty() {
        println!("No actions.");
        return Ok(());
    }

    let names: HashMap<i64, String> = graph
        .groups()?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();
    let rows: Vec<Vec<String>> = actions
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                names.get(&a.group_id).cloned().unwrap_or_default(),
                a.name.clone(),
                a.kind.to_string(),
                a.children.len().to_string(),
                a.requirements.len().to_string(),
                flag(a.enabled),
            ]
        })
        .collect();
    print_table(
        &["ID", "GROUP", "NAME", "TYPE", "STEPS", "REQS", "ENABLED"],
        &rows,
    );
    Ok(())
}

fn usage(graph: &ActionGraph, group: &str, name: &str, json: bool) -> anyhow::Result<()> {
    let a = find(graph, group, name)?;
    let usage = graph.usage(a.id)?;
    if json {
        return print_json(&usage);
    }
    if usage.is_empty() {
        println!("Action '{}' is not used.", a.name);
        return Ok(());
    }

    if !usage.pipelines.is_empty() {
        println!("Pipelines:");
        let rows: Vec<Vec<String>> = usage
            .pipelines
            .iter()
            .map(|u| {
                vec![
                    u.project_key.clone(),
                    u.pipeline_name.clone(),
                    u.stage_name.clone(),
                    u.job_name.clone(),
                    if u.warning { "cross-group" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["PROJECT", "PIPELINE", "STAGE", "JOB", "WARNING"], &rows);
    }
    if !usage.actions.is_empty() {
        println!("Actions:");
        let rows: Vec<Vec<String>> = usage
            .actions
            .iter()
            .map(|u| {
                vec![
                    u.parent_action_id.to_string(),
                    u.parent_action_name.clone(),
                    if u.warning { "cross-group" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["ID", "PARENT", "WARNING"], &rows);
    }
    Ok(())
}

fn audit(graph: &ActionGraph, group: &str, name: &str, json: bool) -> anyhow::Result<()> {
    let a = find(graph, group, name)?;
    let audits = graph.audits(a.id)?;
    if json {
        return print_json(&audits);
    }
    if audits.is_empty() {
        println!("No history for '{}'.", a.name);
        return Ok(());
    }
    let rows: Vec<Vec<String>> = audits
        .iter()
        .map(|r| {
            vec![
                r.versioned.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.user_id.to_string(),
                r.change.clone(),
                r.action.name.clone(),
            ]
        })
        .collect();
    print_table(&["WHEN", "USER", "CHANGE", "NAME"], &rows);
    Ok(())
}

fn export(graph: &ActionGraph, group: &str, name: &str, format: &str) -> anyhow::Result<()> {
    let format: Format = format.parse()?;
    let g = graph.group_by_name(group)?;
    let bytes = graph
        .export(g.id, name, format)
        .with_context(|| format!("failed to export '{name}' as {format}"))?;
    let mut out = std::io::stdout().lock();
    out.write_all(&bytes)?;
    if !bytes.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn requirements(graph: &ActionGraph, json: bool) -> anyhow::Result<()> {
    let reqs = graph.requirements_distinct_binary()?;
    if json {
        return print_json(&reqs);
    }
    for r in &reqs {
        println!("{}", r.value);
    }
    Ok(())
}

fn rename_requirement(
    graph: &mut ActionGraph,
    old: &str,
    new: &str,
    kind: &str,
    json: bool,
) -> anyhow::Result<()> {
    let ids = graph
        .update_requirements_value(old, new, kind)
        .with_context(|| format!("failed to rename {kind} requirement '{old}'"))?;
    if json {
        print_json(&serde_json::json!({ "updated_actions": ids }))
    } else {
        println!("Renamed '{old}' to '{new}' on {} action(s)", ids.len());
        Ok(())
    }
}
