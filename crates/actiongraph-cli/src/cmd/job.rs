use crate::output::print_json;
use actiongraph_core::store::PipelineJob;
use anyhow::{bail, Context};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum JobSubcommand {
    /// Register a pipeline job running an action
    Add {
        /// Group owning the job
        #[arg(long)]
        group: String,
        /// Action run by the job, looked up in the job's group then the shared group
        #[arg(long)]
        action: String,
        #[arg(long)]
        project: String,
        /// Defaults to the project key
        #[arg(long)]
        project_name: Option<String>,
        #[arg(long)]
        pipeline: String,
        #[arg(long, default_value = "stage 1")]
        stage: String,
        #[arg(long)]
        job: String,
    },
    /// Remove a pipeline job by id
    Remove { id: i64 },
}

pub fn run(root: &Path, subcmd: JobSubcommand, json: bool) -> anyhow::Result<()> {
    let mut graph = super::open(root)?;
    match subcmd {
        JobSubcommand::Add {
            group,
            action,
            project,
            project_name,
            pipeline,
            stage,
            job,
        } => {
            let g = graph.group_by_name(&group)?;
            let target = graph
                .load_by_name_and_group(&action, g.id)
                .or_else(|_| graph.load_by_name_and_group(&action, graph.shared_group().id))
                .with_context(|| format!("action '{action}' not found for group '{group}'"))?;
            let record = PipelineJob {
                id: 0,
                project_name: project_name.unwrap_or_else(|| project.clone()),
                project_key: project,
                pipeline_name: pipeline,
                stage_name: stage,
                job_name: job,
                group_id: g.id,
                action_id: target.id,
            };
            let id = graph.add_pipeline_job(&record)?;
            if json {
                print_json(&PipelineJob { id, ..record })?;
            } else {
                println!(
                    "Added job '{}' (id {id}) running '{}'",
                    record.job_name, target.name
                );
            }
        }
        JobSubcommand::Remove { id } => {
            if !graph.remove_pipeline_job(id)? {
                bail!("no pipeline job with id {id}");
            }
            if json {
                print_json(&serde_json::json!({ "removed": id }))?;
            } else {
                println!("Removed job {id}");
            }
        }
    }
    Ok(())
}
