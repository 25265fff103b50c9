//! Forge CLI entrypoint.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use forge_artifact::MemoryArtifactStore;
use forge_cache::FsCacheStore;
use forge_core::ports::ReleaseTarget;
use forge_core::run::{EventKind, TriggerEvent};
use forge_core::workflow::WorkflowDefinition;
use forge_release::{DirTarget, HttpTarget};
use forge_runner::ShellExecutor;
use forge_scheduler::{RunCoordinator, StageDag, TracingSink};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod report;

use config::ForgeConfig;

#[derive(Parser)]
#[command(name = "forge")]
#[command(author, version, about = "Forge pipeline orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow run for an inbound event
    Run {
        /// Workflow file (defaults to standard locations)
        #[arg(short, long)]
        file: Option<String>,
        /// Event kind that invoked the run
        #[arg(long, value_enum, default_value = "pull-request")]
        event: EventArg,
        /// Git ref of the event
        #[arg(long = "ref", default_value = "refs/heads/main")]
        git_ref: String,
        /// Job workspace directory
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Force the release to publish as a draft
        #[arg(long)]
        draft: bool,
        /// Extra variables as KEY=VALUE
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
    /// Validate a workflow definition without running it
    Validate {
        #[arg(short, long)]
        file: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventArg {
    PullRequest,
    Push,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::PullRequest => EventKind::PullRequest,
            EventArg::Push => EventKind::Push,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            event,
            git_ref,
            workspace,
            draft,
            vars,
        } => run(file, event, git_ref, workspace, draft, vars).await,
        Commands::Validate { file } => validate(file),
    }
}

async fn run(
    file: Option<String>,
    event: EventArg,
    git_ref: String,
    workspace: Option<PathBuf>,
    draft: bool,
    vars: Vec<(String, String)>,
) -> anyhow::Result<ExitCode> {
    let path = find_workflow_file(file.as_deref())
        .context("no workflow file found; pass --file or create .forge/workflow.yaml")?;
    let mut definition = load_workflow(&path)?;
    if draft && let Some(release) = definition.release.as_mut() {
        release.draft = true;
    }

    let config = ForgeConfig::load().unwrap_or_default();
    let workspace = match workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let target: Arc<dyn ReleaseTarget> = match &config.publish_url {
        Some(url) => {
            let mut target = HttpTarget::new(url.as_str());
            if let Some(token) = &config.publish_token {
                target = target.with_token(token.as_str());
            }
            Arc::new(target)
        }
        None => Arc::new(DirTarget::new(&config.dist_dir)),
    };

    let coordinator = RunCoordinator::new(
        Arc::new(FsCacheStore::new(&config.cache_dir)),
        Arc::new(MemoryArtifactStore::new()),
        Arc::new(ShellExecutor::new()),
        target,
        Arc::new(TracingSink),
    )
    .with_workspace(workspace)
    .with_variables(vars.into_iter().collect::<HashMap<_, _>>());

    let event = TriggerEvent {
        kind: event.into(),
        git_ref,
    };
    let run = coordinator
        .execute(&definition, event)
        .await
        .with_context(|| format!("run of '{}' aborted", definition.name))?;

    report::print_run(&run);

    Ok(if run.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn validate(file: Option<String>) -> anyhow::Result<ExitCode> {
    let path = find_workflow_file(file.as_deref())
        .context("no workflow file found; pass --file or create .forge/workflow.yaml")?;
    let definition = load_workflow(&path)?;

    let dag = StageDag::build(&definition)?;
    if let Some(release) = &definition.release {
        for need in &release.needs {
            anyhow::ensure!(
                definition.stage(need).is_some(),
                "release needs unknown stage '{}'",
                need
            );
        }
    }

    let order: Vec<&str> = dag
        .topological_order()?
        .iter()
        .map(|node| node.name.as_str())
        .collect();
    println!(
        "{} {} is valid ({} stages: {})",
        console::style("✓").green().bold(),
        path.display(),
        dag.len(),
        order.join(" → ")
    );
    Ok(ExitCode::SUCCESS)
}

/// Find the workflow file in standard locations.
fn find_workflow_file(path: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = path {
        let path = PathBuf::from(p);
        return path.exists().then_some(path);
    }

    let candidates = [
        ".forge/workflow.yaml",
        ".forge/workflow.yml",
        "workflow.yaml",
        "workflow.yml",
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse workflow {}", path.display()))
}
