use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use context_indexer::{
    acquire_sync_lock, CancellationToken, SyncOptions, SyncOutcome, SyncResult,
    MAX_SYNC_CONCURRENCY,
};
use flags::{BackendFlag, ModeFlag};
use project::{Overrides, Project};
use std::path::PathBuf;

mod flags;
mod project;

#[derive(Parser)]
#[command(name = "context-sync")]
#[command(about = "Keep embedding, graph and tool-data indexes in step with a project tree", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Hash store backend (overrides sync.toml and CONTEXT_SYNC_BACKEND)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendFlag>,

    /// State directory for hashes and indexes (default: <project>/.context)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync changed files into the downstream indexes
    Sync(SyncArgs),

    /// Show what a sync would do without touching any store
    Plan(SyncArgs),

    /// Show tracked-file counts and the last sync
    Status(StatusArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Project id in the hash store (default: directory name)
    #[arg(long)]
    project_id: Option<String>,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Sync mode (default: incremental, or selective with --include)
    #[arg(long, value_enum)]
    mode: Option<ModeFlag>,

    /// Reprocess every file
    #[arg(long)]
    full: bool,

    /// Sync even when nothing changed
    #[arg(long)]
    force: bool,

    /// First sync of an agent session
    #[arg(long)]
    session_start: bool,

    /// Skip embedding updates
    #[arg(long)]
    no_embeddings: bool,

    /// Skip graph updates
    #[arg(long)]
    no_graph: bool,

    /// Skip tool analysis
    #[arg(long)]
    no_analysis: bool,

    /// Files processed in parallel (1-32)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=MAX_SYNC_CONCURRENCY as i64))]
    concurrency: Option<u16>,

    /// Only sync paths matching these globs (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    include: Vec<String>,

    /// Skip paths matching these globs (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    exclude: Vec<String>,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        let skip = |flag: bool| flag.then_some(false);
        SyncOptions {
            force_full_sync: self.full.then_some(true),
            mode: self.mode.map(ModeFlag::as_domain),
            update_embeddings: skip(self.no_embeddings),
            update_graph: skip(self.no_graph),
            update_analysis: skip(self.no_analysis),
            force_sync: self.force.then_some(true),
            session_start: self.session_start.then_some(true),
            max_concurrency: self.concurrency.map(usize::from),
            include_patterns: (!self.include.is_empty()).then(|| self.include.clone()),
            exclude_patterns: (!self.exclude.is_empty()).then(|| self.exclude.clone()),
        }
    }
}

#[derive(Args)]
struct StatusArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let overrides = Overrides {
        backend: cli.backend.map(BackendFlag::as_domain),
        state_dir: cli.state_dir,
    };

    match cli.command {
        Commands::Sync(args) => run_sync(args, &overrides).await?,
        Commands::Plan(args) => run_plan(args, &overrides).await?,
        Commands::Status(args) => run_status(args, &overrides).await?,
    }

    Ok(())
}

async fn run_sync(args: SyncArgs, overrides: &Overrides) -> Result<()> {
    let project = Project::open(
        &args.project.path,
        args.project.project_id.as_deref(),
        overrides,
    )
    .await?;
    let _lock = acquire_sync_lock(&project.state_dir, &project.id)
        .await
        .context("Failed to acquire sync lock")?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received; finishing in-flight files");
                cancel.cancel();
            }
        })
    };
    let result = project
        .manager
        .sync_project_with_cancel(&project.id, &project.root, &args.options(), &cancel)
        .await;
    watcher.abort();
    let result = result.with_context(|| format!("Sync of '{}' failed", project.id))?;
    project.close().await?;

    log_summary(&result);
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.outcome == SyncOutcome::Interrupted {
        std::process::exit(130);
    }
    Ok(())
}

async fn run_plan(args: SyncArgs, overrides: &Overrides) -> Result<()> {
    let project = Project::open(
        &args.project.path,
        args.project.project_id.as_deref(),
        overrides,
    )
    .await?;
    let plan = project
        .manager
        .plan(&project.id, &project.root, &args.options())
        .await
        .with_context(|| format!("Planning '{}' failed", project.id))?;

    let changes = &plan.recommendation.change_set;
    log::info!(
        "{} ({}, {}): {} new, {} modified, {} deleted, {} unchanged",
        if plan.recommendation.should_sync {
            "Sync needed"
        } else {
            "Up to date"
        },
        plan.strategy.mode,
        plan.recommendation.reason,
        changes.new.len(),
        changes.modified.len(),
        changes.deleted.len(),
        changes.unchanged.len()
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn run_status(args: StatusArgs, overrides: &Overrides) -> Result<()> {
    let project = Project::open(
        &args.project.path,
        args.project.project_id.as_deref(),
        overrides,
    )
    .await?;
    let status = project.manager.status(&project.id).await?;

    match &status.metadata {
        Some(meta) => log::info!(
            "{}: {} tracked files ({} incomplete, {} tombstones); last {} sync processed {} files",
            status.project_id,
            status.tracked_files,
            status.incomplete,
            status.tombstones,
            meta.strategy_used,
            meta.files_processed
        ),
        None => log::info!(
            "{}: {} tracked files, never fully synced",
            status.project_id,
            status.tracked_files
        ),
    }
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn log_summary(result: &SyncResult) {
    log::info!(
        "Sync {:?} ({}, {}) in {}ms: {} new, {} modified, {} deleted; {} embeddings, {} graph, {} tool data",
        result.outcome,
        result.strategy_used,
        result.reason,
        result.duration_ms,
        result.new_files,
        result.changed_files,
        result.deleted_files,
        result.updated_embeddings,
        result.updated_graph_nodes,
        result.updated_tool_data
    );
    for failure in &result.failures {
        log::warn!("{} [{:?}]: {}", failure.path, failure.stage, failure.message);
    }
}
