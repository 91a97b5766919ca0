use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nbv_controller::{cluster_reconciler, cluster_store, command_name, Config, Controller};
use nbv_core::{Requeue, Tolerance};
use nbv_store::{InMemoryJobStore, JobStore, SqliteJobStore};

mod manifest;

#[derive(Parser)]
#[command(name = "nbv", version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "NBV_CONFIG", default_value = "nbv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default nbv.toml
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Run the controller loop against the cluster, or against a local sqlite store
    Run {
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        namespace: Option<String>,
        /// Local job database instead of the cluster resources
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// Run reconciliation for a job manifest and print the resulting status
    Reconcile {
        #[arg(long)]
        job: PathBuf,
        /// Keep going while the engine asks for an immediate requeue
        #[arg(long)]
        until_wait: bool,
    },

    /// Insert or update a job in the local store
    Submit {
        #[arg(long)]
        job: PathBuf,
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// List jobs and their phases
    Status {
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// Parse validator pod logs and print the execution result
    ParseLogs { file: PathBuf },

    /// Compare an execution result with a golden notebook offline
    Compare {
        #[arg(long)]
        actual: PathBuf,
        #[arg(long)]
        golden: PathBuf,
        /// Take comparison tolerances from this job manifest
        #[arg(long)]
        job: Option<PathBuf>,
    },
}

fn local_store(cfg: &Config, db: Option<PathBuf>) -> anyhow::Result<SqliteJobStore> {
    let path = db.unwrap_or_else(|| cfg.db_path());
    SqliteJobStore::open(&path).with_context(|| format!("open local store {}", path.display()))
}

fn store_for(cfg: &Config, local: Option<PathBuf>) -> anyhow::Result<Arc<dyn JobStore>> {
    Ok(match local {
        Some(db) => Arc::new(local_store(cfg, Some(db))?),
        None => cluster_store(cfg),
    })
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default_config().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.cmd {
        Command::Init { force } => init(&cli.config, force)?,
        Command::Run { workers, namespace, local } => {
            let store = store_for(&cfg, local)?;
            let reconciler = Arc::new(cluster_reconciler(&cfg, store)?);
            let controller = Controller::new(
                reconciler,
                namespace.or(cfg.controller.namespace.clone()),
                workers.unwrap_or(cfg.controller.workers),
                Duration::from_secs(cfg.controller.resync_secs),
            );
            controller.run(Arc::new(AtomicBool::new(false)))?;
        }
        Command::Reconcile { job, until_wait } => {
            let job = manifest::load_job(&job)?;
            let key = job.key();
            let store = Arc::new(InMemoryJobStore::new().with_job(job));
            let reconciler = cluster_reconciler(&cfg, store)?;
            loop {
                let Some(pass) = reconciler.reconcile(&key)? else {
                    bail!("job {key} disappeared during reconciliation");
                };
                info!(job = %key, command = command_name(&pass.command), phase = %pass.status.phase, "pass complete");
                if !until_wait || pass.requeue != Requeue::Now {
                    println!("command: {}", command_name(&pass.command));
                    println!("requeue: {:?}", pass.requeue);
                    print_json(&pass.status)?;
                    break;
                }
            }
        }
        Command::Submit { job, local } => {
            let store = local_store(&cfg, local)?;
            let applied = store.apply(manifest::load_job(&job)?)?;
            println!("Submitted {} (generation {})", applied.key(), applied.generation());
        }
        Command::Status { namespace, local } => {
            let store = store_for(&cfg, local)?;
            let jobs = store.list(namespace.as_deref())?;
            println!("Jobs: {}", jobs.len());
            for job in jobs {
                let s = &job.status;
                let note = match &s.last_error {
                    Some(e) if s.message.is_empty() => e.message.as_str(),
                    _ => s.message.as_str(),
                };
                println!("- {} [{}] {}", job.key(), s.phase, nbv_core::redact::redact_text(note));
            }
        }
        Command::ParseLogs { file } => {
            let logs = std::fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;
            match nbv_logs::parse_results(&logs) {
                Ok(result) => print_json(&result)?,
                Err(e) => bail!("{e} ({})", nbv_logs::extract_error(&logs)),
            }
            if let Some(golden) = nbv_logs::parse_golden(&logs) {
                println!("golden notebook: {} cells", golden.cells.len());
            }
        }
        Command::Compare { actual, golden, job } => {
            let actual = manifest::load_execution(&actual)?;
            let golden = manifest::load_golden(&golden)?;
            let tolerance = match job {
                Some(path) => manifest::load_job(&path)?.spec.comparison,
                None => Tolerance::default(),
            };
            let outcome = nbv_eval::compare(&actual, Some(&golden), &tolerance)?;
            print_json(&outcome)?;
            if !outcome.passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
