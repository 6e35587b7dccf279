//! Command-line entry for datex jobs and services.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use datex::api::ControlApi;
use datex::config::{JobConfig, ServiceConfig};
use datex::observability::{init_tracing, LogRegistry};
use datex::registry::StageRegistry;
use datex::runner::{JobDirectories, JobRunner, ServiceRunner};

#[derive(Parser)]
#[command(name = "datex", about = "Configuration-driven data exchange engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job document to completion and exit.
    Run {
        /// Path to the job document.
        config: PathBuf,

        /// Home directory override.
        #[arg(long)]
        home: Option<PathBuf>,

        /// Work directory override.
        #[arg(long)]
        work: Option<PathBuf>,
    },

    /// Host a service document: scheduled jobs plus the control API.
    Service {
        /// Path to the service document.
        config: PathBuf,

        /// Listen port override.
        #[arg(long)]
        port: Option<u16>,

        /// Home directory override.
        #[arg(long)]
        home: Option<PathBuf>,

        /// Work directory override.
        #[arg(long)]
        work: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logs = LogRegistry::new();
    init_tracing(&logs);

    match cli.command {
        Commands::Run { config, home, work } => {
            let text = std::fs::read_to_string(&config)
                .with_context(|| format!("cannot read {}", config.display()))?;
            let job = JobConfig::parse(&text)?;

            let dirs = JobDirectories::resolve(home.as_deref(), work.as_deref(), Some(&config));
            let runner = JobRunner::new(StageRegistry::with_builtins()).with_directories(dirs);
            let outcome = runner.run(&job).await?;
            if let Some(message) = outcome.message() {
                error!(job = %job.name, "job failed: {message}");
            }
            std::process::exit(outcome.exit_code());
        }
        Commands::Service {
            config,
            port,
            home,
            work,
        } => {
            let text = std::fs::read_to_string(&config)
                .with_context(|| format!("cannot read {}", config.display()))?;
            let mut service_config = ServiceConfig::parse(&text)?;
            if let Some(port) = port {
                service_config.port = port;
            }

            let dirs = JobDirectories::resolve(home.as_deref(), work.as_deref(), Some(&config));
            let runner = JobRunner::new(StageRegistry::with_builtins()).with_directories(dirs);
            let service = Arc::new(ServiceRunner::new(runner));
            service.start_configured(service_config.jobs.clone());

            let api = ControlApi::new(service_config, Arc::clone(&service), logs);
            api.serve().await?;

            service.shutdown();
            service.wait_idle().await;
            info!("service stopped");
        }
    }
    Ok(())
}
