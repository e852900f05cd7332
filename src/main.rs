use anyhow::Result;
use change_audit::audit::{self, AuditOptions};
use change_audit::backend::{AgentsBackend, RetryClient};
use change_audit::config::Config;
use change_audit::identify;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "change-audit",
    about = "Batch compliance auditing for change-management records",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the source table extracts
    #[arg(long, default_value = "./data/input")]
    data_dir: PathBuf,

    /// Directory for generated reports
    #[arg(long, default_value = "./data/output")]
    out_dir: PathBuf,

    /// Verified population file (defaults to verified_population.csv in the
    /// data directory)
    #[arg(long)]
    population: Option<PathBuf>,

    /// Records per analysis request
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the verified change population from the migration listing
    Identify,
    /// Detect Segregation-of-Duties violations
    Sod,
    /// Validate approver authorization
    Approvers,
}

/// The identify workflow is purely local; the backend connection is only
/// required for the audit subcommands.
fn build_client(config: &Config) -> Result<RetryClient> {
    let (endpoint, model) = config.backend_settings()?;
    let backend = AgentsBackend::new(
        endpoint.to_string(),
        model.to_string(),
        config.api_key.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );
    Ok(RetryClient::new(
        Arc::new(backend),
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
        Duration::from_secs(config.poll_timeout_secs),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load();

    let opts = AuditOptions {
        population_file: args
            .population
            .unwrap_or_else(|| audit::default_population_file(&args.data_dir)),
        data_dir: args.data_dir,
        out_dir: args.out_dir,
        batch_size: args.batch_size.unwrap_or(config.batch_size),
    };

    let report = match args.command {
        Command::Identify => identify::run_identify(&opts)?,
        Command::Sod => audit::run_sod_audit(&opts, &build_client(&config)?).await?,
        Command::Approvers => audit::run_approver_audit(&opts, &build_client(&config)?).await?,
    };
    println!("Report written to {}", report.display());
    Ok(())
}
