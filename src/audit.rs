//! Audit workflows
//!
//! Ties the stages together: load tables, build context, partition,
//! dispatch, reconcile, canonicalize (SOD only), report. Everything past
//! table loading degrades gracefully; only unreadable or malformed inputs
//! abort a run.

use crate::backend::RetryClient;
use crate::context::{build_approver_context, build_sod_context};
use crate::pipeline::{
    approver_prompt, canonical, dispatch_batches, partition, reconcile, sod_prompt, Subject,
};
use crate::report::{write_approver_report, write_sod_report};
use crate::tables;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// File names expected under the data input directory.
const DEPLOYMENT_LOG_FILE: &str = "ci_cd_deployment_log.csv";
const IAM_USERS_FILE: &str = "iam_users_status.csv";
const DOA_MATRIX_FILE: &str = "doa_matrix.csv";

#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub population_file: PathBuf,
    pub batch_size: usize,
}

fn ids_of<T: Subject>(rows: &[T]) -> Vec<String> {
    rows.iter().map(|r| r.change_id().to_string()).collect()
}

/// Detect Segregation-of-Duties violations across the change population and
/// write the annotated report. Returns the report path.
pub async fn run_sod_audit(opts: &AuditOptions, client: &RetryClient) -> Result<PathBuf> {
    tracing::info!("starting SOD violation detection");

    let changes = tables::load_population(&opts.population_file)?;
    let deployments = tables::load_deployment_log(&opts.data_dir.join(DEPLOYMENT_LOG_FILE))?;
    let iam_users = tables::load_iam_users(&opts.data_dir.join(IAM_USERS_FILE))?;
    // The authority matrix is a required input even though role mapping
    // arrives via the identity roster; an extract without it is incomplete.
    let doa = tables::load_doa_matrix(&opts.data_dir.join(DOA_MATRIX_FILE))?;
    tracing::info!(authority_roles = doa.len(), "authority matrix loaded");

    let context = build_sod_context(&changes, &deployments, &iam_users);
    if context.skipped > 0 {
        tracing::warn!(skipped = context.skipped, "unprocessable changes skipped");
    }

    let batches = partition(&context.rows, opts.batch_size, sod_prompt)?;
    let results = dispatch_batches(client, &batches).await;

    let mut outcomes = reconcile(&ids_of(&context.rows), &results);
    canonical::canonicalize_exceptions(&mut outcomes, &context.rows);

    write_sod_report(&opts.out_dir, &context.rows, &outcomes, &opts.population_file)
}

/// Validate that every change's approver is authorized and write the
/// annotated report. Returns the report path.
pub async fn run_approver_audit(opts: &AuditOptions, client: &RetryClient) -> Result<PathBuf> {
    tracing::info!("starting approver validation");

    let changes = tables::load_population(&opts.population_file)?;
    let iam_users = tables::load_iam_users(&opts.data_dir.join(IAM_USERS_FILE))?;

    let rows = build_approver_context(&changes, &iam_users);
    let batches = partition(&rows, opts.batch_size, approver_prompt)?;
    let results = dispatch_batches(client, &batches).await;

    let outcomes = reconcile(&ids_of(&rows), &results);
    write_approver_report(&opts.out_dir, &rows, &outcomes, &opts.population_file)
}

/// Default population file location under the data directory.
pub fn default_population_file(data_dir: &Path) -> PathBuf {
    data_dir.join("verified_population.csv")
}
