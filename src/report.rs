//! Report output
//!
//! One CSV row per subject record with the reconciled verdict, plus a JSON
//! metadata file carrying the report timestamp, the source population file
//! name, and record counts by status. Column order is fixed because the
//! downstream consumers are spreadsheets, not programs.

use crate::context::{ApproverContextRow, SodContextRow};
use crate::pipeline::{Outcome, Status};
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub report_timestamp: String,
    pub generated_by: String,
    pub source_population_file: String,
    pub total_records: usize,
    pub ok_records: usize,
    pub exception_records: usize,
    pub unknown_records: usize,
}

impl ReportMetadata {
    fn new(generated_by: &str, source_file: &Path, outcomes: &[Outcome]) -> Self {
        let count = |status: Status| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            report_timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            generated_by: generated_by.to_string(),
            source_population_file: source_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Unknown".to_string()),
            total_records: outcomes.len(),
            ok_records: count(Status::Ok),
            exception_records: count(Status::Exception),
            unknown_records: count(Status::Unknown),
        }
    }
}

fn write_metadata(dir: &Path, metadata: &ReportMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(dir.join("report_metadata.json"), json)?;
    Ok(())
}

fn prepare_dir(out_dir: &Path, subdir: &str) -> Result<PathBuf> {
    let dir = out_dir.join(subdir);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

/// Write the SOD violations report. Returns the CSV path.
pub fn write_sod_report(
    out_dir: &Path,
    rows: &[SodContextRow],
    outcomes: &[Outcome],
    source_file: &Path,
) -> Result<PathBuf> {
    let dir = prepare_dir(out_dir, "sod_violations")?;
    let path = dir.join("sod_violations.csv");

    let by_id: HashMap<&str, &SodContextRow> =
        rows.iter().map(|r| (r.change_id.as_str(), r)).collect();

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(&path)?;
    writer.write_record([
        "Change_ID",
        "Asset_Name",
        "Requestor_ID",
        "Requestor_Name",
        "Developer_ID",
        "Developer_Name",
        "Deployer_ID",
        "Deployer_Name",
        "Approver_ID",
        "Approver_Name",
        "Status",
        "Exception_Reason",
    ])?;
    for outcome in outcomes {
        let row = by_id.get(outcome.change_id.as_str());
        let field = |f: fn(&SodContextRow) -> &str| row.map_or("Unknown", |r| f(r));
        writer.write_record([
            outcome.change_id.as_str(),
            field(|r| &r.asset_name),
            field(|r| &r.requestor_id),
            field(|r| &r.requestor_name),
            field(|r| &r.developer_id),
            field(|r| &r.developer_name),
            field(|r| &r.deployer_id),
            field(|r| &r.deployer_name),
            field(|r| &r.approver_id),
            field(|r| &r.approver_name),
            outcome.status.as_str(),
            outcome.reason.as_str(),
        ])?;
    }
    writer.flush()?;

    let metadata = ReportMetadata::new("sod-violation-detection", source_file, outcomes);
    write_metadata(&dir, &metadata)?;
    tracing::info!(
        path = %path.display(),
        violations = metadata.exception_records,
        "SOD violations report saved"
    );
    Ok(path)
}

/// Write the approver validation report. Returns the CSV path.
pub fn write_approver_report(
    out_dir: &Path,
    rows: &[ApproverContextRow],
    outcomes: &[Outcome],
    source_file: &Path,
) -> Result<PathBuf> {
    let dir = prepare_dir(out_dir, "approver_validations")?;
    let path = dir.join("approver_validation_report.csv");

    let by_id: HashMap<&str, &ApproverContextRow> =
        rows.iter().map(|r| (r.change_id.as_str(), r)).collect();

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(&path)?;
    writer.write_record([
        "Change_ID",
        "Asset_Name",
        "Approver_ID",
        "Approver_Name",
        "Status",
        "Reason_Code",
    ])?;
    for outcome in outcomes {
        let row = by_id.get(outcome.change_id.as_str());
        let field = |f: fn(&ApproverContextRow) -> &str| row.map_or("Unknown", |r| f(r));
        writer.write_record([
            outcome.change_id.as_str(),
            field(|r| &r.asset_name),
            field(|r| &r.approver_id),
            field(|r| &r.approver_name),
            outcome.status.as_str(),
            outcome.reason.as_str(),
        ])?;
    }
    writer.flush()?;

    let metadata = ReportMetadata::new("approver-validation", source_file, outcomes);
    write_metadata(&dir, &metadata)?;
    tracing::info!(
        path = %path.display(),
        exceptions = metadata.exception_records,
        "approver validation report saved"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: Status, reason: &str) -> Outcome {
        Outcome {
            change_id: id.to_string(),
            status,
            reason: reason.to_string(),
        }
    }

    fn approver_row(id: &str) -> ApproverContextRow {
        ApproverContextRow {
            change_id: id.to_string(),
            asset_name: "Billing".to_string(),
            approver_id: "U3".to_string(),
            approver_name: "Cleo".to_string(),
            iam_user_ids: "U1,U2,U3".to_string(),
            iam_approver_ids: "U3".to_string(),
            it_bu_manager_ids: "U3".to_string(),
        }
    }

    #[test]
    fn approver_report_writes_one_row_per_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![approver_row("CHG1"), approver_row("CHG2")];
        let outcomes = vec![
            outcome("CHG1", Status::Ok, "Valid approver"),
            outcome("CHG2", Status::Unknown, "Record not processed by AI analysis"),
        ];

        let path = write_approver_report(
            dir.path(),
            &rows,
            &outcomes,
            Path::new("verified_population.csv"),
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Change_ID;Asset_Name"));
        assert!(lines[1].contains("Valid approver"));
        assert!(lines[2].contains("Unknown"));

        let metadata: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(path.parent().unwrap().join("report_metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["total_records"], 2);
        assert_eq!(metadata["ok_records"], 1);
        assert_eq!(metadata["unknown_records"], 1);
        assert_eq!(
            metadata["source_population_file"],
            "verified_population.csv"
        );
    }

    #[test]
    fn sod_report_emits_fixed_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = vec![outcome(
            "CHG9",
            Status::Exception,
            "Requestor and Developer share the same ID (U1)",
        )];

        // No matching context row: identity fields degrade to Unknown but the
        // record still appears in the report.
        let path =
            write_sod_report(dir.path(), &[], &outcomes, Path::new("population.csv")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Status;Exception_Reason"));
        assert!(lines[1].starts_with("CHG9;Unknown"));
        assert!(lines[1].contains("share the same ID (U1)"));
    }
}
