//! Source table loading
//!
//! All audit inputs arrive as semicolon-delimited CSV extracts. Loading is
//! strict about required columns (a missing column is a precondition failure,
//! never retried) and lenient about everything else: optional columns resolve
//! to "Unknown" so one sloppy extract does not sink the whole run.

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use std::path::Path;

/// Sentinel value for any attribute that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// One change/migration event from the verified population extract.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub change_id: String,
    pub asset_name: String,
    pub change_type: String,
    pub risk_rating: String,
    pub requestor_id: String,
    pub requestor_name: String,
    pub developer_id: String,
    pub developer_name: String,
    pub approver_id: String,
    pub approver_name: String,
}

/// One CI/CD deployment log entry.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub linked_change_id: String,
    pub asset_name: String,
    pub deployer_id: String,
    pub deployer_name: String,
    pub deployment_id: String,
}

/// One identity roster (IAM) entry.
#[derive(Debug, Clone)]
pub struct IamUser {
    pub user_id: String,
    pub iam_role: String,
    pub mapped_doa_role: String,
}

/// One authority matrix (DOA) entry.
#[derive(Debug, Clone)]
pub struct DoaEntry {
    pub role: String,
    pub authorized_applications: String,
    pub risk_threshold: String,
}

/// Column index lookup over a CSV header row.
pub(crate) struct Header {
    columns: Vec<String>,
}

impl Header {
    fn from_record(record: &StringRecord) -> Self {
        Self {
            columns: record.iter().map(|c| c.trim().to_string()).collect(),
        }
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Verify every required column exists, naming the ones that do not.
    fn require(&self, table: &str, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| self.index(name).is_none())
            .collect();
        if !missing.is_empty() {
            bail!(
                "missing required columns in {}: {}",
                table,
                missing.join(", ")
            );
        }
        Ok(())
    }

    /// Required field: the column is known to exist after `require`.
    pub(crate) fn field(&self, record: &StringRecord, name: &str) -> String {
        self.index(name)
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Optional field: absent columns and empty cells resolve to "Unknown".
    fn field_or_unknown(&self, record: &StringRecord, name: &str) -> String {
        let value = self.field(record, name);
        if value.is_empty() {
            UNKNOWN.to_string()
        } else {
            value
        }
    }
}

pub(crate) fn read_table(
    path: &Path,
    table: &str,
    required: &[&str],
) -> Result<(Header, Vec<StringRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {} at {}", table, path.display()))?;

    let header = Header::from_record(
        reader
            .headers()
            .with_context(|| format!("failed to read {} header", table))?,
    );
    header.require(table, required)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("failed to read {} row", table))?;
        rows.push(record);
    }
    tracing::info!(table, rows = rows.len(), "loaded source table");
    Ok((header, rows))
}

/// Load the verified change population extract.
pub fn load_population(path: &Path) -> Result<Vec<ChangeRecord>> {
    let (header, rows) = read_table(
        path,
        "change population",
        &[
            "Change_ID",
            "Asset_Name",
            "Requestor_ID",
            "Approver_ID",
            "Developer_ID",
        ],
    )?;

    Ok(rows
        .iter()
        .map(|r| ChangeRecord {
            change_id: header.field(r, "Change_ID"),
            asset_name: header.field(r, "Asset_Name"),
            change_type: header.field_or_unknown(r, "Change_Type"),
            risk_rating: header.field_or_unknown(r, "Risk_Rating"),
            requestor_id: header.field_or_unknown(r, "Requestor_ID"),
            requestor_name: header.field_or_unknown(r, "Requestor_Name"),
            developer_id: header.field_or_unknown(r, "Developer_ID"),
            developer_name: header.field_or_unknown(r, "Developer_Name"),
            approver_id: header.field_or_unknown(r, "Approver_ID"),
            approver_name: header.field_or_unknown(r, "Approver_Name"),
        })
        .collect())
}

/// Load the CI/CD deployment log.
pub fn load_deployment_log(path: &Path) -> Result<Vec<DeploymentRecord>> {
    let (header, rows) = read_table(
        path,
        "deployment log",
        &["Linked_Change_ID", "Asset_Name", "Deployer_ID", "Deployer_Name"],
    )?;

    Ok(rows
        .iter()
        .map(|r| DeploymentRecord {
            linked_change_id: header.field(r, "Linked_Change_ID"),
            asset_name: header.field(r, "Asset_Name"),
            deployer_id: header.field_or_unknown(r, "Deployer_ID"),
            deployer_name: header.field_or_unknown(r, "Deployer_Name"),
            deployment_id: header.field_or_unknown(r, "Deployment_ID"),
        })
        .collect())
}

/// Load the IAM users status extract.
pub fn load_iam_users(path: &Path) -> Result<Vec<IamUser>> {
    let (header, rows) = read_table(
        path,
        "IAM users",
        &["User_ID", "IAM_Role", "Mapped_DOA_Role"],
    )?;

    Ok(rows
        .iter()
        .map(|r| IamUser {
            user_id: header.field(r, "User_ID"),
            iam_role: header.field(r, "IAM_Role"),
            mapped_doa_role: header.field_or_unknown(r, "Mapped_DOA_Role"),
        })
        .collect())
}

/// Load the delegation-of-authority matrix.
pub fn load_doa_matrix(path: &Path) -> Result<Vec<DoaEntry>> {
    let (header, rows) = read_table(
        path,
        "DOA matrix",
        &["Role", "Authorized_Applications", "Risk_Threshold"],
    )?;

    Ok(rows
        .iter()
        .map(|r| DoaEntry {
            role: header.field(r, "Role"),
            authorized_applications: header.field(r, "Authorized_Applications"),
            risk_threshold: header.field(r, "Risk_Threshold"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn population_loads_and_defaults_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "population.csv",
            "Change_ID;Asset_Name;Requestor_ID;Approver_ID;Developer_ID\n\
             CHG1000;Billing;U1;U2;U3\n",
        );

        let records = load_population(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_id, "CHG1000");
        assert_eq!(records[0].requestor_id, "U1");
        // Optional columns missing from the extract resolve to the sentinel.
        assert_eq!(records[0].change_type, UNKNOWN);
        assert_eq!(records[0].requestor_name, UNKNOWN);
    }

    #[test]
    fn missing_required_column_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "population.csv",
            "Change_ID;Asset_Name;Requestor_ID\nCHG1;A;U1\n",
        );

        let err = load_population(&path).unwrap_err().to_string();
        assert!(err.contains("Approver_ID"), "unexpected error: {}", err);
        assert!(err.contains("Developer_ID"), "unexpected error: {}", err);
    }

    #[test]
    fn missing_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_iam_users(&dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn deployment_log_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "deploy.csv",
            "Linked_Change_ID;Asset_Name;Deployer_ID;Deployer_Name;Deployment_ID\n\
             CHG1000;Billing;U4;Dana;DEP-1\n",
        );

        let records = load_deployment_log(&path).unwrap();
        assert_eq!(records[0].deployer_id, "U4");
        assert_eq!(records[0].deployment_id, "DEP-1");
    }
}
