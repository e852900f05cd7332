//! Population identification
//!
//! Produces the verified population file the audit workflows consume. The
//! raw change migration listing is filtered by the extraction parameters
//! (reporting period, source systems), validated and cleaned, then written
//! out together with a metadata file carrying the record count and a
//! SHA-256 hash total so the extraction is reproducible and tamper-evident.
//! This workflow is deterministic; no reasoning backend is involved.

use crate::audit::AuditOptions;
use crate::tables::{read_table, Header};
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const PARAMETER_FILE: &str = "extraction_parameters.csv";
pub const LISTING_FILE: &str = "change_migration_listing.csv";

/// Extraction scope for one identification run.
#[derive(Debug, Clone)]
pub struct ExtractionParameters {
    pub client_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Source systems to keep. Empty means no system filter.
    pub systems: Vec<String>,
}

/// Load the extraction parameter file. Only the first data row is used.
pub fn load_parameters(path: &Path) -> Result<ExtractionParameters> {
    let (header, rows) = read_table(
        path,
        "extraction parameters",
        &["client_name", "start_date", "end_date", "asset_name"],
    )?;
    let Some(first) = rows.first() else {
        bail!("extraction parameter file {} has no rows", path.display());
    };

    let start_date = parse_date(&header.field(first, "start_date"))
        .with_context(|| "invalid start_date in extraction parameters")?;
    let end_date = parse_date(&header.field(first, "end_date"))
        .with_context(|| "invalid end_date in extraction parameters")?;
    if end_date < start_date {
        bail!("extraction end_date precedes start_date");
    }

    let systems: Vec<String> = header
        .field(first, "asset_name")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(str::to_string)
        .collect();

    Ok(ExtractionParameters {
        client_name: header.field(first, "client_name"),
        start_date,
        end_date,
        systems,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got {:?}", raw))
}

/// Migration timestamps arrive in a few shapes depending on the exporting
/// system; a date without a time component counts as midnight.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// The listing rows that survived the extraction filters, with the original
/// column layout preserved so downstream consumers see the source schema.
pub struct Extract {
    header: Header,
    pub rows: Vec<StringRecord>,
    /// Rows dropped because their migration timestamp would not parse.
    pub invalid_dates: usize,
}

impl Extract {
    pub fn columns(&self) -> &[String] {
        self.header.columns()
    }

    fn value(&self, row: &StringRecord, name: &str) -> String {
        self.header.field(row, name)
    }
}

/// Extract the change migration listing: rows within the reporting period,
/// limited to the requested source systems. Rows with unparseable migration
/// timestamps are dropped and counted.
pub fn extract_listing(path: &Path, params: &ExtractionParameters) -> Result<Extract> {
    let (header, rows) = read_table(
        path,
        "change migration listing",
        &["Change_ID", "Asset_Name", "Migration_DateTime", "Source_System"],
    )?;

    let total = rows.len();
    let mut invalid_dates = 0;
    let mut kept = Vec::new();

    for row in rows {
        let raw_ts = header.field(&row, "Migration_DateTime");
        let Some(ts) = parse_timestamp(&raw_ts) else {
            invalid_dates += 1;
            continue;
        };
        let date = ts.date();
        if date < params.start_date || date > params.end_date {
            continue;
        }
        if !params.systems.is_empty() {
            let system = header.field(&row, "Source_System");
            if !params.systems.iter().any(|s| *s == system) {
                continue;
            }
        }
        kept.push(row);
    }

    if invalid_dates > 0 {
        tracing::warn!(invalid_dates, "dropped rows with unparseable migration timestamps");
    }
    tracing::info!(
        total,
        kept = kept.len(),
        start = %params.start_date,
        end = %params.end_date,
        "extracted change migration listing"
    );

    Ok(Extract {
        header,
        rows: kept,
        invalid_dates,
    })
}

/// Outcome of validation: the problems found, and how many rows had to be
/// removed to make the population usable.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub dropped: usize,
}

const RISK_RATINGS: [&str; 3] = ["High", "Medium", "Low"];
const CHANGE_TYPES: [&str; 3] = ["application", "infrastructure", "configuration"];
const STATUSES: [&str; 4] = ["Completed", "Closed", "Deployed", "Rolled Back"];

fn expand_short_code(value: &str) -> Option<&'static str> {
    match value {
        "H" => Some("High"),
        "M" => Some("Medium"),
        "L" => Some("Low"),
        "app" => Some("application"),
        "infra" => Some("infrastructure"),
        "config" => Some("configuration"),
        _ => None,
    }
}

fn set_cell(record: &mut StringRecord, index: usize, value: &str) {
    let fields: Vec<String> = record
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            if i == index {
                value.to_string()
            } else {
                cell.to_string()
            }
        })
        .collect();
    *record = StringRecord::from(fields);
}

/// Validate and clean the extract in place. Rows with an empty or duplicate
/// Change_ID are removed (first occurrence wins); short risk and type codes
/// are expanded to their full forms; values outside the allowed sets are
/// reported but the rows stay in the population.
pub fn validate_and_clean(extract: &mut Extract) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(id_index) = extract.header.index("Change_ID") else {
        report.errors.push("Change_ID column is missing".to_string());
        return report;
    };

    let before = extract.rows.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut empty_ids = 0;
    let mut duplicate_ids = 0;
    extract.rows.retain(|row| {
        let id = row.get(id_index).unwrap_or("").trim().to_string();
        if id.is_empty() {
            empty_ids += 1;
            return false;
        }
        if !seen.insert(id) {
            duplicate_ids += 1;
            return false;
        }
        true
    });
    report.dropped = before - extract.rows.len();
    if empty_ids > 0 {
        report
            .errors
            .push(format!("Found {} rows with empty Change_ID", empty_ids));
    }
    if duplicate_ids > 0 {
        report
            .errors
            .push(format!("Found {} duplicate Change_ID values", duplicate_ids));
    }

    for (column, allowed) in [
        ("Risk_Rating", &RISK_RATINGS[..]),
        ("Change_Type", &CHANGE_TYPES[..]),
        ("Status", &STATUSES[..]),
    ] {
        let Some(index) = extract.header.index(column) else {
            continue;
        };
        let mut invalid: Vec<String> = Vec::new();
        for row in &mut extract.rows {
            let value = row.get(index).unwrap_or("").trim().to_string();
            if let Some(full) = expand_short_code(&value) {
                set_cell(row, index, full);
                continue;
            }
            if !value.is_empty()
                && !allowed.contains(&value.as_str())
                && !invalid.contains(&value)
            {
                invalid.push(value);
            }
        }
        if !invalid.is_empty() {
            report.errors.push(format!(
                "Found invalid values in {}: {}",
                column,
                invalid.join(", ")
            ));
        }
    }

    if !report.errors.is_empty() {
        tracing::warn!(
            errors = report.errors.len(),
            dropped = report.dropped,
            "population validation found problems"
        );
    }
    report
}

/// SHA-256 over the header and every surviving cell, hex encoded. The same
/// extract always hashes the same; any cell change produces a new total.
pub fn hash_total(columns: &[String], rows: &[StringRecord]) -> String {
    let mut hasher = Sha256::new();
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
    for row in rows {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update(b";");
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Everything a reviewer needs to tie a population file back to its
/// extraction run.
#[derive(Debug, Serialize)]
pub struct PopulationMetadata {
    pub extraction_timestamp: String,
    pub extracted_by: String,
    pub client_name: String,
    pub start_date: String,
    pub end_date: String,
    pub system_name: String,
    pub record_count: usize,
    pub hash_total: String,
    pub parameter_file: String,
    pub validation_errors: Vec<String>,
}

/// Identify the verified change population and write it to the population
/// file path, with a metadata JSON file alongside. Returns the population
/// file path.
pub fn run_identify(opts: &AuditOptions) -> Result<PathBuf> {
    tracing::info!("starting population identification");

    let params = load_parameters(&opts.data_dir.join(PARAMETER_FILE))?;
    let mut extract = extract_listing(&opts.data_dir.join(LISTING_FILE), &params)?;
    if extract.rows.is_empty() {
        bail!("no change migration records match the extraction period and filters");
    }

    let report = validate_and_clean(&mut extract);
    if extract.rows.is_empty() {
        bail!("no change migration records left after validation");
    }

    let record_count = extract.rows.len();
    let hash = hash_total(extract.columns(), &extract.rows);
    tracing::info!(record_count, hash_total = %hash, "population identified");

    let path = &opts.population_file;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    writer.write_record(extract.columns())?;
    for row in &extract.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let metadata = PopulationMetadata {
        extraction_timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        extracted_by: "population-identification".to_string(),
        client_name: params.client_name.clone(),
        start_date: params.start_date.to_string(),
        end_date: params.end_date.to_string(),
        system_name: if params.systems.is_empty() {
            "All".to_string()
        } else {
            params.systems.join(",")
        },
        record_count,
        hash_total: hash,
        parameter_file: PARAMETER_FILE.to_string(),
        validation_errors: report.errors,
    };
    let metadata_path = dir
        .unwrap_or_else(|| Path::new("."))
        .join("population_metadata.json");
    fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

    tracing::info!(path = %path.display(), "verified population file saved");
    Ok(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_parameters(dir: &Path, assets: &str) -> PathBuf {
        write_file(
            dir,
            PARAMETER_FILE,
            &format!(
                "client_name;start_date;end_date;asset_name\n\
                 acme;2026-01-01;2026-03-31;{}\n",
                assets
            ),
        )
    }

    const LISTING_HEADER: &str = "Change_ID;Asset_Name;Change_Type;Risk_Rating;Status;\
Requestor_ID;Approver_ID;Developer_ID;Migration_DateTime;Source_System";

    #[test]
    fn parameters_load_and_split_systems() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_parameters(dir.path(), "SAP, Workday");

        let params = load_parameters(&path).unwrap();
        assert_eq!(params.client_name, "acme");
        assert_eq!(params.start_date.to_string(), "2026-01-01");
        assert_eq!(params.systems, vec!["SAP", "Workday"]);
    }

    #[test]
    fn all_systems_means_no_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_parameters(dir.path(), "All");
        assert!(load_parameters(&path).unwrap().systems.is_empty());
    }

    #[test]
    fn empty_parameter_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            PARAMETER_FILE,
            "client_name;start_date;end_date;asset_name\n",
        );
        assert!(load_parameters(&path).is_err());
    }

    #[test]
    fn inverted_date_range_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            PARAMETER_FILE,
            "client_name;start_date;end_date;asset_name\nacme;2026-03-31;2026-01-01;\n",
        );
        assert!(load_parameters(&path).is_err());
    }

    fn params(systems: &[&str]) -> ExtractionParameters {
        ExtractionParameters {
            client_name: "acme".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            systems: systems.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn extraction_applies_date_and_system_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            LISTING_FILE,
            &format!(
                "{LISTING_HEADER}\n\
                 CHG1;Billing;application;High;Completed;U1;U2;U3;2026-02-10 09:30:00;SAP\n\
                 CHG2;Billing;application;Low;Completed;U1;U2;U3;2025-11-01 08:00:00;SAP\n\
                 CHG3;Billing;application;Low;Completed;U1;U2;U3;2026-02-11;Workday\n\
                 CHG4;Billing;application;Low;Completed;U1;U2;U3;not-a-date;SAP\n"
            ),
        );

        let extract = extract_listing(&path, &params(&["SAP"])).unwrap();
        // CHG2 is before the window, CHG3 is the wrong system, CHG4 has an
        // unparseable timestamp.
        assert_eq!(extract.rows.len(), 1);
        assert_eq!(extract.invalid_dates, 1);
        assert_eq!(extract.value(&extract.rows[0], "Change_ID"), "CHG1");
    }

    #[test]
    fn date_only_timestamps_are_accepted() {
        assert!(parse_timestamp("2026-02-11").is_some());
        assert!(parse_timestamp("2026-02-11T09:30:00").is_some());
        assert!(parse_timestamp("11/02/2026").is_none());
    }

    fn extract_from(dir: &Path, body: &str) -> Extract {
        let path = write_file(dir, LISTING_FILE, &format!("{LISTING_HEADER}\n{body}"));
        extract_listing(&path, &params(&[])).unwrap()
    }

    #[test]
    fn duplicate_and_empty_change_ids_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut extract = extract_from(
            dir.path(),
            "CHG1;Billing;application;High;Completed;U1;U2;U3;2026-02-10;SAP\n\
             CHG1;Billing;application;Low;Completed;U1;U2;U3;2026-02-11;SAP\n\
             ;Billing;application;Low;Completed;U1;U2;U3;2026-02-12;SAP\n",
        );

        let report = validate_and_clean(&mut extract);
        assert_eq!(extract.rows.len(), 1);
        assert_eq!(report.dropped, 2);
        // First occurrence wins.
        assert_eq!(extract.value(&extract.rows[0], "Risk_Rating"), "High");
        assert!(report.errors.iter().any(|e| e.contains("duplicate Change_ID")));
        assert!(report.errors.iter().any(|e| e.contains("empty Change_ID")));
    }

    #[test]
    fn short_codes_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let mut extract = extract_from(
            dir.path(),
            "CHG1;Billing;app;H;Completed;U1;U2;U3;2026-02-10;SAP\n",
        );

        let report = validate_and_clean(&mut extract);
        assert!(report.errors.is_empty());
        assert_eq!(extract.value(&extract.rows[0], "Risk_Rating"), "High");
        assert_eq!(extract.value(&extract.rows[0], "Change_Type"), "application");
    }

    #[test]
    fn disallowed_values_are_flagged_but_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut extract = extract_from(
            dir.path(),
            "CHG1;Billing;application;Severe;In Progress;U1;U2;U3;2026-02-10;SAP\n",
        );

        let report = validate_and_clean(&mut extract);
        assert_eq!(extract.rows.len(), 1);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Risk_Rating") && e.contains("Severe")));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Status") && e.contains("In Progress")));
    }

    #[test]
    fn hash_total_is_stable_and_sensitive() {
        let columns = vec!["Change_ID".to_string(), "Status".to_string()];
        let rows = vec![StringRecord::from(vec!["CHG1", "Completed"])];
        let again = vec![StringRecord::from(vec!["CHG1", "Completed"])];
        let changed = vec![StringRecord::from(vec!["CHG1", "Closed"])];

        let a = hash_total(&columns, &rows);
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_total(&columns, &again));
        assert_ne!(a, hash_total(&columns, &changed));
    }

    #[test]
    fn identify_writes_a_population_the_audits_can_load() {
        let dir = tempfile::tempdir().unwrap();
        write_parameters(dir.path(), "");
        write_file(
            dir.path(),
            LISTING_FILE,
            &format!(
                "{LISTING_HEADER}\n\
                 CHG1;Billing;app;H;Completed;U1;Ada;U2;2026-02-10 09:30:00;SAP\n\
                 CHG2;Billing;application;Low;Closed;U1;Ada;U2;2026-03-01 10:00:00;SAP\n\
                 CHG3;Billing;application;Low;Closed;U1;Ada;U2;2025-01-01 10:00:00;SAP\n"
            ),
        );
        let opts = AuditOptions {
            data_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            population_file: dir.path().join("verified_population.csv"),
            batch_size: 10,
        };

        let path = run_identify(&opts).unwrap();
        let records = tables::load_population(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_id, "CHG1");
        // Cleaning expanded the short codes before the file was written.
        assert_eq!(records[0].risk_rating, "High");
        assert_eq!(records[0].change_type, "application");

        let metadata: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("population_metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["record_count"], 2);
        assert_eq!(metadata["client_name"], "acme");
        assert_eq!(metadata["system_name"], "All");
        assert_eq!(metadata["hash_total"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn identify_fails_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_parameters(dir.path(), "Mainframe");
        write_file(
            dir.path(),
            LISTING_FILE,
            &format!(
                "{LISTING_HEADER}\n\
                 CHG1;Billing;application;High;Completed;U1;U2;U3;2026-02-10;SAP\n"
            ),
        );
        let opts = AuditOptions {
            data_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            population_file: dir.path().join("verified_population.csv"),
            batch_size: 10,
        };

        assert!(run_identify(&opts).is_err());
    }
}
