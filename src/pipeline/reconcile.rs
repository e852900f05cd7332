//! Reconciliation and gap-filling
//!
//! Merges backend outcomes back onto the input record set so that every
//! input record yields exactly one output record, whatever the backend did.
//! Rows the backend dropped get an explicit `Unknown` verdict whose reason
//! names the cause, so the report always says why a record has no real
//! verdict.

use super::{BatchResult, Outcome, RawOutcome, Status};
use crate::tables::UNKNOWN;
use std::collections::HashMap;

/// Reason used when an individual record was missing from the responses.
pub const REASON_NOT_PROCESSED: &str = "Record not processed by AI analysis";
/// Reason used when the whole run produced zero outcomes.
pub const REASON_RUN_FAILED: &str = "AI analysis failed";
/// Reason used when the responses never carried the canonical fields.
pub const REASON_SCHEMA_MISSING: &str = "AI results missing required columns";

fn fill_all(ids: &[String], reason: &str) -> Vec<Outcome> {
    ids.iter()
        .map(|id| Outcome {
            change_id: id.clone(),
            status: Status::Unknown,
            reason: reason.to_string(),
        })
        .collect()
}

/// Produce exactly one outcome per input identifier, in input order.
pub fn reconcile(ids: &[String], batches: &[BatchResult]) -> Vec<Outcome> {
    let all: Vec<&RawOutcome> = batches.iter().flat_map(|b| b.outcomes.iter()).collect();

    if all.is_empty() {
        tracing::warn!("no results returned from AI analysis");
        return fill_all(ids, REASON_RUN_FAILED);
    }

    // The canonical fields must be locatable somewhere in the combined
    // results; if one of them never appears the response schema is unusable
    // and a partial merge would be misleading.
    let has_id = all.iter().any(|o| o.change_id.is_some());
    let has_status = all.iter().any(|o| o.status.is_some());
    let has_reason = all.iter().any(|o| o.reason.is_some());
    if !has_id || !has_status || !has_reason {
        tracing::error!(
            has_id,
            has_status,
            has_reason,
            "required columns missing from AI results"
        );
        return fill_all(ids, REASON_SCHEMA_MISSING);
    }

    let mut by_id: HashMap<&str, &RawOutcome> = HashMap::new();
    for outcome in &all {
        if let Some(id) = outcome.change_id.as_deref() {
            // First verdict wins if the backend repeats a record.
            by_id.entry(id).or_insert(outcome);
        }
    }

    let mut missing = 0usize;
    let reconciled = ids
        .iter()
        .map(|id| match by_id.get(id.as_str()) {
            Some(raw) => Outcome {
                change_id: id.clone(),
                status: raw.status.as_deref().map_or(Status::Unknown, Status::parse),
                // A verdict without a reason still gets a visible cell in
                // the report.
                reason: raw
                    .reason
                    .clone()
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            },
            None => {
                missing += 1;
                Outcome {
                    change_id: id.clone(),
                    status: Status::Unknown,
                    reason: REASON_NOT_PROCESSED.to_string(),
                }
            }
        })
        .collect();

    if missing > 0 {
        tracing::warn!(missing, "some records were not processed by the backend");
    }
    reconciled
}
