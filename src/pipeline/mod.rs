//! Batch validation pipeline
//!
//! The stages that turn joined context rows into one verdict per record:
//! partitioning into batches, concurrent dispatch, response parsing,
//! reconciliation, and exception-reason canonicalization. Each stage is a
//! plain function over explicit values; nothing here touches the network.

pub mod batch;
pub mod canonical;
pub mod dispatch;
pub mod parse;
pub mod reconcile;

pub use batch::{approver_prompt, partition, sod_prompt, Batch};
pub use dispatch::dispatch_batches;
pub use parse::parse_outcomes;
pub use reconcile::reconcile;

/// Verdict for one subject record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Exception,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Exception => "Exception",
            Status::Unknown => "Unknown",
        }
    }

    /// Parse a backend-reported status. Anything unrecognized maps to
    /// `Unknown` rather than failing the record.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("ok") {
            Status::Ok
        } else if raw.eq_ignore_ascii_case("exception") {
            Status::Exception
        } else {
            Status::Unknown
        }
    }
}

/// One parsed entry from a backend response. All fields are optional because
/// the backend is free-form: reconciliation decides what absence means.
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    pub change_id: Option<String>,
    pub status: Option<String>,
    pub reason: Option<String>,
}

/// The final per-record verdict after reconciliation.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub change_id: String,
    pub status: Status,
    pub reason: String,
}

/// Parsed outcomes for one batch, tagged with the batch index so partial
/// results can be traced back to their member rows.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub index: usize,
    pub outcomes: Vec<RawOutcome>,
}

/// A record that can be sent through the pipeline: it only has to name its
/// unique subject identifier.
pub trait Subject {
    fn change_id(&self) -> &str;
}
