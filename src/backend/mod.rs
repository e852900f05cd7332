//! Reasoning backend boundary
//!
//! The pipeline only depends on one contract: submit a prompt, eventually
//! get back either text or nothing. The asynchronous job protocol (thread,
//! run, poll-until-terminal, fetch last message) lives behind `JobBackend`
//! so the transport is swappable without touching retry, parse, or
//! reconcile logic.

pub mod http;
pub mod retry;

pub use http::AgentsBackend;
pub use retry::RetryClient;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Opaque handle to one submitted analysis job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub thread_id: String,
    pub run_id: String,
}

/// One logical "ask the backend to classify a batch" operation.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Start a job for the given prompt.
    async fn submit(&self, prompt: &str) -> Result<JobHandle>;

    /// Wait for the job to reach a terminal state, up to `timeout` of wall
    /// clock. `Ok(None)` means the job failed, expired, or produced no text;
    /// only transport-level problems surface as errors.
    async fn await_result(&self, handle: &JobHandle, timeout: Duration) -> Result<Option<String>>;
}
