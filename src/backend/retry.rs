//! Retry shim around the job backend
//!
//! Runs one logical classification with bounded retries and a fixed
//! inter-attempt delay. Every failure mode (submit error, terminal job
//! failure, timeout, unparseable text) counts as one spent attempt; after
//! the budget is exhausted the caller gets an empty outcome list, never an
//! error. Empty means "no verdicts obtained", not "zero violations".

use super::JobBackend;
use crate::pipeline::{parse_outcomes, RawOutcome};
use std::sync::Arc;
use std::time::Duration;

pub struct RetryClient {
    backend: Arc<dyn JobBackend>,
    max_retries: u32,
    retry_delay: Duration,
    poll_timeout: Duration,
}

impl RetryClient {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        max_retries: u32,
        retry_delay: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            max_retries: max_retries.max(1),
            retry_delay,
            poll_timeout,
        }
    }

    /// Classify one batch. Returns the parsed outcomes from the first
    /// attempt that yields any, or an empty list once the budget is spent.
    pub async fn classify(&self, prompt: &str) -> Vec<RawOutcome> {
        for attempt in 1..=self.max_retries {
            match self.try_once(prompt).await {
                Ok(outcomes) if !outcomes.is_empty() => return outcomes,
                Ok(_) => {
                    tracing::warn!(
                        attempt,
                        max = self.max_retries,
                        "backend produced no usable result"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        attempt,
                        max = self.max_retries,
                        error = %err,
                        "classification attempt failed"
                    );
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        tracing::error!(attempts = self.max_retries, "classification retries exhausted");
        Vec::new()
    }

    async fn try_once(&self, prompt: &str) -> anyhow::Result<Vec<RawOutcome>> {
        let handle = self.backend.submit(prompt).await?;
        match self.backend.await_result(&handle, self.poll_timeout).await? {
            Some(text) => Ok(parse_outcomes(&text)),
            None => Ok(Vec::new()),
        }
    }
}
