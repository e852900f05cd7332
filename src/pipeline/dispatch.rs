//! Concurrent batch dispatch
//!
//! Fans out one classification per batch and collects the results. Batches
//! are independent: a batch that exhausts its retries simply contributes an
//! empty outcome list, it never aborts its siblings. Population sizes are
//! audit extracts, not streaming volumes, so the fan-out is unbounded.

use super::batch::Batch;
use super::BatchResult;
use crate::backend::RetryClient;
use futures::future::join_all;

/// Dispatch every batch concurrently through the retrying client. Results
/// keep their batch index so partial output can be traced back to member
/// rows during reconciliation.
pub async fn dispatch_batches(client: &RetryClient, batches: &[Batch]) -> Vec<BatchResult> {
    tracing::info!(batches = batches.len(), "dispatching analysis batches");

    let futures: Vec<_> = batches
        .iter()
        .map(|batch| async move {
            tracing::info!(
                batch = batch.index + 1,
                total = batches.len(),
                records = batch.member_ids.len(),
                "sending batch for analysis"
            );
            BatchResult {
                index: batch.index,
                outcomes: client.classify(&batch.prompt).await,
            }
        })
        .collect();

    let results = join_all(futures).await;
    for result in &results {
        tracing::info!(
            batch = result.index + 1,
            outcomes = result.outcomes.len(),
            "batch completed"
        );
    }
    results
}
