//! Bounded fan-out/fan-in over independent units of work.
//!
//! Every concurrent stage (candidate generation, task execution, refinement
//! chunks) goes through [`run_batch`]. Units run concurrently behind a
//! semaphore sized `max(1, min(pool_size, units))`, results are consumed in
//! completion order, and a failing unit never cancels its siblings.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// What happens when a unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and move on.
    Isolate,
    /// Re-run the failed unit once, inline in the collecting loop, before
    /// recording the failure.
    IsolateAndRetryOnce,
}

/// Result of one unit, tagged with its submission index.
#[derive(Debug)]
pub struct UnitOutcome<T, E> {
    pub index: usize,
    pub result: Result<T, E>,
    /// Whether `result` comes from the inline retry.
    pub retried: bool,
}

impl<T, E> UnitOutcome<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Worker pool width for `units` units: never zero, never wider than needed.
pub fn pool_width(pool_size: usize, units: usize) -> usize {
    pool_size.min(units).max(1)
}

/// Runs `work` over every input with bounded concurrency.
///
/// Outcomes are returned in completion order; callers that need submission
/// order sort by [`UnitOutcome::index`].
pub async fn run_batch<I, T, E, F, Fut>(
    stage: &str,
    inputs: Vec<I>,
    pool_size: usize,
    policy: FailurePolicy,
    work: F,
) -> Vec<UnitOutcome<T, E>>
where
    I: Clone,
    E: Display,
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if inputs.is_empty() {
        return Vec::new();
    }

    let width = pool_width(pool_size, inputs.len());
    debug!(stage, units = inputs.len(), width, "Starting batch");
    let semaphore = Arc::new(Semaphore::new(width));

    let mut pending: FuturesUnordered<_> = inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let semaphore = Arc::clone(&semaphore);
            let unit = work(index, input.clone());
            async move {
                let _permit = semaphore.acquire().await;
                (index, input, unit.await)
            }
        })
        .collect();

    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some((index, input, result)) = pending.next().await {
        let outcome = match result {
            Ok(value) => UnitOutcome {
                index,
                result: Ok(value),
                retried: false,
            },
            Err(err) if policy == FailurePolicy::IsolateAndRetryOnce => {
                warn!(stage, unit = index, error = %err, "Unit failed; retrying inline");
                let result = work(index, input).await;
                if let Err(err) = &result {
                    warn!(stage, unit = index, error = %err, "Retry failed");
                }
                UnitOutcome {
                    index,
                    result,
                    retried: true,
                }
            }
            Err(err) => {
                warn!(stage, unit = index, error = %err, "Unit failed");
                UnitOutcome {
                    index,
                    result: Err(err),
                    retried: false,
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}
