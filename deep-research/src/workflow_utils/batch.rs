//! Batch execution utilities for parallel task processing

use anyhow::{anyhow, Result};
use deep_research_sdk::Stage;
use futures::{stream::FuturesUnordered, Future, FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;

/// Context provided to each task in a batch
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Stage the batch runs in (for logging)
    pub stage: Stage,
    /// Position of the item in the input (0-indexed)
    pub index: usize,
    /// Task number (1-indexed for display)
    pub task_number: usize,
    /// Total number of tasks in this batch
    pub total_tasks: usize,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Execute items concurrently with at most `max_concurrency` tasks active
///
/// # Arguments
/// - `stage`: Stage the batch belongs to
/// - `items`: Items to process
/// - `max_concurrency`: Maximum concurrently active tasks (0 is treated as 1)
/// - `task_executor`: Function that processes each item, receives (item, context)
///
/// # Returns
/// One result per item, in input order regardless of completion order
///
/// # Error Handling
/// Failures are isolated: an error or panic in one task becomes that slot's `Err`
/// and every other task still runs to completion.
///
/// # Example
/// ```rust,ignore
/// let results = execute_batch(Stage::Research, topics, 3, |topic, ctx| async move {
///     research(ctx.index, topic).await
/// })
/// .await;
/// ```
pub async fn execute_batch<T, F, Fut, R>(
    stage: Stage,
    items: Vec<T>,
    max_concurrency: usize,
    task_executor: F,
) -> Vec<Result<R>>
where
    F: Fn(T, TaskContext) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let total = items.len();
    let sem = Semaphore::new(max_concurrency.max(1));
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let ctx = TaskContext {
            stage,
            index: idx,
            task_number: idx + 1,
            total_tasks: total,
        };
        let sem = &sem;
        let executor = &task_executor;

        tasks.push(async move {
            // Acquire permit (waits while max_concurrency tasks are running)
            let result = match sem.acquire().await {
                Ok(_permit) => AssertUnwindSafe(executor(item, ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(anyhow!("task panicked: {}", panic_message(payload)))
                    }),
                Err(_) => Err(anyhow!("Semaphore closed")),
            };
            (idx, result)
        });
    }

    let mut slots: Vec<Option<Result<R>>> = (0..total).map(|_| None).collect();
    while let Some((idx, result)) = tasks.next().await {
        slots[idx] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(anyhow!("task did not complete"))))
        .collect()
}
