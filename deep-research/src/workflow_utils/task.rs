//! Per-task progress events around one unit of fan-out work

use anyhow::Result;
use deep_research_sdk::{log_task_complete, log_task_failed, log_task_start};
use std::future::Future;
use std::time::Instant;

use crate::research::errors::StageFailure;
use crate::workflow_utils::batch::TaskContext;

/// Await `work` between a task-started and a task-completed/failed event.
///
/// The completion event carries `summarize(&result)` and the elapsed time. The failure
/// event carries the same reason the caller will record for the slot, so the progress
/// stream and the final batch agree.
pub async fn execute_task<Fut, R, S>(
    ctx: TaskContext,
    task_id: &str,
    description: &str,
    work: Fut,
    summarize: S,
) -> Result<R>
where
    Fut: Future<Output = Result<R>>,
    S: FnOnce(&R) -> String,
{
    log_task_start!(ctx.stage, task_id, description, ctx.total_tasks);
    let started = Instant::now();

    let outcome = work.await;
    match &outcome {
        Ok(result) => {
            log_task_complete!(
                task_id,
                format!("{} in {:.1}s", summarize(result), started.elapsed().as_secs_f64())
            );
        }
        Err(e) => {
            let reason = StageFailure::reason_of(e);
            tracing::debug!(task_id, task = ctx.task_number, %reason, "task failed");
            log_task_failed!(task_id, reason);
        }
    }
    outcome
}
