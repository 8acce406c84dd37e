use anyhow::Result;
use tracing::info;

use crate::plan::ExperimentPlan;

/// Interface to the external cluster/experiment-management service. The
/// planner computes an [`ExperimentPlan`]; everything that happens after
/// submission (scheduling, retries, resource allocation) is the
/// backend's business.
pub trait ExecutionBackend {
    fn submit(&mut self, plan: &ExperimentPlan) -> Result<()>;
}

/// Logs what would be submitted without talking to any cluster.
#[derive(Debug, Default)]
pub struct DryRunBackend;

impl ExecutionBackend for DryRunBackend {
    fn submit(&mut self, plan: &ExperimentPlan) -> Result<()> {
        info!(
            "experiment {}: {} task(s) planned",
            plan.expname,
            plan.tasks.len()
        );
        for task in &plan.tasks {
            if task.depends_on.is_empty() {
                info!("task {}: {}", task.task_id, task.command);
            } else {
                info!(
                    "task {} (after {}): {}",
                    task.task_id,
                    task.depends_on.join(", "),
                    task.command
                );
            }
        }
        Ok(())
    }
}
