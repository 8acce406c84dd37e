use std::collections::BTreeSet;

use crate::pipeline::CommandPipeline;

/// A composed pipeline together with the benchmark it came from, so
/// batches can aggregate per-benchmark requirements.
#[derive(Debug, Clone)]
pub struct TaggedPipeline {
    pub benchmark: String,
    pub requires_sandbox: bool,
    pub pipeline: CommandPipeline,
}

/// The pipelines assigned to one scheduling slot.
#[derive(Debug, Clone)]
pub struct JobBatch {
    pub pipelines: Vec<CommandPipeline>,
    pub benchmarks: BTreeSet<String>,
    pub needs_sandbox: bool,
}

impl JobBatch {
    pub fn render_command(&self) -> String {
        self.pipelines
            .iter()
            .map(CommandPipeline::render)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// Distribute pipelines over at most `num_jobs` batches, round-robin:
/// pipeline `i` goes to batch `i % num_jobs`. This interleaves
/// benchmarks of different cardinalities instead of grouping contiguous
/// ranges, so batch sizes differ by at most one. `num_jobs == -1` means
/// one job per pipeline. Empty slots are dropped.
pub fn batch_pipelines(
    items: &[TaggedPipeline],
    num_jobs: i64,
    force_sandbox: bool,
) -> Vec<JobBatch> {
    if items.is_empty() {
        return Vec::new();
    }
    let slots = if num_jobs == -1 {
        items.len()
    } else {
        num_jobs.max(1) as usize
    };
    let mut batches = Vec::new();
    for slot in 0..slots {
        let assigned: Vec<&TaggedPipeline> = items.iter().skip(slot).step_by(slots).collect();
        if assigned.is_empty() {
            continue;
        }
        let benchmarks: BTreeSet<String> =
            assigned.iter().map(|item| item.benchmark.clone()).collect();
        let needs_sandbox =
            force_sandbox || assigned.iter().any(|item| item.requires_sandbox);
        batches.push(JobBatch {
            pipelines: assigned.iter().map(|item| item.pipeline.clone()).collect(),
            benchmarks,
            needs_sandbox,
        });
    }
    batches
}
