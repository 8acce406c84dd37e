//! Work-unit planning and completion tracking for large LLM
//! generation/evaluation batches.
//!
//! The planner expands a benchmark request into a seed x chunk work
//! matrix, probes persisted completion markers to find what is left to
//! do, composes idempotent command pipelines for the remaining units,
//! distributes them over a bounded number of cluster jobs, and wires
//! dependency chains. It never executes anything itself: the output is
//! an [`plan::ExperimentPlan`] handed to an execution backend.

pub mod backend;
pub mod batch;
pub mod chain;
pub mod matrix;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod server;
pub mod spec;

pub use backend::{DryRunBackend, ExecutionBackend};
pub use batch::{batch_pipelines, JobBatch, TaggedPipeline};
pub use chain::{chain_dependent_tasks, PlannedTask};
pub use matrix::{build_work_matrix, ChunkPlan, SeedPlan, WorkUnit};
pub use pipeline::{builder_for, CommandBuilder, CommandPipeline, ComposeRequest, Sampling, Stage};
pub use plan::{plan_eval, plan_generate, EvalRequest, ExperimentPlan, GenerateRequest};
pub use probe::{find_remaining_work, ExecOutput, LocalShell, Probe, RemoteExec, SshShell};
pub use server::{configure_client, port_policy, ClientSetup, HostingRequest, PortPolicy, ServerConfig};
pub use spec::{benchmark_defaults, parse_benchmarks, BenchmarkRequest, ExtraDatasetMode, GenerationKind};
