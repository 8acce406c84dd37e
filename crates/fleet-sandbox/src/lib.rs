//! Sandboxed code-execution service consumed by benchmarks that must run
//! model-generated code. Execution happens in an isolated subprocess
//! under a hard memory ceiling and a caller-supplied wall-clock budget;
//! the HTTP handler always answers with a structured result record.

pub mod client;
pub mod server;

pub use client::SandboxClient;
pub use server::{serve, ExecutionRequest, ExecutionResult, Sandbox, DEFAULT_MEMORY_LIMIT_BYTES};
