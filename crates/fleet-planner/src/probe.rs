use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::process::Command;

use fleet_core::{marker_path, ClusterConfig, ExecutorKind, PlanError, PlanResult};
use tracing::{info, warn};

use crate::matrix::WorkUnit;

/// Probe commands are grouped so one remote invocation never checks more
/// than this many markers, bounding round trips and command-line length.
pub const PROBE_BATCH_SIZE: usize = 16;

pub struct ExecOutput {
    pub stdout: String,
    pub exit_code: i32,
}

/// Minimal remote-exec capability used by the completion probe.
pub trait RemoteExec {
    fn run(&self, command: &str) -> io::Result<ExecOutput>;
}

/// Runs probe commands on the local machine through `sh -c`.
pub struct LocalShell;

impl RemoteExec for LocalShell {
    fn run(&self, command: &str) -> io::Result<ExecOutput> {
        let output = Command::new("sh").arg("-c").arg(command).output()?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Runs probe commands on a cluster login node over ssh.
pub struct SshShell {
    pub host: String,
    pub user: Option<String>,
}

impl RemoteExec for SshShell {
    fn run(&self, command: &str) -> io::Result<ExecOutput> {
        let target = match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        };
        let output = Command::new("ssh").arg(target).arg(command).output()?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// How the probe reaches the output location: a local directory is
/// checked with direct filesystem calls, a remote one with batched shell
/// existence checks.
pub enum Probe {
    Local,
    Remote(Box<dyn RemoteExec>),
}

impl Probe {
    pub fn for_cluster(config: &ClusterConfig) -> Probe {
        match (config.executor, &config.ssh_tunnel) {
            (ExecutorKind::Slurm, Some(tunnel)) => Probe::Remote(Box::new(SshShell {
                host: tunnel.host.clone(),
                user: tunnel.user.clone(),
            })),
            _ => Probe::Local,
        }
    }
}

#[derive(Debug)]
pub struct RemainingWork {
    pub remaining: Vec<WorkUnit>,
    pub completed: Vec<WorkUnit>,
}

fn seed_token(seed: Option<i64>) -> String {
    match seed {
        Some(seed) => seed.to_string(),
        None => "NONE".to_string(),
    }
}

fn parse_token(token: &str) -> PlanResult<Option<i64>> {
    if token == "NONE" {
        return Ok(None);
    }
    token
        .parse()
        .map(Some)
        .map_err(|_| PlanError::probe(format!("unparseable probe token '{}'", token)))
}

fn unit_marker(
    status_dir: &str,
    output_prefix: &str,
    num_chunks: Option<i64>,
    unit: &WorkUnit,
) -> PlanResult<String> {
    let chunk = match unit.chunk_id {
        Some(chunk_id) => {
            let num_chunks = num_chunks.ok_or_else(|| {
                PlanError::config("chunked work unit without a configured num_chunks")
            })?;
            Some((chunk_id, num_chunks))
        }
        None => None,
    };
    Ok(marker_path(status_dir, output_prefix, unit.seed, chunk))
}

/// Determine which work units still need to run, by marker existence.
/// All-or-nothing: a failed remote check aborts planning rather than
/// producing a partial plan.
pub fn find_remaining_work(
    probe: &Probe,
    status_dir: &str,
    output_prefix: &str,
    num_chunks: Option<i64>,
    units: &[WorkUnit],
    rerun_done: bool,
) -> PlanResult<RemainingWork> {
    if rerun_done {
        return Ok(RemainingWork {
            remaining: units.to_vec(),
            completed: Vec::new(),
        });
    }

    let mut missing: BTreeSet<(Option<i64>, Option<i64>)> = BTreeSet::new();
    match probe {
        Probe::Local => {
            for unit in units {
                let marker = unit_marker(status_dir, output_prefix, num_chunks, unit)?;
                if !Path::new(&marker).exists() {
                    missing.insert((unit.seed, unit.chunk_id));
                }
            }
        }
        Probe::Remote(exec) => {
            let mut checks = Vec::with_capacity(units.len());
            for unit in units {
                let marker = unit_marker(status_dir, output_prefix, num_chunks, unit)?;
                checks.push(format!(
                    "if [ ! -f \"{}\" ]; then echo \"MISSING:{}:{}\"; fi",
                    marker,
                    seed_token(unit.seed),
                    seed_token(unit.chunk_id)
                ));
            }
            let mut outputs = Vec::new();
            for group in checks.chunks(PROBE_BATCH_SIZE) {
                let command = format!("bash -c '{}'", group.join("; "));
                let result = exec
                    .run(&command)
                    .map_err(|e| PlanError::probe(format!("remote check failed: {}", e)))?;
                if result.exit_code != 0 {
                    return Err(PlanError::probe(format!(
                        "remote check exited with status {}",
                        result.exit_code
                    )));
                }
                outputs.push(result.stdout);
            }
            for line in outputs.join("\n").lines() {
                let line = line.trim();
                if let Some(rest) = line.strip_prefix("MISSING:") {
                    let (seed, chunk) = rest.split_once(':').ok_or_else(|| {
                        PlanError::probe(format!("malformed probe line '{}'", line))
                    })?;
                    missing.insert((parse_token(seed)?, parse_token(chunk)?));
                }
            }
        }
    }

    let mut remaining = Vec::new();
    let mut completed = Vec::new();
    for unit in units {
        if missing.contains(&(unit.seed, unit.chunk_id)) {
            remaining.push(*unit);
        } else {
            completed.push(*unit);
        }
    }
    log_probe_summary(&remaining, &completed);
    Ok(RemainingWork { remaining, completed })
}

fn seed_summary(units: &[WorkUnit]) -> String {
    let mut by_seed: Vec<(Option<i64>, Vec<Option<i64>>)> = Vec::new();
    for unit in units {
        match by_seed.iter_mut().find(|(seed, _)| *seed == unit.seed) {
            Some((_, chunks)) => chunks.push(unit.chunk_id),
            None => by_seed.push((unit.seed, vec![unit.chunk_id])),
        }
    }
    by_seed
        .iter()
        .map(|(seed, chunks)| {
            let seed = match seed {
                Some(seed) => seed.to_string(),
                None => "None".to_string(),
            };
            if chunks.iter().any(|chunk| chunk.is_some()) {
                let chunk_list = chunks
                    .iter()
                    .flatten()
                    .map(|chunk| chunk.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} (chunks: {})", seed, chunk_list)
            } else {
                seed
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn log_probe_summary(remaining: &[WorkUnit], completed: &[WorkUnit]) {
    if remaining.is_empty() {
        warn!("All jobs are completed. No jobs will be launched (to override set --rerun-done).");
        return;
    }
    if completed.is_empty() {
        info!(
            "The following jobs will be launched: seeds {}",
            seed_summary(remaining)
        );
        return;
    }
    warn!(
        "The following jobs are incomplete and will be launched: seeds {}",
        seed_summary(remaining)
    );
    warn!(
        "The following jobs are completed and will be skipped (to override set --rerun-done): seeds {}",
        seed_summary(completed)
    );
}
