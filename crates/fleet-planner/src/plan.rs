use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use fleet_core::{ClusterConfig, ExecutorKind, PlanError, PlanResult};

use crate::batch::{batch_pipelines, TaggedPipeline};
use crate::chain::{chain_dependent_tasks, PlannedTask};
use crate::matrix::{build_work_matrix, resolve_chunks, resolve_seeds, ChunkPlan, SeedPlan};
use crate::pipeline::{builder_for, ComposeRequest, Sampling};
use crate::probe::{find_remaining_work, Probe};
use crate::server::{configure_client, port_policy, sandbox_port, HostingRequest};
use crate::spec::{
    benchmark_defaults, parse_benchmarks, ExtraDatasetMode, GenerationKind,
    GENSELECT_PREPROCESS_MODULE,
};

/// Everything one planner invocation hands to the execution backend.
/// A pure function of (configuration, marker state): re-running with no
/// new markers produces the same tasks again.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentPlan {
    pub expname: String,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<PlannedTask>,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub expname: String,
    pub output_dir: String,
    pub output_prefix: String,
    pub generation_type: GenerationKind,
    pub model: Option<String>,
    pub server_address: Option<String>,
    pub server_type: String,
    pub server_gpus: Option<u32>,
    pub server_nodes: u32,
    pub server_args: String,
    pub server_entrypoint: Option<String>,
    pub dependent_jobs: usize,
    pub num_random_seeds: Option<usize>,
    pub random_seeds: Option<String>,
    pub starting_seed: i64,
    pub num_chunks: Option<i64>,
    pub chunk_ids: Option<String>,
    pub preprocess_cmd: Option<String>,
    pub postprocess_cmd: Option<String>,
    pub eval_args: Option<String>,
    pub genselect_args: Option<String>,
    pub run_after: Vec<String>,
    pub rerun_done: bool,
    pub with_sandbox: bool,
    pub exclusive: bool,
    pub partition: Option<String>,
    pub time_min: Option<String>,
    pub extra_args: String,
    pub log_dir: Option<String>,
}

impl GenerateRequest {
    pub fn new(expname: &str, output_dir: &str, server_type: &str) -> Self {
        GenerateRequest {
            expname: expname.to_string(),
            output_dir: output_dir.to_string(),
            output_prefix: "output".to_string(),
            generation_type: GenerationKind::Generate,
            model: None,
            server_address: None,
            server_type: server_type.to_string(),
            server_gpus: None,
            server_nodes: 1,
            server_args: String::new(),
            server_entrypoint: None,
            dependent_jobs: 0,
            num_random_seeds: None,
            random_seeds: None,
            starting_seed: 0,
            num_chunks: None,
            chunk_ids: None,
            preprocess_cmd: None,
            postprocess_cmd: None,
            eval_args: None,
            genselect_args: None,
            run_after: Vec::new(),
            rerun_done: false,
            with_sandbox: false,
            exclusive: true,
            partition: None,
            time_min: None,
            extra_args: String::new(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub expname: String,
    pub output_dir: String,
    pub output_prefix: String,
    /// `<benchmark>:<num samples>` entries, comma-separated.
    pub benchmarks: String,
    pub data_dir: Option<String>,
    pub split: Option<String>,
    pub model: Option<String>,
    pub server_address: Option<String>,
    pub server_type: String,
    pub server_gpus: Option<u32>,
    pub server_nodes: u32,
    pub server_args: String,
    pub server_entrypoint: Option<String>,
    pub starting_seed: i64,
    pub num_jobs: i64,
    pub num_chunks: Option<i64>,
    pub chunk_ids: Option<String>,
    pub extra_eval_args: String,
    pub add_greedy: bool,
    pub run_after: Vec<String>,
    pub rerun_done: bool,
    pub with_sandbox: bool,
    pub extra_dataset_mode: ExtraDatasetMode,
    pub exclusive: bool,
    pub partition: Option<String>,
    pub time_min: Option<String>,
    pub extra_args: String,
    pub log_dir: Option<String>,
}

impl EvalRequest {
    pub fn new(expname: &str, output_dir: &str, benchmarks: &str, server_type: &str) -> Self {
        EvalRequest {
            expname: expname.to_string(),
            output_dir: output_dir.to_string(),
            output_prefix: "output".to_string(),
            benchmarks: benchmarks.to_string(),
            data_dir: None,
            split: None,
            model: None,
            server_address: None,
            server_type: server_type.to_string(),
            server_gpus: None,
            server_nodes: 1,
            server_args: String::new(),
            server_entrypoint: None,
            starting_seed: 0,
            num_jobs: -1,
            num_chunks: None,
            chunk_ids: None,
            extra_eval_args: String::new(),
            add_greedy: false,
            run_after: Vec::new(),
            rerun_done: false,
            with_sandbox: false,
            extra_dataset_mode: ExtraDatasetMode::Local,
            exclusive: true,
            partition: None,
            time_min: None,
            extra_args: String::new(),
            log_dir: None,
        }
    }
}

fn join_args(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plan a generation experiment: one task per remaining work unit, with
/// optional dependent-job chains and the genselect preprocess task.
pub fn plan_generate(
    config: &ClusterConfig,
    probe: &Probe,
    req: &GenerateRequest,
) -> PlanResult<ExperimentPlan> {
    let kind = req.generation_type;
    let seed_plan = SeedPlan {
        seed_spec: req.random_seeds.clone(),
        num_samples: req.num_random_seeds,
        starting_seed: req.starting_seed,
        add_greedy: false,
    };
    let chunk_plan = ChunkPlan {
        num_chunks: req.num_chunks,
        chunk_spec: req.chunk_ids.clone(),
    };
    let units = build_work_matrix(kind, &seed_plan, &chunk_plan)?;

    let status_dir = config.unmounted_path(&req.output_dir);
    let work = find_remaining_work(
        probe,
        &status_dir,
        &req.output_prefix,
        req.num_chunks,
        &units,
        req.rerun_done,
    )?;

    let mut plan = ExperimentPlan {
        expname: req.expname.clone(),
        created_at: Utc::now(),
        tasks: Vec::new(),
    };
    if work.remaining.is_empty() {
        return Ok(plan);
    }

    let policy = port_policy(req.server_gpus, req.exclusive);
    let builder = builder_for(kind);
    let container = config.container("fleet");
    let log_dir = req
        .log_dir
        .clone()
        .unwrap_or_else(|| format!("{}/generation-logs", req.output_dir));

    let mut initial_deps = Vec::new();
    if kind == GenerationKind::Genselect {
        let seed_count = resolve_seeds(&seed_plan)?.len();
        let command = join_args(&[
            &format!(
                "python -m {} ++num_random_seeds={} ++output_dir={}",
                GENSELECT_PREPROCESS_MODULE, seed_count, req.output_dir
            ),
            req.genselect_args.as_deref().unwrap_or(""),
        ]);
        plan.tasks.push(PlannedTask {
            task_id: "preprocess_genselect".to_string(),
            name: "preprocess_genselect".to_string(),
            command,
            server_address: None,
            server: None,
            with_sandbox: false,
            sandbox_port: None,
            depends_on: Vec::new(),
            run_after: req.run_after.clone(),
            log_dir: format!("{}/preprocess-logs", req.output_dir),
            container: container.clone(),
            partition: req.partition.clone(),
            time_min: req.time_min.clone(),
            exclusive: req.exclusive,
        });
        initial_deps.push("preprocess_genselect".to_string());
    }

    // The genselect preprocess replaces any inline preprocess command;
    // for the other kinds the caller's command runs inside the pipeline.
    let inline_preprocess = if kind == GenerationKind::Genselect {
        None
    } else {
        req.preprocess_cmd.as_deref()
    };

    for unit in &work.remaining {
        let setup = configure_client(
            &HostingRequest {
                server_address: req.server_address.as_deref(),
                model: req.model.as_deref(),
                server_type: &req.server_type,
                server_gpus: req.server_gpus,
                server_nodes: req.server_nodes,
                server_args: &req.server_args,
                server_entrypoint: req.server_entrypoint.as_deref(),
                default_entrypoint: builder.default_server_entrypoint(),
            },
            policy,
        )?;
        let extra_args = join_args(&[&req.extra_args, &setup.client_args]);
        let pipeline = builder.build_pipeline(&ComposeRequest {
            output_dir: &req.output_dir,
            output_prefix: &req.output_prefix,
            unit: *unit,
            num_chunks: req.num_chunks,
            extra_args: &extra_args,
            eval_args: req.eval_args.as_deref(),
            preprocess_cmd: inline_preprocess,
            postprocess_cmd: req.postprocess_cmd.as_deref(),
            sampling: Sampling::generation_defaults(),
            announce: None,
        })?;

        let mut name = req.expname.clone();
        if let Some(seed) = unit.seed {
            name.push_str(&format!("-rs{}", seed));
        }
        if let Some(chunk_id) = unit.chunk_id {
            name.push_str(&format!("-chunk{}", chunk_id));
        }
        let base = PlannedTask {
            task_id: name.clone(),
            name,
            command: pipeline.render(),
            server_address: Some(setup.server_address),
            server: setup.server,
            with_sandbox: req.with_sandbox,
            sandbox_port: sandbox_port(policy),
            depends_on: Vec::new(),
            run_after: req.run_after.clone(),
            log_dir: log_dir.clone(),
            container: container.clone(),
            partition: req.partition.clone(),
            time_min: req.time_min.clone(),
            exclusive: req.exclusive,
        };
        plan.tasks
            .extend(chain_dependent_tasks(base, req.dependent_jobs, &initial_deps));
    }
    Ok(plan)
}

/// Plan a benchmark evaluation: compose gen+eval pipelines for every
/// remaining unit across all benchmarks and spread them over at most
/// `num_jobs` cluster jobs.
pub fn plan_eval(
    config: &ClusterConfig,
    probe: &Probe,
    req: &EvalRequest,
) -> PlanResult<ExperimentPlan> {
    let benchmarks = parse_benchmarks(&req.benchmarks)?;
    if req.extra_dataset_mode == ExtraDatasetMode::Cluster
        && config.executor != ExecutorKind::Slurm
    {
        return Err(PlanError::config(
            "Extra datasets type is set to 'cluster', but the executor is not 'slurm'. \
             Please use 'local' or change the cluster config.",
        ));
    }

    let chunk_plan = ChunkPlan {
        num_chunks: req.num_chunks,
        chunk_spec: req.chunk_ids.clone(),
    };
    let num_runs = resolve_chunks(GenerationKind::Generate, &chunk_plan)?
        .map(|chunk_ids| chunk_ids.len())
        .unwrap_or(1);

    let policy = port_policy(req.server_gpus, req.exclusive);
    let builder = builder_for(GenerationKind::Generate);
    let setup = configure_client(
        &HostingRequest {
            server_address: req.server_address.as_deref(),
            model: req.model.as_deref(),
            server_type: &req.server_type,
            server_gpus: req.server_gpus,
            server_nodes: req.server_nodes,
            server_args: &req.server_args,
            server_entrypoint: req.server_entrypoint.as_deref(),
            default_entrypoint: builder.default_server_entrypoint(),
        },
        policy,
    )?;

    let data_dir = req.data_dir.clone().unwrap_or_else(|| "/data".to_string());
    let mut tagged = Vec::new();
    for benchmark in &benchmarks {
        let defaults = benchmark_defaults(&benchmark.name);
        if defaults.requires_sandbox && !req.with_sandbox {
            warn!(
                "Found benchmark ({}) which requires sandbox mode, enabled sandbox for it.",
                benchmark.name
            );
        }
        let bench_dir = format!("{}/eval-results/{}", req.output_dir, benchmark.name);
        let bench_path = benchmark.name.replace('.', "/");
        let split = req.split.as_deref().unwrap_or(defaults.split);
        let input_file = format!("{}/{}/{}.jsonl", data_dir, bench_path, split);
        let gen_args = join_args(&[
            &format!("++input_file={}", input_file),
            &format!("++prompt_config={}", defaults.prompt_config),
            defaults.generation_args,
            &req.extra_args,
            &setup.client_args,
        ]);
        let eval_args = join_args(&[defaults.eval_args, &req.extra_eval_args]);

        let seed_plan = SeedPlan {
            seed_spec: None,
            num_samples: Some(benchmark.num_samples),
            starting_seed: req.starting_seed,
            add_greedy: req.add_greedy,
        };
        let units = build_work_matrix(GenerationKind::Generate, &seed_plan, &chunk_plan)?;
        let status_dir = config.unmounted_path(&bench_dir);
        let work = find_remaining_work(
            probe,
            &status_dir,
            &req.output_prefix,
            req.num_chunks,
            &units,
            req.rerun_done,
        )?;

        for unit in &work.remaining {
            // Greedy decoding next to sampled seeds pins the temperature;
            // a greedy-only benchmark keeps its own defaults.
            let extra_args = if unit.seed.is_none() && benchmark.num_samples > 0 {
                format!("{} ++inference.temperature=0.0", gen_args)
            } else {
                gen_args.clone()
            };
            let pipeline = builder.build_pipeline(&ComposeRequest {
                output_dir: &bench_dir,
                output_prefix: &req.output_prefix,
                unit: *unit,
                num_chunks: req.num_chunks,
                extra_args: &extra_args,
                eval_args: Some(&eval_args),
                preprocess_cmd: None,
                postprocess_cmd: None,
                sampling: Sampling::eval_defaults(),
                announce: Some(format!("Evaluating benchmark {}", benchmark.name)),
            })?;
            tagged.push(TaggedPipeline {
                benchmark: benchmark.name.clone(),
                requires_sandbox: defaults.requires_sandbox,
                pipeline,
            });
        }
    }

    let mut plan = ExperimentPlan {
        expname: req.expname.clone(),
        created_at: Utc::now(),
        tasks: Vec::new(),
    };
    if tagged.is_empty() {
        return Ok(plan);
    }

    let num_jobs = if req.num_jobs == -1 {
        tagged.len() as i64
    } else {
        req.num_jobs * num_runs as i64
    };
    let container = config.container("fleet");
    let log_dir = req
        .log_dir
        .clone()
        .unwrap_or_else(|| format!("{}/eval-logs", req.output_dir));

    for (index, batch) in batch_pipelines(&tagged, num_jobs, req.with_sandbox)
        .iter()
        .enumerate()
    {
        let name = format!("{}-{}", req.expname, index);
        plan.tasks.push(PlannedTask {
            task_id: name.clone(),
            name,
            command: batch.render_command(),
            server_address: Some(setup.server_address.clone()),
            server: setup.server.clone(),
            with_sandbox: batch.needs_sandbox,
            sandbox_port: sandbox_port(policy),
            depends_on: Vec::new(),
            run_after: req.run_after.clone(),
            log_dir: log_dir.clone(),
            container: container.clone(),
            partition: req.partition.clone(),
            time_min: req.time_min.clone(),
            exclusive: req.exclusive,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    fn local_config() -> ClusterConfig {
        ClusterConfig {
            executor: ExecutorKind::Local,
            ssh_tunnel: None,
            containers: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }

    fn temp_output_dir(tag: &str) -> (PathBuf, String) {
        let dir = std::env::temp_dir().join(format!(
            "fleet_plan_test_{}_{}",
            std::process::id(),
            tag
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("temp dir");
        let as_str = dir.to_str().expect("utf8 path").to_string();
        (dir, as_str)
    }

    fn eval_request(output_dir: &str, benchmarks: &str) -> EvalRequest {
        let mut req = EvalRequest::new("eval", output_dir, benchmarks, "trtllm");
        req.server_address = Some("api.host:9000".to_string());
        req.model = Some("llama".to_string());
        req
    }

    #[test]
    fn greedy_benchmark_plans_one_batch_with_one_pipeline() {
        let (dir, dir_str) = temp_output_dir("scenario_a");
        let req = eval_request(&dir_str, "gsm8k:0");
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");

        assert_eq!(plan.tasks.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(task.task_id, "eval-0");
        assert!(task.command.contains("echo \"Evaluating benchmark gsm8k\""));
        assert!(task
            .command
            .contains(&format!("touch {}/eval-results/gsm8k/output.jsonl.done", dir_str)));
        // Greedy-only runs keep their default temperature.
        assert!(!task.command.contains("++inference.temperature=0.0"));
        assert!(task.server.is_none());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn add_greedy_plans_greedy_plus_sampled_units_with_distinct_markers() {
        let (dir, dir_str) = temp_output_dir("scenario_b");
        let mut req = eval_request(&dir_str, "gsm8k:2");
        req.add_greedy = true;
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");

        assert_eq!(plan.tasks.len(), 3);
        let commands: Vec<&str> = plan.tasks.iter().map(|t| t.command.as_str()).collect();
        let markers = [
            format!("touch {}/eval-results/gsm8k/output.jsonl.done", dir_str),
            format!("touch {}/eval-results/gsm8k/output-rs0.jsonl.done", dir_str),
            format!("touch {}/eval-results/gsm8k/output-rs1.jsonl.done", dir_str),
        ];
        for marker in &markers {
            assert!(
                commands.iter().any(|cmd| cmd.contains(marker)),
                "no task touches {}",
                marker
            );
        }
        // The greedy sibling of sampled runs pins temperature to zero.
        let greedy = commands
            .iter()
            .find(|cmd| cmd.contains("output.jsonl.done"))
            .expect("greedy task");
        assert!(greedy.contains("++inference.temperature=0.0"));
        let sampled = commands
            .iter()
            .find(|cmd| cmd.contains("output-rs0.jsonl.done"))
            .expect("sampled task");
        assert!(sampled.contains("++inference.random_seed=0"));
        assert!(sampled.contains("++inference.temperature=0.7"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn chunk_subset_still_gates_merge_on_all_chunks() {
        let (dir, dir_str) = temp_output_dir("scenario_c");
        let mut req = eval_request(&dir_str, "gsm8k:0");
        req.num_chunks = Some(4);
        req.chunk_ids = Some("0,1".to_string());
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");

        assert_eq!(plan.tasks.len(), 2);
        for task in &plan.tasks {
            for chunk_id in 0..4 {
                assert!(
                    task.command.contains(&format!("output-chunk{}-of-4.jsonl.done ]", chunk_id)),
                    "merge gate must check chunk {}",
                    chunk_id
                );
            }
        }

        // Once the requested chunks are done, nothing remains to plan;
        // the merge only ever runs from a job that observed all four.
        let bench_dir = dir.join("eval-results").join("gsm8k");
        fs::create_dir_all(&bench_dir).expect("bench dir");
        fs::write(bench_dir.join("output-chunk0-of-4.jsonl.done"), b"").expect("marker");
        fs::write(bench_dir.join("output-chunk1-of-4.jsonl.done"), b"").expect("marker");
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");
        assert!(plan.tasks.is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn planning_twice_without_new_markers_is_idempotent() {
        let (dir, dir_str) = temp_output_dir("idempotent");
        let mut req = eval_request(&dir_str, "gsm8k:3,human-eval:0");
        req.num_jobs = 2;
        let first = plan_eval(&local_config(), &Probe::Local, &req).expect("first plan");
        let second = plan_eval(&local_config(), &Probe::Local, &req).expect("second plan");
        assert_eq!(
            serde_json::to_value(&first.tasks).expect("json"),
            serde_json::to_value(&second.tasks).expect("json")
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn completed_units_are_filtered_out() {
        let (dir, dir_str) = temp_output_dir("filtered");
        let bench_dir = dir.join("eval-results").join("gsm8k");
        fs::create_dir_all(&bench_dir).expect("bench dir");
        fs::write(bench_dir.join("output-rs0.jsonl.done"), b"").expect("marker");

        let req = eval_request(&dir_str, "gsm8k:2");
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");
        assert_eq!(plan.tasks.len(), 1);
        assert!(plan.tasks[0].command.contains("output-rs1.jsonl.done"));

        let mut rerun = eval_request(&dir_str, "gsm8k:2");
        rerun.rerun_done = true;
        let plan = plan_eval(&local_config(), &Probe::Local, &rerun).expect("plan");
        assert_eq!(plan.tasks.len(), 2);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn sandbox_benchmarks_enable_sandbox_for_their_batch_only() {
        let (dir, dir_str) = temp_output_dir("sandbox");
        let req = eval_request(&dir_str, "gsm8k:0,minif2f:0");
        let plan = plan_eval(&local_config(), &Probe::Local, &req).expect("plan");
        assert_eq!(plan.tasks.len(), 2);
        let by_sandbox: Vec<bool> = plan.tasks.iter().map(|t| t.with_sandbox).collect();
        assert!(by_sandbox.contains(&true));
        assert!(by_sandbox.contains(&false));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn cluster_extra_datasets_require_slurm() {
        let (dir, dir_str) = temp_output_dir("extra_datasets");
        let mut req = eval_request(&dir_str, "gsm8k:0");
        req.extra_dataset_mode = ExtraDatasetMode::Cluster;
        let err = plan_eval(&local_config(), &Probe::Local, &req).expect_err("mode mismatch");
        assert!(err.to_string().contains("executor is not 'slurm'"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn generate_plans_one_task_per_unit_with_hosted_server() {
        let (dir, dir_str) = temp_output_dir("generate");
        let mut req = GenerateRequest::new("generate", &dir_str, "vllm");
        req.model = Some("/models/llama".to_string());
        req.server_gpus = Some(8);
        req.num_random_seeds = Some(2);
        let plan = plan_generate(&local_config(), &Probe::Local, &req).expect("plan");

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].task_id, "generate-rs0");
        assert_eq!(plan.tasks[1].task_id, "generate-rs1");
        let task = &plan.tasks[0];
        let server = task.server.as_ref().expect("server config");
        assert_eq!(server.server_port, 5000);
        assert_eq!(task.server_address.as_deref(), Some("localhost:5000"));
        assert_eq!(task.sandbox_port, Some(6000));
        assert!(task.command.contains("++server.host=localhost ++server.port=5000"));
        assert!(task.command.contains(&format!("touch {}/output-rs0.jsonl.done", dir_str)));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn generate_skips_units_whose_markers_exist() {
        let (dir, dir_str) = temp_output_dir("generate_skip");
        fs::write(dir.join("output-rs0.jsonl.done"), b"").expect("marker");
        let mut req = GenerateRequest::new("generate", &dir_str, "vllm");
        req.server_address = Some("api.host:9000".to_string());
        req.num_random_seeds = Some(2);
        let plan = plan_generate(&local_config(), &Probe::Local, &req).expect("plan");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].task_id, "generate-rs1");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn dependent_jobs_chain_each_unit() {
        let (dir, dir_str) = temp_output_dir("chains");
        let mut req = GenerateRequest::new("generate", &dir_str, "vllm");
        req.server_address = Some("api.host:9000".to_string());
        req.dependent_jobs = 2;
        let plan = plan_generate(&local_config(), &Probe::Local, &req).expect("plan");

        assert_eq!(plan.tasks.len(), 3);
        assert_eq!(plan.tasks[0].task_id, "generate");
        assert_eq!(plan.tasks[1].depends_on, vec!["generate".to_string()]);
        assert_eq!(plan.tasks[2].depends_on, vec!["generate@1".to_string()]);
        assert_eq!(plan.tasks[0].command, plan.tasks[1].command);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn genselect_preprocess_gates_every_chain() {
        let (dir, dir_str) = temp_output_dir("genselect");
        let mut req = GenerateRequest::new("select", &dir_str, "vllm");
        req.generation_type = GenerationKind::Genselect;
        req.server_address = Some("api.host:9000".to_string());
        req.num_random_seeds = Some(2);
        req.dependent_jobs = 1;
        let plan = plan_generate(&local_config(), &Probe::Local, &req).expect("plan");

        let preprocess = &plan.tasks[0];
        assert_eq!(preprocess.task_id, "preprocess_genselect");
        assert!(preprocess
            .command
            .contains("python -m fleet.inference.genselect_preprocess ++num_random_seeds=2"));

        // Two units, each a chain of two links; only first links wait on
        // the preprocess task.
        assert_eq!(plan.tasks.len(), 5);
        let first_links: Vec<&PlannedTask> = plan
            .tasks
            .iter()
            .filter(|t| t.depends_on == vec!["preprocess_genselect".to_string()])
            .collect();
        assert_eq!(first_links.len(), 2);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn conflicting_seed_specs_fail_before_planning() {
        let (dir, dir_str) = temp_output_dir("seed_conflict");
        let mut req = GenerateRequest::new("generate", &dir_str, "vllm");
        req.server_address = Some("api.host:9000".to_string());
        req.num_random_seeds = Some(2);
        req.random_seeds = Some("0,1".to_string());
        let err = plan_generate(&local_config(), &Probe::Local, &req).expect_err("conflict");
        assert!(err.to_string().contains("Cannot specify both"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn all_markers_present_produces_an_empty_plan() {
        let (dir, dir_str) = temp_output_dir("complete");
        fs::write(dir.join("output.jsonl.done"), b"").expect("marker");
        let mut req = GenerateRequest::new("generate", &dir_str, "vllm");
        req.server_address = Some("api.host:9000".to_string());
        let plan = plan_generate(&local_config(), &Probe::Local, &req).expect("plan");
        assert!(plan.tasks.is_empty());
        let _ = fs::remove_dir_all(dir);
    }
}
