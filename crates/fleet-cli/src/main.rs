use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use fleet_core::ClusterConfig;
use fleet_planner::{
    plan_eval, plan_generate, DryRunBackend, EvalRequest, ExecutionBackend, ExperimentPlan,
    ExtraDatasetMode, GenerateRequest, GenerationKind, Probe,
};

#[derive(Parser)]
#[command(name = "fleet", version = "0.1.0", about = "LLM benchmark fleet planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GenerationTypeArg {
    #[value(name = "generate")]
    Generate,
    #[value(name = "reward")]
    Reward,
    #[value(name = "math_judge")]
    MathJudge,
    #[value(name = "genselect")]
    Genselect,
}

impl From<GenerationTypeArg> for GenerationKind {
    fn from(value: GenerationTypeArg) -> Self {
        match value {
            GenerationTypeArg::Generate => GenerationKind::Generate,
            GenerationTypeArg::Reward => GenerationKind::Reward,
            GenerationTypeArg::MathJudge => GenerationKind::MathJudge,
            GenerationTypeArg::Genselect => GenerationKind::Genselect,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExtraDatasetArg {
    #[value(name = "local")]
    Local,
    #[value(name = "cluster")]
    Cluster,
}

impl From<ExtraDatasetArg> for ExtraDatasetMode {
    fn from(value: ExtraDatasetArg) -> Self {
        match value {
            ExtraDatasetArg::Local => ExtraDatasetMode::Local,
            ExtraDatasetArg::Cluster => ExtraDatasetMode::Cluster,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Plan LLM generation jobs for one output location.
    Generate {
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long)]
        config_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: String,
        #[arg(long, default_value = "generate")]
        expname: String,
        #[arg(long, value_enum, default_value = "generate")]
        generation_type: GenerationTypeArg,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        server_address: Option<String>,
        #[arg(long)]
        server_type: String,
        #[arg(long)]
        server_gpus: Option<u32>,
        #[arg(long, default_value_t = 1)]
        server_nodes: u32,
        #[arg(long, default_value = "")]
        server_args: String,
        #[arg(long)]
        server_entrypoint: Option<String>,
        #[arg(long, default_value_t = 0)]
        dependent_jobs: usize,
        #[arg(long)]
        num_random_seeds: Option<usize>,
        #[arg(long)]
        random_seeds: Option<String>,
        #[arg(long, default_value_t = 0)]
        starting_seed: i64,
        #[arg(long)]
        num_chunks: Option<i64>,
        #[arg(long)]
        chunk_ids: Option<String>,
        #[arg(long)]
        preprocess_cmd: Option<String>,
        #[arg(long)]
        postprocess_cmd: Option<String>,
        #[arg(long)]
        eval_args: Option<String>,
        #[arg(long)]
        genselect_args: Option<String>,
        #[arg(long)]
        run_after: Vec<String>,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long)]
        time_min: Option<String>,
        #[arg(long)]
        log_dir: Option<String>,
        #[arg(long, default_value = "output")]
        output_prefix: String,
        #[arg(long)]
        rerun_done: bool,
        #[arg(long)]
        with_sandbox: bool,
        #[arg(long)]
        not_exclusive: bool,
        #[arg(long)]
        json: bool,
        /// Extra arguments passed through to the generation stage.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        extra_args: Vec<String>,
    },
    /// Plan benchmark evaluation jobs.
    Eval {
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long)]
        config_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: String,
        /// `<benchmark>:<num samples>` entries, comma-separated,
        /// e.g. gsm8k:4,human-eval:0.
        #[arg(long)]
        benchmarks: String,
        #[arg(long, default_value = "eval")]
        expname: String,
        #[arg(long)]
        data_dir: Option<String>,
        #[arg(long)]
        split: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        server_address: Option<String>,
        #[arg(long)]
        server_type: String,
        #[arg(long)]
        server_gpus: Option<u32>,
        #[arg(long, default_value_t = 1)]
        server_nodes: u32,
        #[arg(long, default_value = "")]
        server_args: String,
        #[arg(long)]
        server_entrypoint: Option<String>,
        #[arg(long, default_value_t = 0)]
        starting_seed: i64,
        #[arg(long, default_value_t = -1)]
        num_jobs: i64,
        #[arg(long)]
        num_chunks: Option<i64>,
        #[arg(long)]
        chunk_ids: Option<String>,
        #[arg(long, default_value = "")]
        extra_eval_args: String,
        #[arg(long)]
        add_greedy: bool,
        #[arg(long)]
        run_after: Vec<String>,
        #[arg(long, value_enum, default_value = "local")]
        extra_datasets_type: ExtraDatasetArg,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long)]
        time_min: Option<String>,
        #[arg(long)]
        log_dir: Option<String>,
        #[arg(long, default_value = "output")]
        output_prefix: String,
        #[arg(long)]
        rerun_done: bool,
        #[arg(long)]
        with_sandbox: bool,
        #[arg(long)]
        not_exclusive: bool,
        #[arg(long)]
        json: bool,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        extra_args: Vec<String>,
    },
    /// Run the sandboxed code-execution service.
    Sandbox {
        #[arg(long, default_value_t = 6000)]
        port: u16,
        #[arg(long, default_value = "python3")]
        interpreter: String,
        #[arg(long, default_value_t = 10)]
        memory_limit_gb: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json!({
                    "ok": false,
                    "error": { "code": "command_failed", "message": err.to_string() }
                }));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Generate {
            cluster,
            config_dir,
            output_dir,
            expname,
            generation_type,
            model,
            server_address,
            server_type,
            server_gpus,
            server_nodes,
            server_args,
            server_entrypoint,
            dependent_jobs,
            num_random_seeds,
            random_seeds,
            starting_seed,
            num_chunks,
            chunk_ids,
            preprocess_cmd,
            postprocess_cmd,
            eval_args,
            genselect_args,
            run_after,
            partition,
            time_min,
            log_dir,
            output_prefix,
            rerun_done,
            with_sandbox,
            not_exclusive,
            json,
            extra_args,
        } => {
            let config = load_cluster_config(cluster.as_deref(), config_dir.as_deref())?;
            let mut request = GenerateRequest::new(&expname, &output_dir, &server_type);
            request.output_prefix = output_prefix;
            request.generation_type = generation_type.into();
            request.model = model;
            request.server_address = server_address;
            request.server_gpus = server_gpus;
            request.server_nodes = server_nodes;
            request.server_args = server_args;
            request.server_entrypoint = server_entrypoint;
            request.dependent_jobs = dependent_jobs;
            request.num_random_seeds = num_random_seeds;
            request.random_seeds = random_seeds;
            request.starting_seed = starting_seed;
            request.num_chunks = num_chunks;
            request.chunk_ids = chunk_ids;
            request.preprocess_cmd = preprocess_cmd;
            request.postprocess_cmd = postprocess_cmd;
            request.eval_args = eval_args;
            request.genselect_args = genselect_args;
            request.run_after = run_after;
            request.rerun_done = rerun_done;
            request.with_sandbox = with_sandbox;
            request.exclusive = !not_exclusive;
            request.partition = partition;
            request.time_min = time_min;
            request.extra_args = extra_args.join(" ");
            request.log_dir = log_dir;

            let probe = Probe::for_cluster(&config);
            let plan = plan_generate(&config, &probe, &request)?;
            DryRunBackend.submit(&plan)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "generate",
                    "plan": serde_json::to_value(&plan)?
                })));
            }
            print_plan(&plan);
        }
        Commands::Eval {
            cluster,
            config_dir,
            output_dir,
            benchmarks,
            expname,
            data_dir,
            split,
            model,
            server_address,
            server_type,
            server_gpus,
            server_nodes,
            server_args,
            server_entrypoint,
            starting_seed,
            num_jobs,
            num_chunks,
            chunk_ids,
            extra_eval_args,
            add_greedy,
            run_after,
            extra_datasets_type,
            partition,
            time_min,
            log_dir,
            output_prefix,
            rerun_done,
            with_sandbox,
            not_exclusive,
            json,
            extra_args,
        } => {
            let config = load_cluster_config(cluster.as_deref(), config_dir.as_deref())?;
            let mut request = EvalRequest::new(&expname, &output_dir, &benchmarks, &server_type);
            request.output_prefix = output_prefix;
            request.data_dir = data_dir.or_else(|| std::env::var("FLEET_DATA_DIR").ok());
            request.split = split;
            request.model = model;
            request.server_address = server_address;
            request.server_gpus = server_gpus;
            request.server_nodes = server_nodes;
            request.server_args = server_args;
            request.server_entrypoint = server_entrypoint;
            request.starting_seed = starting_seed;
            request.num_jobs = num_jobs;
            request.num_chunks = num_chunks;
            request.chunk_ids = chunk_ids;
            request.extra_eval_args = extra_eval_args;
            request.add_greedy = add_greedy;
            request.run_after = run_after;
            request.rerun_done = rerun_done;
            request.with_sandbox = with_sandbox;
            request.extra_dataset_mode = extra_datasets_type.into();
            request.exclusive = !not_exclusive;
            request.partition = partition;
            request.time_min = time_min;
            request.extra_args = extra_args.join(" ");
            request.log_dir = log_dir;

            let probe = Probe::for_cluster(&config);
            let plan = plan_eval(&config, &probe, &request)?;
            DryRunBackend.submit(&plan)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "eval",
                    "plan": serde_json::to_value(&plan)?
                })));
            }
            print_plan(&plan);
        }
        Commands::Sandbox {
            port,
            interpreter,
            memory_limit_gb,
        } => {
            let sandbox =
                fleet_sandbox::Sandbox::new(&interpreter, memory_limit_gb * 1024 * 1024 * 1024);
            fleet_sandbox::serve(port, sandbox)?;
        }
    }
    Ok(None)
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Generate { json, .. } | Commands::Eval { json, .. } => *json,
        Commands::Sandbox { .. } => false,
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(serialized) => println!("{}", serialized),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\"}}}}"
        ),
    }
}

fn load_cluster_config(cluster: Option<&str>, config_dir: Option<&Path>) -> Result<ClusterConfig> {
    let name = match cluster {
        Some(name) => name.to_string(),
        None => std::env::var("FLEET_CLUSTER")
            .map_err(|_| anyhow!("no cluster config: pass --cluster or set FLEET_CLUSTER"))?,
    };
    let direct = PathBuf::from(&name);
    let path = if direct.is_file() {
        direct
    } else {
        let dir = match config_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::var("FLEET_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cluster_configs")),
        };
        dir.join(format!("{}.yaml", name))
    };
    Ok(ClusterConfig::load(&path)?)
}

fn print_plan(plan: &ExperimentPlan) {
    println!("expname: {}", plan.expname);
    println!("tasks: {}", plan.tasks.len());
    for task in &plan.tasks {
        if task.depends_on.is_empty() {
            println!("task {}: {}", task.task_id, task.command);
        } else {
            println!(
                "task {} (after {}): {}",
                task.task_id,
                task.depends_on.join(", "),
                task.command
            );
        }
    }
}
