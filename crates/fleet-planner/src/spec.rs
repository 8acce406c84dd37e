use fleet_core::{PlanError, PlanResult};
use serde::Serialize;

/// Worker module invoked by the chunk-merge stage.
pub const MERGE_MODULE: &str = "fleet.inference.merge_chunks";
/// Worker module invoked by the evaluation stage.
pub const EVAL_MODULE: &str = "fleet.evaluation.evaluate_results";
/// Worker module preparing comparison instances for genselect runs.
pub const GENSELECT_PREPROCESS_MODULE: &str = "fleet.inference.genselect_preprocess";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Generate,
    Reward,
    MathJudge,
    Genselect,
}

impl GenerationKind {
    pub fn worker_module(self) -> &'static str {
        match self {
            GenerationKind::Generate => "fleet.inference.generate",
            GenerationKind::Reward => "fleet.inference.reward_model",
            GenerationKind::MathJudge => "fleet.inference.llm_math_judge",
            GenerationKind::Genselect => "fleet.inference.genselect",
        }
    }

    /// Dataset chunking only makes sense for plain generation; the other
    /// kinds consume whole result directories.
    pub fn supports_chunking(self) -> bool {
        matches!(self, GenerationKind::Generate)
    }

    pub fn label(self) -> &'static str {
        match self {
            GenerationKind::Generate => "generate",
            GenerationKind::Reward => "reward model",
            GenerationKind::MathJudge => "math judge",
            GenerationKind::Genselect => "genselect",
        }
    }
}

/// Where extra benchmark datasets live relative to the execution cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraDatasetMode {
    Local,
    Cluster,
}

/// One entry of the `benchmarks` argument: `<name>:<num samples>`.
/// A sample count of zero means greedy decoding only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkRequest {
    pub name: String,
    pub num_samples: usize,
}

pub fn parse_benchmarks(spec: &str) -> PlanResult<Vec<BenchmarkRequest>> {
    if spec.contains(' ') {
        return Err(PlanError::config("benchmarks should be separated with commas"));
    }
    let mut requests = Vec::new();
    for entry in spec.split(',') {
        let (name, count) = entry.split_once(':').ok_or_else(|| {
            PlanError::config(format!(
                "invalid benchmark entry '{}': expected <name>:<num samples>",
                entry
            ))
        })?;
        if name.is_empty() {
            return Err(PlanError::config(format!("invalid benchmark entry '{}'", entry)));
        }
        let num_samples: usize = count.parse().map_err(|_| {
            PlanError::config(format!(
                "invalid sample count '{}' for benchmark '{}'",
                count, name
            ))
        })?;
        requests.push(BenchmarkRequest {
            name: name.to_string(),
            num_samples,
        });
    }
    Ok(requests)
}

/// Static per-benchmark defaults: prompt and argument wiring plus whether
/// the benchmark needs the code-execution sandbox alongside its jobs.
/// Dataset file resolution stays with the execution backend.
#[derive(Debug, Clone)]
pub struct BenchmarkDefaults {
    pub split: &'static str,
    pub prompt_config: &'static str,
    pub generation_args: &'static str,
    pub eval_args: &'static str,
    pub requires_sandbox: bool,
}

pub fn benchmark_defaults(name: &str) -> BenchmarkDefaults {
    let base = name.split('.').next().unwrap_or(name);
    match base {
        "gsm8k" => BenchmarkDefaults {
            split: "test",
            prompt_config: "generic/math",
            generation_args: "++examples_type=gsm8k_few_shot",
            eval_args: "++eval_type=math",
            requires_sandbox: false,
        },
        "math" => BenchmarkDefaults {
            split: "test",
            prompt_config: "generic/math",
            generation_args: "++examples_type=math_few_shot",
            eval_args: "++eval_type=math",
            requires_sandbox: false,
        },
        "human-eval" | "mbpp" => BenchmarkDefaults {
            split: "test",
            prompt_config: "generic/codegen",
            generation_args: "",
            eval_args: "++eval_type=code",
            requires_sandbox: false,
        },
        "minif2f" | "proofnet" => BenchmarkDefaults {
            split: "test",
            prompt_config: "lean4/formal-proof",
            generation_args: "",
            eval_args: "++eval_type=lean4-proof",
            requires_sandbox: true,
        },
        _ => BenchmarkDefaults {
            split: "test",
            prompt_config: "generic/default",
            generation_args: "",
            eval_args: "",
            requires_sandbox: false,
        },
    }
}
