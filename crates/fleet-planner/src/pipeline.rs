use fleet_core::{marker_path, output_path, PlanError, PlanResult};
use serde::Serialize;

use crate::matrix::WorkUnit;
use crate::spec::{GenerationKind, EVAL_MODULE, MERGE_MODULE};

/// Inference sampling overrides applied when a work unit carries a seed.
#[derive(Debug, Clone, Serialize)]
pub struct Sampling {
    pub temperature: f64,
    pub top_k: Option<i64>,
    pub top_p: Option<f64>,
}

impl Sampling {
    /// Defaults for standalone generation runs.
    pub fn generation_defaults() -> Self {
        Sampling { temperature: 1.0, top_k: Some(0), top_p: Some(0.95) }
    }

    /// Defaults for benchmark evaluation runs.
    pub fn eval_defaults() -> Self {
        Sampling { temperature: 0.7, top_k: None, top_p: None }
    }
}

/// One typed stage of a command pipeline. Stages stay structured inside
/// the planner and are only rendered to shell text at the boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Announce {
        message: String,
    },
    Generation {
        module: String,
        /// Ordered `++key=value` bindings, keys without the prefix.
        bindings: Vec<(String, String)>,
        extra_args: String,
    },
    Evaluation {
        input_files: String,
        eval_args: String,
    },
    TouchMarker {
        marker: String,
    },
    /// Chunk merge, gated on the complete marker set for the seed. The
    /// gate always spans all `num_chunks` markers, not just the chunks
    /// requested in the current run.
    MergeChunks {
        merged_file: String,
        partial_files: Vec<String>,
        markers: Vec<String>,
        postprocess: Option<String>,
    },
    Command {
        command: String,
    },
}

impl Stage {
    pub fn render(&self) -> String {
        match self {
            Stage::Announce { message } => format!("echo \"{}\"", message),
            Stage::Generation { module, bindings, extra_args } => {
                let mut cmd = format!("python -m {}", module);
                for (key, value) in bindings {
                    cmd.push_str(&format!(" ++{}={}", key, value));
                }
                if !extra_args.is_empty() {
                    cmd.push(' ');
                    cmd.push_str(extra_args);
                }
                cmd
            }
            Stage::Evaluation { input_files, eval_args } => {
                let mut cmd = format!("python -m {} ++input_files={}", EVAL_MODULE, input_files);
                if !eval_args.is_empty() {
                    cmd.push(' ');
                    cmd.push_str(eval_args);
                }
                cmd
            }
            Stage::TouchMarker { marker } => format!("touch {}", marker),
            Stage::MergeChunks { merged_file, partial_files, markers, postprocess } => {
                let mut merge = format!(
                    "python -m {} {} {}",
                    MERGE_MODULE,
                    merged_file,
                    partial_files.join(" ")
                );
                if let Some(postprocess) = postprocess {
                    merge.push_str(&format!(" && {}", postprocess));
                }
                format!("if {}; then {}; fi", gate_expression(markers), merge)
            }
            Stage::Command { command } => command.clone(),
        }
    }
}

/// Shell condition that holds only when every chunk marker exists.
pub fn gate_expression(markers: &[String]) -> String {
    markers
        .iter()
        .map(|marker| format!("[ -f {} ]", marker))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// The ordered, fail-fast chain of stages for one submitted unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct CommandPipeline {
    pub stages: Vec<Stage>,
}

impl CommandPipeline {
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(Stage::render)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// Everything a command builder needs to compose the pipeline for one
/// remaining work unit.
#[derive(Debug, Clone)]
pub struct ComposeRequest<'a> {
    pub output_dir: &'a str,
    pub output_prefix: &'a str,
    pub unit: WorkUnit,
    pub num_chunks: Option<i64>,
    pub extra_args: &'a str,
    pub eval_args: Option<&'a str>,
    pub preprocess_cmd: Option<&'a str>,
    pub postprocess_cmd: Option<&'a str>,
    pub sampling: Sampling,
    pub announce: Option<String>,
}

impl ComposeRequest<'_> {
    fn chunk(&self) -> PlanResult<Option<(i64, i64)>> {
        match self.unit.chunk_id {
            Some(chunk_id) => {
                let num_chunks = self.num_chunks.ok_or_else(|| {
                    PlanError::config("chunked work unit without a configured num_chunks")
                })?;
                Ok(Some((chunk_id, num_chunks)))
            }
            None => Ok(None),
        }
    }
}

/// One implementation per generation kind: how to build the client
/// pipeline for a work unit and which server entrypoint backs it.
pub trait CommandBuilder {
    fn kind(&self) -> GenerationKind;
    fn build_pipeline(&self, req: &ComposeRequest) -> PlanResult<CommandPipeline>;
    fn default_server_entrypoint(&self) -> &'static str {
        "fleet.servers.serve"
    }
}

pub fn builder_for(kind: GenerationKind) -> &'static dyn CommandBuilder {
    match kind {
        GenerationKind::Generate => &GenerateBuilder,
        GenerationKind::Reward => &RewardBuilder,
        GenerationKind::MathJudge => &MathJudgeBuilder,
        GenerationKind::Genselect => &GenselectBuilder,
    }
}

fn float_arg(value: f64) -> String {
    format!("{:?}", value)
}

fn push_common_head(stages: &mut Vec<Stage>, req: &ComposeRequest) {
    if let Some(message) = &req.announce {
        stages.push(Stage::Announce { message: message.clone() });
    }
    if let Some(preprocess) = req.preprocess_cmd {
        stages.push(Stage::Command { command: preprocess.to_string() });
    }
}

struct GenerateBuilder;

impl CommandBuilder for GenerateBuilder {
    fn kind(&self) -> GenerationKind {
        GenerationKind::Generate
    }

    fn build_pipeline(&self, req: &ComposeRequest) -> PlanResult<CommandPipeline> {
        let chunk = req.chunk()?;
        let seed = req.unit.seed;
        // The generation stage always receives the unchunked output path;
        // the worker derives the chunk filename from the chunk bindings.
        let unchunked_output = output_path(req.output_dir, req.output_prefix, seed, None);
        let written_output = output_path(req.output_dir, req.output_prefix, seed, chunk);

        let mut bindings = vec![
            ("skip_filled".to_string(), "True".to_string()),
            ("output_file".to_string(), unchunked_output.clone()),
        ];
        if let Some(seed) = seed {
            bindings.push(("inference.random_seed".to_string(), seed.to_string()));
            bindings.push((
                "inference.temperature".to_string(),
                float_arg(req.sampling.temperature),
            ));
            if let Some(top_k) = req.sampling.top_k {
                bindings.push(("inference.top_k".to_string(), top_k.to_string()));
            }
            if let Some(top_p) = req.sampling.top_p {
                bindings.push(("inference.top_p".to_string(), float_arg(top_p)));
            }
        }
        if let Some((chunk_id, num_chunks)) = chunk {
            bindings.push(("num_chunks".to_string(), num_chunks.to_string()));
            bindings.push(("chunk_id".to_string(), chunk_id.to_string()));
        }

        let mut stages = Vec::new();
        push_common_head(&mut stages, req);
        stages.push(Stage::Generation {
            module: self.kind().worker_module().to_string(),
            bindings,
            extra_args: req.extra_args.to_string(),
        });
        if let Some(eval_args) = req.eval_args {
            stages.push(Stage::Evaluation {
                input_files: written_output.clone(),
                eval_args: eval_args.to_string(),
            });
        }

        match chunk {
            Some((chunk_id, num_chunks)) => {
                stages.push(Stage::TouchMarker {
                    marker: marker_path(
                        req.output_dir,
                        req.output_prefix,
                        seed,
                        Some((chunk_id, num_chunks)),
                    ),
                });
                // Merge waits for every chunk in num_chunks, no matter
                // which chunk ids the current run requested: partial
                // merges are never correct.
                let markers: Vec<String> = (0..num_chunks)
                    .map(|id| {
                        marker_path(req.output_dir, req.output_prefix, seed, Some((id, num_chunks)))
                    })
                    .collect();
                let partial_files: Vec<String> = (0..num_chunks)
                    .map(|id| {
                        output_path(req.output_dir, req.output_prefix, seed, Some((id, num_chunks)))
                    })
                    .collect();
                stages.push(Stage::MergeChunks {
                    merged_file: unchunked_output,
                    partial_files,
                    markers,
                    postprocess: req.postprocess_cmd.map(str::to_string),
                });
            }
            None => {
                stages.push(Stage::TouchMarker {
                    marker: marker_path(req.output_dir, req.output_prefix, seed, None),
                });
                if let Some(postprocess) = req.postprocess_cmd {
                    stages.push(Stage::Command { command: postprocess.to_string() });
                }
            }
        }
        Ok(CommandPipeline { stages })
    }
}

/// Shared shape of the self-evaluating kinds: they consume a results
/// directory, reject external eval args and never chunk.
fn build_directory_pipeline(
    kind: GenerationKind,
    req: &ComposeRequest,
    extra_bindings: Vec<(String, String)>,
) -> PlanResult<CommandPipeline> {
    if req.eval_args.is_some() {
        return Err(PlanError::config(format!(
            "Cannot specify eval_args for {}",
            kind.label()
        )));
    }
    let mut bindings = vec![("skip_filled".to_string(), "True".to_string())];
    bindings.extend(extra_bindings);

    let mut stages = Vec::new();
    push_common_head(&mut stages, req);
    stages.push(Stage::Generation {
        module: kind.worker_module().to_string(),
        bindings,
        extra_args: req.extra_args.to_string(),
    });
    stages.push(Stage::TouchMarker {
        marker: marker_path(req.output_dir, req.output_prefix, req.unit.seed, None),
    });
    if let Some(postprocess) = req.postprocess_cmd {
        stages.push(Stage::Command { command: postprocess.to_string() });
    }
    Ok(CommandPipeline { stages })
}

struct RewardBuilder;

impl CommandBuilder for RewardBuilder {
    fn kind(&self) -> GenerationKind {
        GenerationKind::Reward
    }

    fn build_pipeline(&self, req: &ComposeRequest) -> PlanResult<CommandPipeline> {
        let mut bindings = vec![("output_dir".to_string(), req.output_dir.to_string())];
        if let Some(seed) = req.unit.seed {
            bindings.push(("random_seed".to_string(), seed.to_string()));
        }
        build_directory_pipeline(self.kind(), req, bindings)
    }

    fn default_server_entrypoint(&self) -> &'static str {
        "fleet.servers.reward"
    }
}

struct MathJudgeBuilder;

impl CommandBuilder for MathJudgeBuilder {
    fn kind(&self) -> GenerationKind {
        GenerationKind::MathJudge
    }

    fn build_pipeline(&self, req: &ComposeRequest) -> PlanResult<CommandPipeline> {
        let mut bindings = vec![("output_dir".to_string(), req.output_dir.to_string())];
        if let Some(seed) = req.unit.seed {
            bindings.push(("random_seed".to_string(), seed.to_string()));
        }
        build_directory_pipeline(self.kind(), req, bindings)
    }
}

struct GenselectBuilder;

impl CommandBuilder for GenselectBuilder {
    fn kind(&self) -> GenerationKind {
        GenerationKind::Genselect
    }

    fn build_pipeline(&self, req: &ComposeRequest) -> PlanResult<CommandPipeline> {
        let mut bindings = vec![
            (
                "input_dir".to_string(),
                format!("{}/comparison_instances", req.output_dir.trim_end_matches('/')),
            ),
            ("output_dir".to_string(), req.output_dir.to_string()),
        ];
        if let Some(seed) = req.unit.seed {
            bindings.push(("inference.random_seed".to_string(), seed.to_string()));
        }
        bindings.push(("inference.temperature".to_string(), float_arg(0.7)));
        bindings.push(("inference.tokens_to_generate".to_string(), "2048".to_string()));
        bindings.push(("inference.top_k".to_string(), "0".to_string()));
        bindings.push(("inference.top_p".to_string(), float_arg(0.95)));
        build_directory_pipeline(self.kind(), req, bindings)
    }
}
