use fleet_core::{compute_chunk_ids, parse_id_spec, PlanError, PlanResult};
use serde::Serialize;

use crate::spec::GenerationKind;

/// One `(seed, chunk)` combination requiring one generation/eval
/// invocation. `seed = None` is the greedy run, `chunk_id = None` means
/// the dataset is not chunked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct WorkUnit {
    pub seed: Option<i64>,
    pub chunk_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SeedPlan {
    /// Explicit seed list, e.g. "0,1,2" or "0..3". Mutually exclusive
    /// with `num_samples`.
    pub seed_spec: Option<String>,
    pub num_samples: Option<usize>,
    pub starting_seed: i64,
    /// Include the greedy unit alongside sampled seeds.
    pub add_greedy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkPlan {
    pub num_chunks: Option<i64>,
    pub chunk_spec: Option<String>,
}

pub fn resolve_seeds(plan: &SeedPlan) -> PlanResult<Vec<Option<i64>>> {
    if plan.seed_spec.is_some() && plan.num_samples.is_some() {
        return Err(PlanError::config(
            "Cannot specify both random_seeds and num_random_seeds",
        ));
    }
    let sampled: Vec<i64> = if let Some(spec) = &plan.seed_spec {
        parse_id_spec(spec)?
    } else if let Some(count) = plan.num_samples {
        (plan.starting_seed..plan.starting_seed + count as i64).collect()
    } else {
        Vec::new()
    };
    let mut seeds: Vec<Option<i64>> = Vec::new();
    if sampled.is_empty() || plan.add_greedy {
        seeds.push(None);
    }
    seeds.extend(sampled.into_iter().map(Some));
    Ok(seeds)
}

pub fn resolve_chunks(kind: GenerationKind, plan: &ChunkPlan) -> PlanResult<Option<Vec<i64>>> {
    if plan.num_chunks.is_none() && plan.chunk_spec.is_none() {
        return Ok(None);
    }
    if !kind.supports_chunking() {
        return Err(PlanError::config(
            "Chunking is only supported for generation type 'generate'",
        ));
    }
    let num_chunks = plan
        .num_chunks
        .ok_or_else(|| PlanError::config("chunk_ids requires num_chunks to be set"))?;
    Ok(Some(compute_chunk_ids(plan.chunk_spec.as_deref(), num_chunks)?))
}

/// Expand seed and chunk plans into the full ordered work matrix.
pub fn build_work_matrix(
    kind: GenerationKind,
    seed_plan: &SeedPlan,
    chunk_plan: &ChunkPlan,
) -> PlanResult<Vec<WorkUnit>> {
    let seeds = resolve_seeds(seed_plan)?;
    let chunks = resolve_chunks(kind, chunk_plan)?;
    let mut units = Vec::new();
    for seed in &seeds {
        match &chunks {
            Some(chunk_ids) => {
                for chunk_id in chunk_ids {
                    units.push(WorkUnit {
                        seed: *seed,
                        chunk_id: Some(*chunk_id),
                    });
                }
            }
            None => units.push(WorkUnit {
                seed: *seed,
                chunk_id: None,
            }),
        }
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(seed: Option<i64>, chunk_id: Option<i64>) -> WorkUnit {
        WorkUnit { seed, chunk_id }
    }

    #[test]
    fn no_samples_means_single_greedy_unit() {
        let units = build_work_matrix(
            GenerationKind::Generate,
            &SeedPlan::default(),
            &ChunkPlan::default(),
        )
        .expect("matrix");
        assert_eq!(units, vec![unit(None, None)]);
    }

    #[test]
    fn sampled_seeds_start_at_starting_seed() {
        let seed_plan = SeedPlan {
            num_samples: Some(3),
            starting_seed: 5,
            ..SeedPlan::default()
        };
        let units =
            build_work_matrix(GenerationKind::Generate, &seed_plan, &ChunkPlan::default())
                .expect("matrix");
        assert_eq!(units, vec![unit(Some(5), None), unit(Some(6), None), unit(Some(7), None)]);
    }

    #[test]
    fn add_greedy_prepends_the_greedy_unit() {
        let seed_plan = SeedPlan {
            num_samples: Some(2),
            add_greedy: true,
            ..SeedPlan::default()
        };
        let units =
            build_work_matrix(GenerationKind::Generate, &seed_plan, &ChunkPlan::default())
                .expect("matrix");
        assert_eq!(
            units,
            vec![unit(None, None), unit(Some(0), None), unit(Some(1), None)]
        );
    }

    #[test]
    fn explicit_seeds_and_sample_count_conflict() {
        let seed_plan = SeedPlan {
            seed_spec: Some("0,1".to_string()),
            num_samples: Some(2),
            ..SeedPlan::default()
        };
        let err = resolve_seeds(&seed_plan).expect_err("conflict");
        assert!(err.to_string().contains("Cannot specify both"));
    }

    #[test]
    fn chunking_explodes_each_seed() {
        let seed_plan = SeedPlan {
            num_samples: Some(2),
            ..SeedPlan::default()
        };
        let chunk_plan = ChunkPlan {
            num_chunks: Some(2),
            chunk_spec: None,
        };
        let units = build_work_matrix(GenerationKind::Generate, &seed_plan, &chunk_plan)
            .expect("matrix");
        assert_eq!(
            units,
            vec![
                unit(Some(0), Some(0)),
                unit(Some(0), Some(1)),
                unit(Some(1), Some(0)),
                unit(Some(1), Some(1)),
            ]
        );
    }

    #[test]
    fn chunk_subset_is_respected() {
        let chunk_plan = ChunkPlan {
            num_chunks: Some(4),
            chunk_spec: Some("0,1".to_string()),
        };
        let units = build_work_matrix(GenerationKind::Generate, &SeedPlan::default(), &chunk_plan)
            .expect("matrix");
        assert_eq!(units, vec![unit(None, Some(0)), unit(None, Some(1))]);
    }

    #[test]
    fn chunking_is_rejected_for_non_generate_kinds() {
        let chunk_plan = ChunkPlan {
            num_chunks: Some(2),
            chunk_spec: None,
        };
        for kind in [
            GenerationKind::Reward,
            GenerationKind::MathJudge,
            GenerationKind::Genselect,
        ] {
            let err = build_work_matrix(kind, &SeedPlan::default(), &chunk_plan)
                .expect_err("chunking unsupported");
            assert!(err.to_string().contains("only supported for generation type"));
        }
    }

    #[test]
    fn chunk_spec_without_num_chunks_is_rejected() {
        let chunk_plan = ChunkPlan {
            num_chunks: None,
            chunk_spec: Some("0".to_string()),
        };
        assert!(resolve_chunks(GenerationKind::Generate, &chunk_plan).is_err());
    }
}
