use crate::error::{PlanError, PlanResult};

/// Parse a seed/chunk id specification such as "0,1,2" or "0..3" (ranges
/// are inclusive) or a mix like "0,4..7".
pub fn parse_id_spec(spec: &str) -> PlanResult<Vec<i64>> {
    let mut ids = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(PlanError::config(format!("empty entry in id list '{}'", spec)));
        }
        if let Some((start, end)) = part.split_once("..") {
            let start: i64 = start
                .trim()
                .parse()
                .map_err(|_| PlanError::config(format!("invalid id range '{}'", part)))?;
            let end: i64 = end
                .trim()
                .parse()
                .map_err(|_| PlanError::config(format!("invalid id range '{}'", part)))?;
            if end < start {
                return Err(PlanError::config(format!("invalid id range '{}'", part)));
            }
            ids.extend(start..=end);
        } else {
            let id: i64 = part
                .parse()
                .map_err(|_| PlanError::config(format!("invalid id '{}'", part)))?;
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Resolve the chunk ids for a run: an explicit spec is parsed and
/// validated against `[0, num_chunks)`, otherwise every chunk is included.
pub fn compute_chunk_ids(spec: Option<&str>, num_chunks: i64) -> PlanResult<Vec<i64>> {
    if num_chunks <= 0 {
        return Err(PlanError::config(format!(
            "num_chunks must be positive, got {}",
            num_chunks
        )));
    }
    let ids = match spec {
        Some(spec) => {
            let ids = parse_id_spec(spec)?;
            for id in &ids {
                if *id < 0 || *id >= num_chunks {
                    return Err(PlanError::config(format!(
                        "chunk id {} is outside [0, {})",
                        id, num_chunks
                    )));
                }
            }
            ids
        }
        None => (0..num_chunks).collect(),
    };
    Ok(ids)
}
