/// Output and completion-marker naming. These names are the resumability
/// contract across runs: for a fixed output location and prefix the
/// mapping `(seed, chunk) -> path` must stay a bijection.

/// Returns `{prefix}[-rs{seed}][-chunk{k}-of-{n}].jsonl`.
pub fn output_filename(prefix: &str, seed: Option<i64>, chunk: Option<(i64, i64)>) -> String {
    let mut name = prefix.to_string();
    if let Some(seed) = seed {
        name.push_str(&format!("-rs{}", seed));
    }
    if let Some((chunk_id, num_chunks)) = chunk {
        name.push_str(&format!("-chunk{}-of-{}", chunk_id, num_chunks));
    }
    name.push_str(".jsonl");
    name
}

/// Full (mounted) path of the output file for one work unit.
pub fn output_path(
    output_dir: &str,
    prefix: &str,
    seed: Option<i64>,
    chunk: Option<(i64, i64)>,
) -> String {
    format!(
        "{}/{}",
        output_dir.trim_end_matches('/'),
        output_filename(prefix, seed, chunk)
    )
}

/// Completion marker for one work unit: the output path with a `.done`
/// suffix. Existence of this file is the only completion signal the
/// planner consults; it never creates markers itself.
pub fn marker_path(
    output_dir: &str,
    prefix: &str,
    seed: Option<i64>,
    chunk: Option<(i64, i64)>,
) -> String {
    format!("{}.done", output_path(output_dir, prefix, seed, chunk))
}
