use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PlanError, PlanResult};

/// Cluster configuration, loaded from a YAML file. Describes where jobs
/// run and how the planner can reach the output location for completion
/// probing; it says nothing about individual experiments.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub executor: ExecutorKind,
    #[serde(default)]
    pub ssh_tunnel: Option<SshTunnelConfig>,
    #[serde(default)]
    pub containers: BTreeMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<MountPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Local,
    Slurm,
}

/// Where probe commands run when the output location lives on a remote
/// cluster filesystem.
#[derive(Debug, Clone, Deserialize)]
pub struct SshTunnelConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// `dest` is the path jobs see inside their container, `src` is the
/// physical path on the cluster filesystem.
#[derive(Debug, Clone, Deserialize)]
pub struct MountPoint {
    pub src: String,
    pub dest: String,
}

impl ClusterConfig {
    pub fn load(path: &Path) -> PlanResult<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            PlanError::config(format!("cannot read cluster config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&data).map_err(|e| {
            PlanError::config(format!("invalid cluster config {}: {}", path.display(), e))
        })
    }

    /// Translate a mounted path to its physical location for existence
    /// checks. Paths outside any mount are returned unchanged.
    pub fn unmounted_path(&self, path: &str) -> String {
        for mount in &self.mounts {
            if let Some(rest) = path.strip_prefix(&mount.dest) {
                if rest.is_empty() || rest.starts_with('/') {
                    return format!("{}{}", mount.src, rest);
                }
            }
        }
        path.to_string()
    }

    /// Container image for a named entry, falling back to the name itself
    /// so bare image references keep working.
    pub fn container(&self, name: &str) -> String {
        self.containers
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "fleet_config_test_{}_{}.yaml",
            std::process::id(),
            contents.len()
        ));
        let mut file = fs::File::create(&path).expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write temp config");
        path
    }

    #[test]
    fn loads_minimal_local_config() {
        let path = temp_config("executor: local\n");
        let config = ClusterConfig::load(&path).expect("load");
        assert_eq!(config.executor, ExecutorKind::Local);
        assert!(config.ssh_tunnel.is_none());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn loads_slurm_config_with_tunnel_and_mounts() {
        let path = temp_config(
            "executor: slurm\nssh_tunnel:\n  host: login.cluster\n  user: bot\ncontainers:\n  fleet: registry/fleet:latest\nmounts:\n  - src: /lustre/results\n    dest: /results\n",
        );
        let config = ClusterConfig::load(&path).expect("load");
        assert_eq!(config.executor, ExecutorKind::Slurm);
        assert_eq!(config.ssh_tunnel.as_ref().expect("tunnel").host, "login.cluster");
        assert_eq!(config.container("fleet"), "registry/fleet:latest");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn unmounted_path_remaps_mounted_prefixes_only() {
        let config = ClusterConfig {
            executor: ExecutorKind::Slurm,
            ssh_tunnel: None,
            containers: BTreeMap::new(),
            mounts: vec![MountPoint {
                src: "/lustre/results".to_string(),
                dest: "/results".to_string(),
            }],
        };
        assert_eq!(config.unmounted_path("/results/run1"), "/lustre/results/run1");
        assert_eq!(config.unmounted_path("/results"), "/lustre/results");
        assert_eq!(config.unmounted_path("/resultsx/run1"), "/resultsx/run1");
        assert_eq!(config.unmounted_path("/other/run1"), "/other/run1");
    }

    #[test]
    fn missing_config_is_a_configuration_error() {
        let err = ClusterConfig::load(Path::new("/nonexistent/cluster.yaml")).expect_err("missing");
        assert!(err.to_string().contains("configuration error"));
    }
}
