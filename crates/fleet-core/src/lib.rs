pub mod config;
pub mod error;
pub mod ids;
pub mod naming;

pub use config::{ClusterConfig, ExecutorKind, MountPoint, SshTunnelConfig};
pub use error::{PlanError, PlanResult};
pub use ids::{compute_chunk_ids, parse_id_spec};
pub use naming::{marker_path, output_filename, output_path};
