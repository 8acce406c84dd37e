use std::net::TcpListener;

use fleet_core::{PlanError, PlanResult};
use serde::Serialize;

pub const DEFAULT_SERVER_PORT: u16 = 5000;
pub const DEFAULT_SANDBOX_PORT: u16 = 6000;
const FULL_NODE_GPUS: u32 = 8;

/// Whether jobs use fixed well-known ports or freshly allocated ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPolicy {
    Fixed,
    RandomFree,
}

pub fn port_policy(server_gpus: Option<u32>, exclusive: bool) -> PortPolicy {
    if server_gpus != Some(FULL_NODE_GPUS) && !exclusive {
        PortPolicy::RandomFree
    } else {
        PortPolicy::Fixed
    }
}

pub fn sandbox_port(policy: PortPolicy) -> Option<u16> {
    match policy {
        PortPolicy::Fixed => Some(DEFAULT_SANDBOX_PORT),
        PortPolicy::RandomFree => None,
    }
}

pub fn pick_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Descriptor for a model server the job must boot itself. Absent when
/// the model is hosted externally and the job only needs an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub model_path: Option<String>,
    pub server_type: String,
    pub num_gpus: u32,
    pub num_nodes: u32,
    pub server_args: String,
    pub server_entrypoint: String,
    pub server_port: u16,
}

#[derive(Debug, Clone)]
pub struct HostingRequest<'a> {
    pub server_address: Option<&'a str>,
    pub model: Option<&'a str>,
    pub server_type: &'a str,
    pub server_gpus: Option<u32>,
    pub server_nodes: u32,
    pub server_args: &'a str,
    pub server_entrypoint: Option<&'a str>,
    /// Per-generation-kind default used when no entrypoint is given.
    pub default_entrypoint: &'a str,
}

#[derive(Debug, Clone)]
pub struct ClientSetup {
    pub server: Option<ServerConfig>,
    pub server_address: String,
    /// Connection arguments injected into the generation command.
    pub client_args: String,
}

/// Decide how the generation client reaches its model server: pass an
/// external address through, or allocate a port and describe the server
/// the job has to boot.
pub fn configure_client(req: &HostingRequest, policy: PortPolicy) -> PlanResult<ClientSetup> {
    match req.server_address {
        Some(address) => {
            let mut client_args = format!(
                "++server.server_type={} ++server.base_url={}",
                req.server_type, address
            );
            if let Some(model) = req.model {
                client_args.push_str(&format!(" ++server.model={}", model));
            }
            Ok(ClientSetup {
                server: None,
                server_address: address.to_string(),
                client_args,
            })
        }
        None => {
            let num_gpus = req.server_gpus.ok_or_else(|| {
                PlanError::config("Need to specify server_gpus if hosting the model")
            })?;
            let server_port = match policy {
                PortPolicy::Fixed => DEFAULT_SERVER_PORT,
                PortPolicy::RandomFree => pick_free_port().map_err(|e| {
                    PlanError::config(format!("cannot allocate a free port: {}", e))
                })?,
            };
            let client_args = format!(
                "++server.server_type={} ++server.host=localhost ++server.port={}",
                req.server_type, server_port
            );
            Ok(ClientSetup {
                server: Some(ServerConfig {
                    model_path: req.model.map(str::to_string),
                    server_type: req.server_type.to_string(),
                    num_gpus,
                    num_nodes: req.server_nodes,
                    server_args: req.server_args.to_string(),
                    server_entrypoint: req
                        .server_entrypoint
                        .unwrap_or(req.default_entrypoint)
                        .to_string(),
                    server_port,
                }),
                server_address: format!("localhost:{}", server_port),
                client_args,
            })
        }
    }
}
