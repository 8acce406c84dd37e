use anyhow::Result;
use clap::Parser;

use fleet_sandbox::{serve, Sandbox};

#[derive(Parser)]
#[command(name = "fleet-sandbox", version, about = "Sandboxed code execution service")]
struct Cli {
    #[arg(long, default_value_t = 6000)]
    port: u16,
    /// Interpreter used to run submitted code.
    #[arg(long, default_value = "python3")]
    interpreter: String,
    #[arg(long, default_value_t = 10)]
    memory_limit_gb: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let sandbox = Sandbox::new(
        &cli.interpreter,
        cli.memory_limit_gb * 1024 * 1024 * 1024,
    );
    serve(cli.port, sandbox)
}
