use std::time::Duration;

use anyhow::{Context, Result};

use crate::server::{ExecutionRequest, ExecutionResult};

/// Padding added to the HTTP timeout over the execution budget, so the
/// server's own timeout handling always wins the race.
const HTTP_TIMEOUT_PADDING: Duration = Duration::from_secs(10);

pub struct SandboxClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl SandboxClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .context("cannot build sandbox http client")?;
        Ok(SandboxClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn execute(&self, generated_code: &str, timeout_secs: f64) -> Result<ExecutionResult> {
        let request = ExecutionRequest {
            generated_code: generated_code.to_string(),
            timeout: timeout_secs,
        };
        let budget = Duration::from_secs_f64(timeout_secs.max(0.0)) + HTTP_TIMEOUT_PADDING;
        let response = self
            .http
            .post(format!("{}/execute", self.base_url))
            .timeout(budget)
            .json(&request)
            .send()
            .context("sandbox request failed")?;
        response.json().context("malformed sandbox response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{serve, Sandbox, DEFAULT_MEMORY_LIMIT_BYTES};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Instant;

    fn start_server() -> u16 {
        let port = TcpListener::bind(("127.0.0.1", 0))
            .and_then(|listener| listener.local_addr())
            .expect("pick free port")
            .port();
        thread::spawn(move || {
            let _ = serve(port, Sandbox::new("bash", DEFAULT_MEMORY_LIMIT_BYTES));
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while TcpStream::connect(("127.0.0.1", port)).is_err() {
            assert!(Instant::now() < deadline, "sandbox server did not come up");
            thread::sleep(Duration::from_millis(20));
        }
        port
    }

    #[test]
    fn execute_round_trips_the_contract() {
        let port = start_server();
        let client =
            SandboxClient::new(&format!("http://127.0.0.1:{}", port)).expect("client");

        let result = client.execute("echo ping", 5.0).expect("completed execution");
        assert_eq!(result.process_status, "completed");
        assert_eq!(result.stdout.trim(), "ping");

        let start = Instant::now();
        let result = client.execute("sleep 10", 2.0).expect("timeout execution");
        assert_eq!(result.process_status, "timeout");
        assert_eq!(result.stdout, "TimeoutError");
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
