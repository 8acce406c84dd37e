use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 10 GB address-space ceiling, so generated code cannot exhaust the host.
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub generated_code: String,
    /// Wall-clock budget in seconds.
    pub timeout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub process_status: String,
    pub stdout: String,
    pub stderr: String,
    pub traceback: String,
}

impl ExecutionResult {
    fn completed(stdout: String, stderr: String, traceback: String) -> Self {
        ExecutionResult {
            process_status: "completed".to_string(),
            stdout,
            stderr,
            traceback,
        }
    }

    fn timed_out() -> Self {
        ExecutionResult {
            process_status: "timeout".to_string(),
            stdout: "TimeoutError".to_string(),
            stderr: "TimeoutError".to_string(),
            traceback: "TimeoutError".to_string(),
        }
    }

    fn error(message: String) -> Self {
        ExecutionResult {
            process_status: "error".to_string(),
            stdout: String::new(),
            stderr: message.clone(),
            traceback: message,
        }
    }
}

pub struct Sandbox {
    interpreter: String,
    memory_limit_bytes: u64,
}

impl Sandbox {
    pub fn new(interpreter: &str, memory_limit_bytes: u64) -> Self {
        Sandbox {
            interpreter: interpreter.to_string(),
            memory_limit_bytes,
        }
    }

    /// Run one piece of generated code. Never panics and never hangs:
    /// the subprocess is killed and reaped once the budget expires, and
    /// failures inside the code land in `stderr`/`traceback`.
    pub fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult {
        let script_path = std::env::temp_dir().join(format!(
            "fleet_sandbox_{}_{}.code",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        if let Err(e) = fs::write(&script_path, code) {
            return ExecutionResult::error(format!("cannot stage code: {}", e));
        }
        let result = self.run_script(&script_path, timeout);
        let _ = fs::remove_file(&script_path);
        result
    }

    fn run_script(&self, script_path: &Path, timeout: Duration) -> ExecutionResult {
        let limit_kb = self.memory_limit_bytes / 1024;
        let command = format!(
            "ulimit -v {}; exec {} \"{}\"",
            limit_kb,
            self.interpreter,
            script_path.display()
        );
        let mut child = match Command::new("bash")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ExecutionResult::error(format!("cannot spawn interpreter: {}", e)),
        };

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return kill_and_report_timeout(&mut child, stdout_reader, stderr_reader);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ExecutionResult::error(format!("cannot poll subprocess: {}", e));
                }
            }
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);
        let traceback = if status.success() { String::new() } else { stderr.clone() };
        ExecutionResult::completed(stdout, stderr, traceback)
    }
}

fn kill_and_report_timeout(
    child: &mut Child,
    stdout_reader: Option<thread::JoinHandle<String>>,
    stderr_reader: Option<thread::JoinHandle<String>>,
) -> ExecutionResult {
    let _ = child.kill();
    // Reap the child so no zombie outlives the request.
    let _ = child.wait();
    let _ = join_reader(stdout_reader);
    let _ = join_reader(stderr_reader);
    warn!("generated code exceeded its time budget, killed");
    ExecutionResult::timed_out()
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = pipe.read_to_string(&mut buffer);
            buffer
        })
    })
}

fn join_reader(reader: Option<thread::JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Serve the `/execute` contract until the process is terminated.
pub fn serve(port: u16, sandbox: Sandbox) -> Result<()> {
    let server = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|e| anyhow!("cannot bind sandbox server on port {}: {}", port, e))?;
    info!("sandbox listening on port {}", port);
    for mut request in server.incoming_requests() {
        let (status, result) = handle_request(&sandbox, &mut request);
        let body = serde_json::to_string(&result)
            .unwrap_or_else(|_| "{\"process_status\":\"error\"}".to_string());
        let mut response = tiny_http::Response::from_string(body).with_status_code(status);
        if let Ok(header) =
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        {
            response = response.with_header(header);
        }
        let _ = request.respond(response);
    }
    Ok(())
}

fn handle_request(sandbox: &Sandbox, request: &mut tiny_http::Request) -> (u16, ExecutionResult) {
    if request.method() != &tiny_http::Method::Post || request.url() != "/execute" {
        return (
            404,
            ExecutionResult::error(format!("no such endpoint: {}", request.url())),
        );
    }
    let mut body = String::new();
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        return (400, ExecutionResult::error(format!("unreadable request: {}", e)));
    }
    let parsed: ExecutionRequest = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) => return (400, ExecutionResult::error(format!("invalid request: {}", e))),
    };
    let timeout = if parsed.timeout.is_finite() && parsed.timeout > 0.0 {
        Duration::from_secs_f64(parsed.timeout)
    } else {
        Duration::ZERO
    };
    (200, sandbox.execute(&parsed.generated_code, timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bash_sandbox() -> Sandbox {
        Sandbox::new("bash", DEFAULT_MEMORY_LIMIT_BYTES)
    }

    #[test]
    fn completed_execution_captures_stdout_and_stderr() {
        let result = bash_sandbox().execute("echo hello; echo oops >&2", Duration::from_secs(10));
        assert_eq!(result.process_status, "completed");
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.stderr.contains("oops"));
        assert!(result.traceback.is_empty());
    }

    #[test]
    fn failing_code_lands_in_stderr_and_traceback() {
        let result = bash_sandbox().execute("echo broken >&2; exit 3", Duration::from_secs(10));
        assert_eq!(result.process_status, "completed");
        assert!(result.stderr.contains("broken"));
        assert_eq!(result.traceback, result.stderr);
    }

    #[test]
    fn timeout_kills_the_process_within_a_bounded_overhead() {
        let start = Instant::now();
        let result = bash_sandbox().execute("sleep 10", Duration::from_secs(2));
        assert_eq!(result.process_status, "timeout");
        assert_eq!(result.stdout, "TimeoutError");
        assert_eq!(result.stderr, "TimeoutError");
        assert_eq!(result.traceback, "TimeoutError");
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "timeout took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn missing_interpreter_still_returns_a_record() {
        let sandbox = Sandbox::new("definitely-not-an-interpreter", DEFAULT_MEMORY_LIMIT_BYTES);
        let result = sandbox.execute("echo hi", Duration::from_secs(5));
        // bash reports the missing interpreter on stderr and exits 127.
        assert_eq!(result.process_status, "completed");
        assert!(!result.stderr.is_empty());
        assert_eq!(result.traceback, result.stderr);
    }
}
