//! Shared test infrastructure for integration tests.
//!
//! `MockBackend` is a minimal route-based HTTP listener standing in for the
//! extraction, rewrite, registry, and export services. `Workflow` wraps a
//! temporary session directory and runs the real `mhub` binary against it.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use tempfile::TempDir;

/// Canned HTTP backend. Each registered route answers every POST whose path
/// matches; unknown paths get a 404. The listener thread lives until the
/// test process exits.
pub struct MockBackend {
    pub base_url: String,
}

impl MockBackend {
    pub fn serve(routes: Vec<(&'static str, u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend addr");
        let table: HashMap<&'static str, (u16, Vec<u8>)> = routes
            .into_iter()
            .map(|(path, status, body)| (path, (status, body)))
            .collect();

        thread::spawn(move || {
            while let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                    continue;
                }
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .split('?')
                    .next()
                    .unwrap_or("/")
                    .to_string();

                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 {
                        break;
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        break;
                    }
                    if let Some(value) = trimmed
                        .to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(str::trim)
                        .and_then(|v| v.parse().ok())
                    {
                        content_length = value;
                    }
                }
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);

                let (status, payload) = match table.get(path.as_str()) {
                    Some((status, payload)) => (*status, payload.clone()),
                    None => (404, b"{\"detail\":\"no such route\"}".to_vec()),
                };
                let reason = if status == 200 { "OK" } else { "Error" };
                let mut response = format!(
                    "HTTP/1.1 {status} {reason}\r\nconnection: close\r\ncontent-length: {}\r\n\r\n",
                    payload.len()
                )
                .into_bytes();
                response.extend_from_slice(&payload);
                let _ = reader.get_mut().write_all(&response);
            }
        });

        MockBackend {
            base_url: format!("http://{addr}"),
        }
    }
}

/// A session directory plus the backend URL the spawned binary talks to.
pub struct Workflow {
    _tempdir: TempDir,
    pub session_dir: PathBuf,
    base_url: String,
}

impl Workflow {
    pub fn new(backend: &MockBackend) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let session_dir = tempdir.path().to_path_buf();
        Workflow {
            _tempdir: tempdir,
            session_dir,
            base_url: backend.base_url.clone(),
        }
    }

    /// Run `mhub <args> --session <dir>` and return the raw output.
    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_stdin(args, None)
    }

    /// Run `mhub <args> --session <dir>`, feeding `stdin` when provided.
    pub fn run_with_stdin(&self, args: &[&str], stdin: Option<&str>) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_mhub"));
        command
            .args(args)
            .arg("--session")
            .arg(&self.session_dir)
            .env("MHUB_BACKEND_URL", &self.base_url)
            .env("MHUB_TIMEOUT_SECS", "5")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(input) = stdin {
            command.stdin(Stdio::piped());
            let mut child = command.spawn().expect("spawn mhub");
            child
                .stdin
                .take()
                .expect("child stdin")
                .write_all(input.as_bytes())
                .expect("write stdin");
            child.wait_with_output().expect("wait for mhub")
        } else {
            command.stdin(Stdio::null());
            command.output().expect("run mhub")
        }
    }

    /// Run a command that must succeed; returns stdout.
    pub fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "mhub {args:?} failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Parse `mhub status --json` output.
    pub fn status_json(&self) -> serde_json::Value {
        let stdout = self.run_ok(&["status", "--json"]);
        serde_json::from_str(&stdout).expect("status JSON")
    }

    /// Read the persisted session record directly.
    pub fn session_record(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.session_dir.join("session.json"))
            .expect("read session.json");
        serde_json::from_str(&raw).expect("session JSON")
    }

    /// Write a manuscript file inside the session tempdir and return its path.
    pub fn manuscript(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.session_dir.join(name);
        std::fs::write(&path, bytes).expect("write manuscript");
        path
    }
}
