#![allow(dead_code)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use pullscan_core::{Analyzer, AnalyzerConfig, Invocation, ProcessOutput, ProcessRunner, RunError};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::net::TcpListener;
use walkdir::WalkDir;

/// Rule the fake scanner reports.
pub const RULE: &str = "B605:start_process_with_a_shell";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Finding {
    filename: String,
    line_number: usize,
    test_id: String,
    code: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Report {
    #[serde(default)]
    results: Vec<Finding>,
}

/// Stand-in for the real scanner with the same exit-code and baseline
/// contract: every `os.system(` line in a `.py` file is a finding, the
/// baseline run writes a JSON report, and the head run suppresses findings
/// whose file, rule and code line already appear in the baseline.
#[derive(Debug, Default)]
pub struct FakeBandit {
    /// Delay before answering, to force concurrent requests to overlap.
    pub delay: Duration,
}

impl FakeBandit {
    fn scan(root: &Path) -> Vec<Finding> {
        let mut findings = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let Ok(entry) = entry else { continue };
            if entry.path().extension() != Some(OsStr::new("py")) {
                continue;
            }
            let Ok(source) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            for (idx, line) in source.lines().enumerate() {
                if line.contains("os.system(") {
                    findings.push(Finding {
                        filename: format!("./{}", rel.display()),
                        line_number: idx + 1,
                        test_id: String::from("B605"),
                        code: line.trim().to_string(),
                    });
                }
            }
        }
        findings
    }
}

#[async_trait]
impl ProcessRunner for FakeBandit {
    async fn run(&self, inv: &Invocation) -> Result<ProcessOutput, RunError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        assert!(inv.has_arg("-r"), "scanner must be recursive");
        let findings = Self::scan(&inv.working_dir);

        if inv.has_arg("--exit-zero") {
            let out = inv.arg_after("-o").expect("baseline output path");
            let report = Report { results: findings };
            std::fs::write(out, serde_json::to_vec(&report).unwrap()).unwrap();
            return Ok(ProcessOutput {
                exit_code: Some(0),
                ..ProcessOutput::default()
            });
        }

        // The real tool crashes when the baseline file is missing.
        let baseline_path = inv.arg_after("--baseline").expect("baseline flag");
        let Ok(raw) = std::fs::read(baseline_path) else {
            return Ok(ProcessOutput {
                exit_code: Some(2),
                stderr: b"baseline file not found".to_vec(),
                ..ProcessOutput::default()
            });
        };
        let baseline: Report = serde_json::from_slice(&raw).unwrap_or_default();

        let new: Vec<&Finding> = findings
            .iter()
            .filter(|f| {
                !baseline.results.iter().any(|b| {
                    b.filename == f.filename && b.test_id == f.test_id && b.code == f.code
                })
            })
            .collect();
        if new.is_empty() {
            return Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: b"No issues identified.\n".to_vec(),
                ..ProcessOutput::default()
            });
        }

        let mut report = String::from("Run started\n\nTest results:\n");
        for f in new {
            report.push_str(&format!(
                ">> Issue: [{RULE}] Starting a process with a shell.\n"
            ));
            report.push_str(&format!(
                "   Location: {}:{}:0\n{}\t{}\n\n",
                f.filename, f.line_number, f.line_number, f.code
            ));
        }
        Ok(ProcessOutput {
            exit_code: Some(1),
            stdout: report.into_bytes(),
            stderr: b"[main]\tINFO\tprofile include tests: None\n".to_vec(),
        })
    }
}

/// Scanner that always fails like a broken install.
#[derive(Debug, Default)]
pub struct BrokenScanner;

#[async_trait]
impl ProcessRunner for BrokenScanner {
    async fn run(&self, _inv: &Invocation) -> Result<ProcessOutput, RunError> {
        Ok(ProcessOutput {
            exit_code: Some(2),
            stdout: Vec::new(),
            stderr: b"Traceback (most recent call last):\nImportError\n".to_vec(),
        })
    }
}

/// `base64(gzip(tar))` of regular files.
pub fn archive(files: &[(&str, &str)]) -> String {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    encode(builder)
}

/// Archive with one entry whose name is written verbatim, unchecked.
pub fn hostile_archive(name: &str) -> String {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"pwned"[..]).unwrap();
    encode(builder)
}

fn encode(builder: tar::Builder<GzEncoder<Vec<u8>>>) -> String {
    let gz = builder.into_inner().unwrap().finish().unwrap();
    base64::engine::general_purpose::STANDARD.encode(gz)
}

/// A running service on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    tmp: TempDir,
}

impl TestServer {
    pub async fn start<R: ProcessRunner + 'static>(runner: R) -> Self {
        Self::start_with_limit(runner, 64 * 1024 * 1024).await
    }

    pub async fn start_with_limit<R: ProcessRunner + 'static>(runner: R, max_body: usize) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let config = AnalyzerConfig {
            tmp_dir: tmp.path().to_path_buf(),
            ..AnalyzerConfig::default()
        };
        let analyzer = Arc::new(Analyzer::with_runner(config, runner));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(pullscan_srv::server::serve(
            listener,
            analyzer,
            max_body,
            std::future::pending(),
        ));

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            tmp,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Base directory workspaces are created in.
    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp.path().to_path_buf()
    }

    /// Number of workspaces currently on disk.
    pub fn live_workspaces(&self) -> usize {
        std::fs::read_dir(self.tmp.path()).unwrap().count()
    }

    pub async fn pull(&self, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/pull"))
            .json(body)
            .send()
            .await
            .expect("send request")
    }
}
