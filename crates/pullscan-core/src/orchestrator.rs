//! Two-phase scanner driver.
//!
//! ```text
//!   has_base?
//!     yes -> baseline phase: scan base/, write JSON report to baseline.json,
//!            --exit-zero so findings never fail this phase
//!     no  -> baseline.json stays as the `{}` placeholder
//!   head phase: scan head/ with --baseline baseline.json, report to stdout
//!     exit 0 -> clean
//!     exit 1 -> findings (stdout is the report)
//!     other  -> error
//! ```
//!
//! Both phases run with the tree root as working directory and scan `.`,
//! so file paths recorded in the baseline match those seen in the head scan.
//! Suppression depends on that.

use std::ffi::OsString;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RunError, ScanError};
use crate::runner::{Invocation, ProcessOutput, ProcessRunner};
use crate::types::{ScanOutcome, ScanPhase};
use crate::workspace::Workspace;

/// Exit code meaning "scan completed, nothing unsuppressed".
const EXIT_CLEAN: i32 = 0;

/// Exit code meaning "scan completed with findings".
const EXIT_FINDINGS: i32 = 1;

/// How to invoke the external scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Scanner executable (default: `bandit`).
    #[serde(default = "default_program")]
    pub program: String,

    /// Per-invocation time limit in seconds; 0 disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Report format for the head phase. The scanner's default when unset.
    #[serde(default)]
    pub report_format: Option<String>,

    /// Extra arguments appended to both invocations.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_secs: default_timeout_secs(),
            report_format: None,
            extra_args: Vec::new(),
        }
    }
}

impl ScannerConfig {
    /// Time limit for one invocation, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

fn default_program() -> String {
    String::from("bandit")
}

const fn default_timeout_secs() -> u64 {
    300
}

/// Drives the baseline and head scans for one workspace.
#[derive(Debug, Clone)]
pub struct ScanOrchestrator<R> {
    runner: R,
    config: ScannerConfig,
}

impl<R> ScanOrchestrator<R> {
    /// Create an orchestrator that invokes the scanner through `runner`.
    pub const fn new(runner: R, config: ScannerConfig) -> Self {
        Self { runner, config }
    }

    /// The process runner scans go through.
    pub const fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: ProcessRunner> ScanOrchestrator<R> {
    /// Run the baseline phase (when `has_base`) and then the head phase.
    ///
    /// The base tree must already be unpacked if `has_base` is set; the head
    /// tree must be unpacked before calling.
    pub async fn scan(
        &self,
        workspace: &Workspace,
        has_base: bool,
    ) -> Result<ScanOutcome, ScanError> {
        if has_base {
            self.baseline(workspace).await?;
        }
        self.head(workspace).await
    }

    /// Scan the base tree into the workspace's baseline findings file.
    pub async fn baseline(&self, workspace: &Workspace) -> Result<(), ScanError> {
        let invocation = self
            .invocation(workspace, ScanPhase::Base)
            .args(["-f", "json", "-o"])
            .arg(workspace.baseline_findings())
            .args(["-r", ".", "--exit-zero"])
            .args(self.extra_args());

        let output = self
            .run(&invocation, ScanPhase::Base)
            .await
            .map_err(|e| match e {
                PhaseFailure::Timeout(err) => err,
                PhaseFailure::Start(reason) => ScanError::Baseline {
                    reason,
                    output: String::new(),
                },
            })?;

        match output.exit_code {
            Some(EXIT_CLEAN) => Ok(()),
            code => {
                let output = output.combined();
                warn!(exit_code = ?code, output = %output, "baseline scan failed");
                Err(ScanError::Baseline {
                    reason: exit_reason(code),
                    output,
                })
            }
        }
    }

    /// Scan the head tree against the baseline and interpret the exit code.
    pub async fn head(&self, workspace: &Workspace) -> Result<ScanOutcome, ScanError> {
        let mut invocation = self
            .invocation(workspace, ScanPhase::Head)
            .arg("--baseline")
            .arg(workspace.baseline_findings());
        if let Some(format) = &self.config.report_format {
            invocation = invocation.args(["-f", format.as_str()]);
        }
        let invocation = invocation.args(["-o", "-", "-r", "."]).args(self.extra_args());

        let output = self
            .run(&invocation, ScanPhase::Head)
            .await
            .map_err(|e| match e {
                PhaseFailure::Timeout(err) => err,
                PhaseFailure::Start(reason) => ScanError::Head {
                    reason,
                    exit_code: None,
                    output: String::new(),
                },
            })?;

        match output.exit_code {
            Some(EXIT_CLEAN) => {
                info!("head scan clean");
                Ok(ScanOutcome::clean())
            }
            Some(EXIT_FINDINGS) => {
                let report = String::from_utf8_lossy(&output.stdout).into_owned();
                info!(report_bytes = report.len(), "head scan reported findings");
                Ok(ScanOutcome::with_findings(report))
            }
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                warn!(exit_code = ?code, stderr = %stderr, "head scan failed");
                Err(ScanError::Head {
                    reason: exit_reason(code),
                    exit_code: code,
                    output: stderr,
                })
            }
        }
    }

    fn invocation(&self, workspace: &Workspace, phase: ScanPhase) -> Invocation {
        Invocation::new(&self.config.program, workspace.tree(phase)).timeout(self.config.timeout())
    }

    fn extra_args(&self) -> impl Iterator<Item = OsString> + '_ {
        self.config.extra_args.iter().map(OsString::from)
    }

    async fn run(
        &self,
        invocation: &Invocation,
        phase: ScanPhase,
    ) -> Result<ProcessOutput, PhaseFailure> {
        info!(phase = %phase, program = %invocation.program, "starting scan");
        let started = Instant::now();

        let output = self.runner.run(invocation).await.map_err(|e| match e {
            RunError::Timeout { after, .. } => {
                warn!(phase = %phase, timeout_secs = after.as_secs(), "scan timed out");
                PhaseFailure::Timeout(ScanError::Timeout { phase, after })
            }
            RunError::Spawn { .. } => {
                warn!(phase = %phase, error = %e, "scan could not start");
                PhaseFailure::Start(e.to_string())
            }
        })?;

        info!(
            phase = %phase,
            exit_code = ?output.exit_code,
            elapsed_ms = started.elapsed().as_millis(),
            "scan finished"
        );
        Ok(output)
    }
}

enum PhaseFailure {
    Timeout(ScanError),
    Start(String),
}

fn exit_reason(code: Option<i32>) -> String {
    code.map_or_else(
        || String::from("terminated by signal"),
        |c| format!("exit code {c}"),
    )
}
