//! End-to-end analysis of one request.
//!
//! Sequence: validate -> workspace -> unpack base -> baseline scan ->
//! unpack head -> head scan. Any failure short-circuits; the workspace is
//! removed on the blocking pool before `analyze` returns, whichever way it
//! returns. If the future is dropped mid-flight, the workspace still removes
//! itself when the last handle goes away.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use crate::archive::{self, ArchiveLimits};
use crate::error::AnalyzeError;
use crate::orchestrator::{ScanOrchestrator, ScannerConfig};
use crate::runner::{ProcessRunner, TokioRunner};
use crate::types::{ScanOutcome, ScanPhase, ScanRequest};
use crate::workspace::Workspace;

/// Settings for an [`Analyzer`], resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    /// Directory workspaces are created under.
    pub tmp_dir: PathBuf,
    /// Scanner invocation settings.
    pub scanner: ScannerConfig,
    /// Per-archive unpack budgets.
    pub limits: ArchiveLimits,
}

/// Shared, stateless entry point for analyzing pull requests.
///
/// Holds configuration only; every call gets its own workspace, so
/// concurrent calls never share filesystem state.
#[derive(Debug)]
pub struct Analyzer<R = TokioRunner> {
    tmp_dir: PathBuf,
    limits: ArchiveLimits,
    orchestrator: ScanOrchestrator<R>,
}

impl Analyzer<TokioRunner> {
    /// Analyzer that runs the real scanner as a child process.
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_runner(config, TokioRunner)
    }
}

impl<R: ProcessRunner> Analyzer<R> {
    /// Analyzer that invokes the scanner through `runner`.
    pub fn with_runner(config: AnalyzerConfig, runner: R) -> Self {
        Self {
            tmp_dir: config.tmp_dir,
            limits: config.limits,
            orchestrator: ScanOrchestrator::new(runner, config.scanner),
        }
    }

    /// Reject requests that cannot be analyzed, before touching the disk.
    pub fn validate(request: &ScanRequest) -> Result<(), AnalyzeError> {
        if request.head.is_empty() {
            return Err(AnalyzeError::Validation("head cannot be empty".into()));
        }
        Ok(())
    }

    /// Run the full pipeline for `request`.
    pub async fn analyze(&self, request: ScanRequest) -> Result<ScanOutcome, AnalyzeError> {
        Self::validate(&request)?;

        let workspace = Arc::new(Workspace::create(&self.tmp_dir)?);
        let span = info_span!("analyze", workspace = %workspace.id());
        let result = self.run(&workspace, request).instrument(span.clone()).await;

        // Removal walks the whole tree; keep it off the async workers.
        if let Err(e) = tokio::task::spawn_blocking(move || drop(workspace)).await {
            let _enter = span.enter();
            warn!(error = %e, "workspace teardown task failed");
        }
        result
    }

    async fn run(
        &self,
        workspace: &Arc<Workspace>,
        request: ScanRequest,
    ) -> Result<ScanOutcome, AnalyzeError> {
        let has_base = request.has_base();
        info!(has_base, "attempting to analyze");
        let ScanRequest { base, head } = request;

        if has_base {
            self.unpack(workspace, ScanPhase::Base, base).await?;
            self.orchestrator.baseline(workspace).await?;
        }

        self.unpack(workspace, ScanPhase::Head, head).await?;
        let outcome = self.orchestrator.head(workspace).await?;

        if outcome.has_findings {
            info!("success: findings");
        } else {
            info!("success: no findings");
        }
        Ok(outcome)
    }

    /// Unpack one archive on the blocking pool.
    async fn unpack(
        &self,
        workspace: &Arc<Workspace>,
        phase: ScanPhase,
        encoded: String,
    ) -> Result<(), AnalyzeError> {
        let ws = Arc::clone(workspace);
        let limits = self.limits;
        let span = tracing::debug_span!("unpack", phase = %phase);

        let summary = tokio::task::spawn_blocking(move || {
            archive::unpack_with_limits(&encoded, ws.tree(phase), &limits)
        })
        .instrument(span)
        .await?
        .map_err(|source| AnalyzeError::Unpack { phase, source })?;

        info!(
            phase = %phase,
            files = summary.files,
            directories = summary.directories,
            skipped = summary.skipped,
            bytes = summary.bytes,
            "archive unpacked"
        );
        Ok(())
    }
}
