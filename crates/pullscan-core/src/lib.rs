//! pullscan-core: baseline-diffed security scanning of pull requests.
//!
//! Takes a pull request's head tree (and optionally its base tree) as
//! `base64(gzip(tar))` archives, runs an external static-analysis scanner
//! over both, and reports only the findings the change introduces.
//!
//! # Pipeline
//!
//! - [`archive`] - decodes and safely extracts an archive into a directory
//! - [`workspace`] - per-request scratch directory, removed on drop
//! - [`runner`] - child-process seam used to invoke the scanner
//! - [`orchestrator`] - baseline pass, then head pass against the baseline
//! - [`pipeline`] - wires the above together for one request
//!
//! # Example
//!
//! ```no_run
//! use pullscan_core::{Analyzer, AnalyzerConfig, ScanRequest};
//!
//! # async fn run(head: String) -> pullscan_core::Result<()> {
//! let analyzer = Analyzer::new(AnalyzerConfig {
//!     tmp_dir: std::env::temp_dir(),
//!     ..AnalyzerConfig::default()
//! });
//! let outcome = analyzer.analyze(ScanRequest::head_only(head)).await?;
//! println!("new findings: {}", outcome.has_findings);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod runner;
pub mod types;
pub mod workspace;

// Re-exports for convenience.
pub use archive::{unpack, ArchiveLimits, UnpackSummary};
pub use error::{AnalyzeError, RunError, ScanError, UnpackError, WorkspaceError};
pub use orchestrator::{ScanOrchestrator, ScannerConfig};
pub use pipeline::{Analyzer, AnalyzerConfig};
pub use runner::{Invocation, ProcessOutput, ProcessRunner, TokioRunner};
pub use types::{ScanOutcome, ScanPhase, ScanRequest, ScanResponse};
pub use workspace::Workspace;

/// Result type for pullscan analysis.
pub type Result<T> = std::result::Result<T, AnalyzeError>;
