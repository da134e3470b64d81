//! Per-request scratch area holding the two trees and the baseline file.
//!
//! A [`Workspace`] is created fresh for every request and deletes itself
//! when dropped, on success, on error returns, and during unwinding.
//! Deletion failures are logged and never reported to the caller.

use std::borrow::Cow;
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::WorkspaceError;
use crate::types::ScanPhase;

/// Prefix for workspace directory names under the temp base.
const DIR_PREFIX: &str = "pullscan";

/// Name of the baseline findings file inside the workspace root.
const BASELINE_FILE: &str = "baseline.json";

/// Placeholder baseline. The scanner refuses to start if the file it is
/// pointed at does not exist, even when no baseline scan ran.
const EMPTY_BASELINE: &[u8] = b"{}";

/// Mode for the `base` and `head` tree roots.
const TREE_MODE: u32 = 0o700;

/// An exclusive, self-deleting scratch directory.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    base: PathBuf,
    head: PathBuf,
    baseline: PathBuf,
}

impl Workspace {
    /// Allocate a uniquely named workspace under `tmp_root`.
    pub fn create(tmp_root: &Path) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir_in(tmp_root)
            .map_err(|source| WorkspaceError {
                path: tmp_root.to_path_buf(),
                source,
            })?;

        // From here on, an early return drops `dir` and removes it.
        let root = dir.path().to_path_buf();
        let base = root.join(ScanPhase::Base.as_str());
        let head = root.join(ScanPhase::Head.as_str());
        let baseline = root.join(BASELINE_FILE);

        for tree in [&base, &head] {
            DirBuilder::new()
                .mode(TREE_MODE)
                .create(tree)
                .map_err(|source| WorkspaceError {
                    path: tree.clone(),
                    source,
                })?;
        }
        fs::write(&baseline, EMPTY_BASELINE).map_err(|source| WorkspaceError {
            path: baseline.clone(),
            source,
        })?;

        debug!(root = %root.display(), "workspace created");

        Ok(Self {
            dir: Some(dir),
            root,
            base,
            head,
            baseline,
        })
    }

    /// Unique directory name, used to tag this request's log lines.
    pub fn id(&self) -> Cow<'_, str> {
        self.root
            .file_name()
            .map_or(Cow::Borrowed(""), |name| name.to_string_lossy())
    }

    /// Root directory of the workspace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the pre-change tree is unpacked into.
    pub fn base_tree(&self) -> &Path {
        &self.base
    }

    /// Directory the post-change tree is unpacked into.
    pub fn head_tree(&self) -> &Path {
        &self.head
    }

    /// Tree root for the given phase.
    pub fn tree(&self, phase: ScanPhase) -> &Path {
        match phase {
            ScanPhase::Base => &self.base,
            ScanPhase::Head => &self.head,
        }
    }

    /// Baseline findings file written by the baseline scan.
    pub fn baseline_findings(&self) -> &Path {
        &self.baseline
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(root = %self.root.display(), "workspace removed"),
            Err(e) => warn!(
                root = %self.root.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}
