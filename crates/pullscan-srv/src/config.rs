//! Service configuration, resolved once at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use pullscan_core::{AnalyzerConfig, ArchiveLimits, ScannerConfig};
use serde::{Deserialize, Serialize};

/// Configuration for a pullscan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address (default: 0.0.0.0:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Base directory for per-request workspaces (default: /tmp).
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// External scanner invocation.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Per-archive unpack budgets.
    #[serde(default)]
    pub limits: ArchiveLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tmp_dir: default_tmp_dir(),
            max_body_bytes: default_max_body_bytes(),
            scanner: ScannerConfig::default(),
            limits: ArchiveLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::SrvError::Config(e.to_string()))
    }

    /// Check settings that would otherwise only fail on the first request.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.tmp_dir.is_dir() {
            return Err(crate::SrvError::Config(format!(
                "temp directory {} does not exist",
                self.tmp_dir.display()
            )));
        }
        if self.scanner.program.is_empty() {
            return Err(crate::SrvError::Config("scanner program is empty".into()));
        }
        Ok(())
    }

    /// Settings for the analysis pipeline.
    #[must_use]
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            tmp_dir: self.tmp_dir.clone(),
            scanner: self.scanner.clone(),
            limits: self.limits,
        }
    }
}

// Default value functions for serde.
fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

const fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}
