//! Command-line and environment entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::server;

/// Broker that reports only the security findings a pull request introduces.
#[derive(Parser, Debug, Default)]
#[command(name = "pullscan", version, about)]
pub struct Cli {
    /// TOML config file; defaults apply when absent.
    #[arg(long, env = "PULLSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on (keeps the configured bind address).
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base directory for per-request workspaces.
    #[arg(long, env = "TMPDIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Scanner executable.
    #[arg(long, env = "PULLSCAN_SCANNER")]
    pub scanner: Option<String>,

    /// Per-invocation scanner time limit in seconds (0 disables).
    #[arg(long, env = "PULLSCAN_SCAN_TIMEOUT")]
    pub scan_timeout: Option<u64>,
}

impl Cli {
    /// Layer defaults, the config file, and flag/env overrides.
    pub fn resolve(&self) -> crate::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listen.set_port(port);
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            config.tmp_dir.clone_from(tmp_dir);
        }
        if let Some(scanner) = &self.scanner {
            config.scanner.program.clone_from(scanner);
        }
        if let Some(secs) = self.scan_timeout {
            config.scanner.timeout_secs = secs;
        }

        Ok(config)
    }
}

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Parse arguments, resolve configuration, and run the server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.resolve()?;
    server::run(&config).await?;
    Ok(())
}
