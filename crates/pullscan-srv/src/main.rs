//! pullscan - report only the security findings a pull request introduces.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pullscan_srv::cli::run().await
}
