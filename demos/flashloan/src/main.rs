// demos/flashloan/src/main.rs

use anyhow::Result;
use common::{flashloan_flow, load_config};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // load .env (APTOS_NODE_URL, PK_LOAN, PK_LOAN_2, PK_TRADER)
    let cfg = load_config();

    let env_filter = EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();

    tracing::info!(node_url = %cfg.node_url, rounds = cfg.rounds, "Starting flashloan run");

    // errors propagate out of main and exit non-zero
    if let Err(e) = flashloan_flow(&cfg).await {
        tracing::error!(error = %e, "Flashloan run failed");
        return Err(e);
    }

    Ok(())
}
