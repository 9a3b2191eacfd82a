//! `run` - 定期ジョブを Ctrl-C まで動かす

use anyhow::{Context, Result};
use certwright_core::app::App;
use tracing::info;

pub async fn run(app: &App) -> Result<()> {
    let group = app.start_background();
    info!(jobs = group.len(), "background jobs started; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    group.shutdown_and_join().await;
    Ok(())
}
