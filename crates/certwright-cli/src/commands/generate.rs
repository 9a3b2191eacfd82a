//! `generate-cert` - 単体または範囲での強制再生成

use anyhow::{Context, Result};
use certwright_core::app::App;
use certwright_core::domain::IdRange;
use tracing::info;

use crate::CALLER;

pub async fn run(app: &App, raw: &str) -> Result<()> {
    let range = IdRange::parse(raw).with_context(|| format!("invalid id or range: {raw}"))?;
    info!(start = %range.start(), end = %range.end(), "generating certificates");

    let artifacts = app
        .service
        .regenerate_range(&range, CALLER)
        .await
        .context("certificate generation failed")?;

    for artifact in &artifacts {
        println!("{}\t{}", artifact.id, artifact.path.display());
    }
    info!(count = artifacts.len(), "generation finished");
    Ok(())
}
