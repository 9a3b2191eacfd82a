//! `cleanup` - 削除サイクルを一度だけ実行

use anyhow::{Context, Result};
use certwright_core::app::App;
use tracing::info;

pub async fn run(app: &App) -> Result<()> {
    let policy = app.eviction.policy();
    info!(window_days = policy.window.num_days(), "starting cleanup");

    let stats = app
        .eviction
        .run_cycle()
        .await
        .context("cleanup cycle failed")?;

    println!("Files scanned:   {}", stats.files_scanned);
    println!("Files deleted:   {} ({} pruned)", stats.files_deleted, stats.files_pruned);
    println!("Files protected: {}", stats.files_protected);
    println!("Bytes freed:     {}", stats.bytes_freed);
    println!("Errors:          {}", stats.error_count);
    if let (Some(oldest), Some(newest)) = (stats.oldest_reference, stats.newest_reference) {
        println!("References:      {oldest} .. {newest}");
    }
    Ok(())
}
