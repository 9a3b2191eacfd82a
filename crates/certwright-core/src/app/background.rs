//! BackgroundGroup - 定期ジョブ群のハンドル
//!
//! - `request_shutdown()` で全タイマーに停止を伝える
//! - 実行中のジョブは中断しない（次の待ちに入る前に止まる）

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::coordinator::GenerationCoordinator;
use super::download::DownloadTracker;
use super::scheduler::{RecurringJob, RecurringTimer};

pub struct BackgroundGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Default for BackgroundGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    /// Spawn `job` driven by `timer`.
    pub fn spawn(&mut self, timer: RecurringTimer, job: Arc<dyn RecurringJob>) {
        let rx = self.shutdown_tx.subscribe();
        tracing::info!(job = job.name(), "background job registered");
        self.joins.push(tokio::spawn(async move {
            timer.run(job, rx).await;
        }));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // 受信側が既に終わっていても構わない
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "background job ended abnormally");
            }
        }
    }
}

/// Hourly housekeeping: stale generation markers and expired download sessions.
pub struct SweepJob {
    coordinator: Arc<GenerationCoordinator>,
    downloads: Arc<DownloadTracker>,
    marker_ttl: Duration,
}

impl SweepJob {
    pub fn new(
        coordinator: Arc<GenerationCoordinator>,
        downloads: Arc<DownloadTracker>,
        marker_ttl: Duration,
    ) -> Self {
        Self {
            coordinator,
            downloads,
            marker_ttl,
        }
    }
}

#[async_trait]
impl RecurringJob for SweepJob {
    fn name(&self) -> &str {
        "sweep"
    }

    async fn run(&self) {
        let markers = self.coordinator.sweep(self.marker_ttl).await;
        let sessions = self.downloads.prune_expired().await;
        let counts = self.coordinator.counts().await;
        let downloads = self.downloads.len().await;
        tracing::info!(
            markers_pruned = markers,
            sessions_pruned = sessions,
            in_progress = counts.tracker.in_progress,
            completed = counts.tracker.completed,
            failed = counts.tracker.failed,
            subscribers = counts.subscribers,
            downloads,
            "tracker sweep"
        );
    }
}
