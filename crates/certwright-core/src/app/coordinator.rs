//! GenerationCoordinator - 重複排除・状態遷移・終端通知
//!
//! # 流れ
//! 1. tracker の write lock 内で check-then-set（in_progress を立てる）
//! 2. パイプラインを tokio タスクとして spawn（待たない）
//! 3. 成功 → completed を記録して `complete` を通知
//!    失敗 → failed を記録して `error` を通知（completed は記録しない）
//!
//! 実行中の生成はキャンセルしません。

use chrono::Duration;
use std::sync::Arc;

use super::subscribers::{SubscriberRegistry, Subscription};
use super::tracker::{Claim, GenerationTracker, TrackerCounts};
use crate::domain::{
    Artifact, CertError, EnsureStatus, GenerationRequest, GenerationState, Identifier, StatusEvent,
};
use crate::ports::{ArtifactStore, Clock, DocumentPipeline};

/// Snapshot for logs and health output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorCounts {
    pub tracker: TrackerCounts,
    pub subscribers: usize,
}

pub struct GenerationCoordinator {
    tracker: Arc<GenerationTracker>,
    subscribers: SubscriberRegistry,
    pipeline: Arc<dyn DocumentPipeline>,
    store: Arc<dyn ArtifactStore>,
}

impl GenerationCoordinator {
    pub fn new(
        pipeline: Arc<dyn DocumentPipeline>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            tracker: Arc::new(GenerationTracker::new(clock, cooldown)),
            subscribers: SubscriberRegistry::new(),
            pipeline,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Start generation unless it is running or finished within the cool-down.
    pub async fn ensure_generated(&self, request: GenerationRequest) -> EnsureStatus {
        let previous = match self.tracker.try_claim(&request.id).await {
            Claim::AlreadyInProgress => {
                tracing::debug!(id = %request.id, "generation already in progress");
                return EnsureStatus::AlreadyInProgress;
            }
            Claim::RecentlyCompleted => return EnsureStatus::RecentlyCompleted,
            Claim::Claimed { previous } => previous,
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(id = %request.id, error = %e, "no runtime to spawn generation on");
                self.tracker.rollback(&request.id, previous).await;
                return EnsureStatus::FailedToStart;
            }
        };

        tracing::info!(id = %request.id, "generation started");
        let tracker = Arc::clone(&self.tracker);
        let subscribers = self.subscribers.clone();
        let pipeline = Arc::clone(&self.pipeline);
        handle.spawn(async move {
            let result = pipeline.generate(&request).await;
            // 結果は tracker と購読者に反映済み。spawn 側に返す相手はいない
            let _ = record_outcome(&tracker, &subscribers, &request.id, result).await;
        });
        EnsureStatus::Started
    }

    /// Render synchronously.
    ///
    /// Without `force` an existing artifact is returned as is. With `force` the
    /// existing file is deleted first and the cool-down is ignored. Either way a
    /// running task for the same id yields `ConcurrencyNoop`.
    pub async fn generate_now(
        &self,
        request: GenerationRequest,
        force: bool,
    ) -> Result<Artifact, CertError> {
        if !force {
            if let Some(artifact) = self.store.stat(&request.id).await? {
                return Ok(artifact);
            }
        }

        if self.tracker.try_claim_forced(&request.id).await.is_none() {
            return Err(CertError::ConcurrencyNoop(request.id.to_string()));
        }

        if force {
            if let Err(e) = self.store.remove(&request.id).await {
                return record_outcome(&self.tracker, &self.subscribers, &request.id, Err(e)).await;
            }
        }

        let result = self.pipeline.generate(&request).await;
        record_outcome(&self.tracker, &self.subscribers, &request.id, result).await
    }

    pub async fn subscribe(&self, id: &Identifier) -> Subscription {
        self.subscribers.subscribe(id).await
    }

    pub async fn is_cached(&self, id: &Identifier) -> Result<bool, CertError> {
        self.store.exists(id).await
    }

    pub async fn status(&self, id: &Identifier) -> GenerationState {
        self.tracker.state(id).await
    }

    /// Forget a terminal marker, e.g. after its file was evicted.
    pub async fn invalidate(&self, id: &Identifier) -> bool {
        self.tracker.invalidate(id).await
    }

    pub async fn sweep(&self, max_age: Duration) -> usize {
        self.tracker.sweep(max_age).await
    }

    pub async fn counts(&self) -> CoordinatorCounts {
        CoordinatorCounts {
            tracker: self.tracker.counts().await,
            subscribers: self.subscribers.total().await,
        }
    }
}

async fn record_outcome(
    tracker: &GenerationTracker,
    subscribers: &SubscriberRegistry,
    id: &Identifier,
    result: Result<Artifact, CertError>,
) -> Result<Artifact, CertError> {
    match result {
        Ok(artifact) => {
            tracker.complete(id).await;
            let delivered = subscribers.notify(id, StatusEvent::complete()).await;
            tracing::info!(id = %id, size_bytes = artifact.size_bytes, delivered, "generation complete");
            Ok(artifact)
        }
        Err(e) => {
            tracker.fail(id, e.to_string()).await;
            let delivered = subscribers.notify(id, StatusEvent::error()).await;
            tracing::error!(id = %id, error = %e, kind = ?e.kind(), delivered, "generation failed");
            Err(e)
        }
    }
}
