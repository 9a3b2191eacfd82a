//! AppBuilder - 設定からの組み立て
//!
//! # Fail-fast
//! テンプレートやフォントが無いまま起動すると、最初のリクエストで初めて
//! 失敗に気づくことになります。`build()` の時点で存在を確認し、足りなければ
//! `BuildError::MissingAssets` を返します。

use std::path::PathBuf;
use std::sync::Arc;

use super::background::{BackgroundGroup, SweepJob};
use super::config::Config;
use super::coordinator::GenerationCoordinator;
use super::download::DownloadTracker;
use super::eviction::EvictionEngine;
use super::scheduler::{DailyAt, Every, RecurringTimer};
use super::service::CertificateService;
use crate::domain::CertError;
use crate::impls::{LocalArtifactStore, RecordBook};
use crate::ports::{Clock, DocumentPipeline, PruneSelector, RandomSelector, SystemClock, UlidGenerator};
use crate::render::{CertificatePipeline, CertificateRenderer, DocumentAssembler};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing assets: {0:?}. Check the [assets] section of the config.")]
    MissingAssets(Vec<PathBuf>),
    #[error("artifact storage unavailable: {0}")]
    Storage(#[source] CertError),
    #[error("record book unavailable: {0}")]
    Records(#[source] CertError),
}

pub struct AppBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    selector: Option<Arc<dyn PruneSelector>>,
    pipeline: Option<Arc<dyn DocumentPipeline>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            selector: None,
            pipeline: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn PruneSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Replace the render pipeline. Asset checks are skipped.
    pub fn with_pipeline(mut self, pipeline: Arc<dyn DocumentPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub async fn build(self) -> Result<App, BuildError> {
        let config = self.config;
        let clock = self.clock;

        if self.pipeline.is_none() {
            let mut missing = Vec::new();
            for path in [&config.assets.template, &config.assets.font] {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    missing.push(path.clone());
                }
            }
            if !missing.is_empty() {
                return Err(BuildError::MissingAssets(missing));
            }
        }

        let store = Arc::new(
            LocalArtifactStore::open(&config.storage.artifact_dir)
                .await
                .map_err(BuildError::Storage)?,
        );
        let records = match &config.storage.records_path {
            Some(path) => RecordBook::load(path).await.map_err(BuildError::Records)?,
            None => RecordBook::in_memory(Vec::new()),
        };
        let records = Arc::new(records.with_clock(Arc::clone(&clock)));

        let pipeline: Arc<dyn DocumentPipeline> = match self.pipeline {
            Some(pipeline) => pipeline,
            None => Arc::new(CertificatePipeline::new(
                CertificateRenderer::new(
                    &config.assets.template,
                    &config.assets.font,
                    config.render.clone(),
                ),
                DocumentAssembler::default(),
                store.clone(),
            )),
        };

        let coordinator = Arc::new(GenerationCoordinator::new(
            pipeline,
            store.clone(),
            Arc::clone(&clock),
            config.coordinator.cooldown(),
        ));
        let downloads = Arc::new(DownloadTracker::new(
            Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            Arc::clone(&clock),
            config.downloads.session_ttl(),
        ));

        let selector: Arc<dyn PruneSelector> = match (self.selector, config.retention.seed) {
            (Some(selector), _) => selector,
            (None, Some(seed)) => Arc::new(RandomSelector::seeded(seed)),
            (None, None) => Arc::new(RandomSelector::from_entropy()),
        };
        let eviction = Arc::new(EvictionEngine::new(
            store.clone(),
            records.clone(),
            selector,
            Arc::clone(&clock),
            config.retention.policy(),
        ));

        let service = Arc::new(CertificateService::new(
            coordinator.clone(),
            downloads.clone(),
            records.clone(),
            records.clone(),
            Arc::clone(&clock),
        ));

        Ok(App {
            config,
            clock,
            store,
            records,
            coordinator,
            downloads,
            eviction,
            service,
        })
    }
}

/// Fully wired engine.
pub struct App {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<LocalArtifactStore>,
    pub records: Arc<RecordBook>,
    pub coordinator: Arc<GenerationCoordinator>,
    pub downloads: Arc<DownloadTracker>,
    pub eviction: Arc<EvictionEngine>,
    pub service: Arc<CertificateService>,
}

impl App {
    /// Eviction at local midnight (plus once now) and the hourly sweep.
    pub fn start_background(&self) -> BackgroundGroup {
        let mut group = BackgroundGroup::new();
        group.spawn(
            RecurringTimer::new(Arc::new(DailyAt::local_midnight()), Arc::clone(&self.clock)),
            self.eviction.clone(),
        );
        group.spawn(
            RecurringTimer::new(
                Arc::new(Every(self.config.coordinator.sweep_interval())),
                Arc::clone(&self.clock),
            )
            .skip_initial_run(),
            Arc::new(SweepJob::new(
                self.coordinator.clone(),
                self.downloads.clone(),
                self.config.coordinator.marker_ttl(),
            )),
        );
        group
    }
}
