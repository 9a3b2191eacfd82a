//! CertificateService - 呼び出し側から見た入口
//!
//! ルーティングや HTTP はここに含めません。各操作は呼び出し元（IP 等）を
//! `caller` として受け取り、ログと監査記録に残します。

use chrono::SecondsFormat;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::coordinator::GenerationCoordinator;
use super::download::{DownloadSession, DownloadTracker};
use super::subscribers::Subscription;
use crate::domain::{
    Artifact, CertError, EnsureStatus, ErrorKind, GenerationRequest, IdRange, Identifier, Record,
    RecordView,
};
use crate::ports::{AuditTrail, Clock, RecordLookup};

/// Immediate answer to a document request.
#[derive(Debug)]
pub enum DocumentResponse {
    /// The artifact is on disk; stream it.
    ServeCached(Artifact),
    /// Generation is running; wait on the subscription.
    Pending(Subscription),
}

pub struct CertificateService {
    coordinator: Arc<GenerationCoordinator>,
    downloads: Arc<DownloadTracker>,
    records: Arc<dyn RecordLookup>,
    audit: Arc<dyn AuditTrail>,
    clock: Arc<dyn Clock>,
}

impl CertificateService {
    pub fn new(
        coordinator: Arc<GenerationCoordinator>,
        downloads: Arc<DownloadTracker>,
        records: Arc<dyn RecordLookup>,
        audit: Arc<dyn AuditTrail>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            downloads,
            records,
            audit,
            clock,
        }
    }

    pub fn coordinator(&self) -> &Arc<GenerationCoordinator> {
        &self.coordinator
    }

    pub fn downloads(&self) -> &Arc<DownloadTracker> {
        &self.downloads
    }

    /// Serve the cached artifact or join/start its generation.
    pub async fn request_document(
        &self,
        term: &str,
        caller: &str,
    ) -> Result<DocumentResponse, CertError> {
        let record = self.find(term, caller, "certificate_generation_failure").await?;
        let id = record.id.clone();
        let store = self.coordinator.store();

        if let Some(artifact) = store.stat(&id).await? {
            tracing::debug!(id = %id, caller, "serving cached certificate");
            return Ok(DocumentResponse::ServeCached(artifact));
        }

        // 通知を取りこぼさないよう、起動より先に購読する
        let subscription = self.coordinator.subscribe(&id).await;
        let mut status = self.coordinator.ensure_generated(request_for(&record)).await;

        if status == EnsureStatus::RecentlyCompleted {
            if let Some(artifact) = store.stat(&id).await? {
                subscription.release().await;
                return Ok(DocumentResponse::ServeCached(artifact));
            }
            // 完了記録は新しいがファイルは消えている（削除サイクル等）
            tracing::info!(id = %id, "completed marker without artifact; regenerating");
            self.coordinator.invalidate(&id).await;
            status = self.coordinator.ensure_generated(request_for(&record)).await;
        }

        if status.expects_notification() {
            tracing::info!(id = %id, caller, status = ?status, "certificate pending");
            return Ok(DocumentResponse::Pending(subscription));
        }

        subscription.release().await;
        self.log_event(
            "certificate_generation_error",
            &format!("Request IP: {caller} | Failed to start certificate generation for: {id}"),
        )
        .await;
        Err(CertError::NotStarted(id.to_string()))
    }

    /// Look the person up and warm their certificate in the background.
    pub async fn search(&self, term: &str, caller: &str) -> Result<RecordView, CertError> {
        let record = self.find(term, caller, "search_failure").await?;
        if !self.coordinator.is_cached(&record.id).await? {
            let status = self.coordinator.ensure_generated(request_for(&record)).await;
            tracing::debug!(id = %record.id, caller, status = ?status, "pre-generation requested");
        }
        Ok(RecordView::from_record(&record))
    }

    /// Look the person up and record the verification.
    pub async fn verify(&self, term: &str, caller: &str) -> Result<RecordView, CertError> {
        let record = self.find(term, caller, "verification_failure").await?;
        let remark = format!(
            "Certificate verified at {} from IP {caller}",
            self.timestamp()
        );
        if let Err(e) = self.audit.append_remark(&record.id, &remark).await {
            tracing::warn!(id = %record.id, caller, error = %e, "failed to save verification record");
            self.log_event(
                "verification_record_failure",
                &format!("Request IP: {caller} | Failed to save verification record for: {} | Error: {e}", record.id),
            )
            .await;
        }
        Ok(RecordView::from_record(&record))
    }

    /// Copy `artifact` into `writer`, tracking how much of it arrived.
    ///
    /// A complete transfer appends a download remark; anything short of the full
    /// size is logged as `incomplete_download`.
    pub async fn stream_document<W>(
        &self,
        artifact: &Artifact,
        caller: &str,
        writer: W,
    ) -> Result<DownloadSession, CertError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = tokio::fs::File::open(&artifact.path)
            .await
            .map_err(|e| CertError::storage(format!("open {}", artifact.path.display()), e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| CertError::storage(format!("stat {}", artifact.path.display()), e))?
            .len();

        let handle = self.downloads.begin(&artifact.id, total).await;
        let mut sink = handle.wrap(writer);
        let copied = match tokio::io::copy(&mut file, &mut sink).await {
            Ok(_) => sink.flush().await,
            Err(e) => Err(e),
        };

        if handle.is_complete() {
            let remark = format!(
                "Certificate downloaded at {} from IP {caller}",
                self.timestamp()
            );
            if let Err(e) = self.audit.append_remark(&artifact.id, &remark).await {
                tracing::warn!(id = %artifact.id, caller, error = %e, "failed to save download record");
            }
            tracing::info!(id = %artifact.id, token = %handle.token(), caller, bytes = total, "download complete");
        } else {
            tracing::warn!(
                id = %artifact.id,
                token = %handle.token(),
                caller,
                written = handle.written_bytes(),
                total,
                "incomplete download"
            );
            self.log_event(
                "incomplete_download",
                &format!(
                    "Request IP: {caller} | Incomplete certificate download for: {} | Download ID: {}",
                    artifact.id,
                    handle.token()
                ),
            )
            .await;
        }

        copied.map_err(|e| CertError::storage(format!("stream {}", artifact.id), e))?;
        self.downloads
            .session(&handle.token())
            .await
            .ok_or_else(|| CertError::LookupNotFound(handle.token().to_string()))
    }

    /// Force-regenerate one identifier, replacing any existing artifact.
    pub async fn regenerate(&self, id: &Identifier, caller: &str) -> Result<Artifact, CertError> {
        let record = self.find(id.as_str(), caller, "certificate_generation_failure").await?;
        self.coordinator
            .generate_now(request_for(&record), true)
            .await
    }

    /// Regenerate every identifier in `range`, stopping at the first failure.
    pub async fn regenerate_range(
        &self,
        range: &IdRange,
        caller: &str,
    ) -> Result<Vec<Artifact>, CertError> {
        let ids = range.expand()?;
        let mut artifacts = Vec::with_capacity(ids.len());
        for id in ids {
            let artifact = self.regenerate(&id, caller).await?;
            tracing::info!(id = %id, path = %artifact.path.display(), "certificate regenerated");
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    async fn find(&self, term: &str, caller: &str, miss_event: &str) -> Result<Record, CertError> {
        match self.records.lookup(term).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                tracing::info!(term, caller, "no record for term");
                self.log_event(
                    miss_event,
                    &format!("Request IP: {caller} | No record found for: {term}"),
                )
                .await;
                Err(CertError::LookupNotFound(term.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::Invalid => {
                tracing::info!(caller, error = %e, "rejected search term");
                self.log_event(
                    "validation_failure",
                    &format!("Request IP: {caller} | {e}"),
                )
                .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn log_event(&self, event_type: &str, remark: &str) {
        if let Err(e) = self.audit.log_event(event_type, remark).await {
            tracing::warn!(event_type, error = %e, "failed to record event");
        }
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

fn request_for(record: &Record) -> GenerationRequest {
    GenerationRequest::new(record.id.clone(), record.full_name.clone())
}
