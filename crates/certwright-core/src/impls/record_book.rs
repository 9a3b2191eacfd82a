//! RecordBook - レコードストアと監査ログのインメモリ実装
//!
//! 外部レコードストアの代役です。`RecordLookup` と `AuditTrail` の両方を
//! 実装し、パスを指定すると変更のたびに JSON として保存します。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{CertError, Identifier, Record, validate_search_term};
use crate::ports::{AuditTrail, Clock, RecordLookup, ReferenceHistory, SystemClock};

/// One entry of the system event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub remark: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BookData {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    events: Vec<EventEntry>,
}

pub struct RecordBook {
    data: RwLock<BookData>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl RecordBook {
    /// Unpersisted book, mostly for tests.
    pub fn in_memory(records: Vec<Record>) -> Self {
        Self {
            data: RwLock::new(BookData {
                records,
                events: Vec::new(),
            }),
            path: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Load from `path`; a missing file starts an empty book.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, CertError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<BookData>(&bytes)
                .map_err(|e| CertError::Audit(format!("parse {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BookData::default(),
            Err(e) => return Err(CertError::storage(format!("read {}", path.display()), e)),
        };
        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn insert(&self, record: Record) -> Result<(), CertError> {
        self.commit(|data| {
            data.records.retain(|r| r.id != record.id);
            data.records.push(record);
            Ok(())
        })
        .await
    }

    pub async fn record(&self, id: &Identifier) -> Option<Record> {
        let data = self.data.read().await;
        data.records.iter().find(|r| &r.id == id).cloned()
    }

    pub async fn events(&self) -> Vec<EventEntry> {
        self.data.read().await.events.clone()
    }

    pub async fn events_of(&self, event_type: &str) -> Vec<EventEntry> {
        let data = self.data.read().await;
        data.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Apply `change` and persist it; memory is only updated once the file is written.
    async fn commit<F>(&self, change: F) -> Result<(), CertError>
    where
        F: FnOnce(&mut BookData) -> Result<(), CertError>,
    {
        let mut data = self.data.write().await;
        if self.path.is_none() {
            return change(&mut data);
        }
        let mut next = data.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(())
    }

    async fn persist(&self, data: &BookData) -> Result<(), CertError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| CertError::Audit(format!("serialize record book: {e}")))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CertError::storage(format!("write {}", path.display()), e))
    }
}

#[async_trait]
impl RecordLookup for RecordBook {
    async fn lookup(&self, term: &str) -> Result<Option<Record>, CertError> {
        validate_search_term(term)?;
        let data = self.data.read().await;
        Ok(data.records.iter().find(|r| r.matches_term(term)).cloned())
    }
}

#[async_trait]
impl AuditTrail for RecordBook {
    async fn append_remark(&self, id: &Identifier, remark: &str) -> Result<(), CertError> {
        let timestamp = self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.commit(|data| {
            let record = data
                .records
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| CertError::LookupNotFound(id.to_string()))?;
            record.remark.push_str(&format!("\n{timestamp} - {remark}"));
            Ok(())
        })
        .await
    }

    async fn reference_histories(&self) -> Result<Vec<ReferenceHistory>, CertError> {
        let data = self.data.read().await;
        Ok(data
            .records
            .iter()
            .filter(|r| !r.remark.trim().is_empty())
            .map(|r| ReferenceHistory {
                id: r.id.clone(),
                remarks: r.remark.clone(),
            })
            .collect())
    }

    async fn log_event(&self, event_type: &str, remark: &str) -> Result<(), CertError> {
        tracing::info!(event_type, remark, "audit event");
        let entry = EventEntry {
            timestamp: self.clock.now(),
            event_type: event_type.to_string(),
            remark: remark.to_string(),
        };
        self.commit(|data| {
            data.events.push(entry);
            Ok(())
        })
        .await
    }
}
