//! DownloadTracker - 配信ごとの進捗と完了判定
//!
//! 書き込んだバイト数が総サイズに達した時点で completed。0 バイトの成果物は
//! 開始時点で completed です。セッションは完了に関係なく TTL で掃除します。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::RwLock;

use crate::domain::{DownloadToken, Identifier};
use crate::ports::{Clock, IdGenerator};

#[derive(Debug)]
struct Progress {
    total: u64,
    written: AtomicU64,
    completed: AtomicBool,
}

impl Progress {
    fn new(total: u64) -> Self {
        Self {
            total,
            written: AtomicU64::new(0),
            completed: AtomicBool::new(total == 0),
        }
    }

    fn record(&self, n: u64) {
        let written = self.written.fetch_add(n, Ordering::AcqRel) + n;
        if written >= self.total {
            self.completed.store(true, Ordering::Release);
        }
    }

    fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

struct Session {
    id: Identifier,
    started_at: DateTime<Utc>,
    progress: Arc<Progress>,
}

/// Point-in-time view of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSession {
    pub token: DownloadToken,
    pub id: Identifier,
    pub started_at: DateTime<Utc>,
    pub total_bytes: u64,
    pub written_bytes: u64,
    pub completed: bool,
}

pub struct DownloadTracker {
    sessions: RwLock<HashMap<DownloadToken, Session>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl DownloadTracker {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ids,
            clock,
            ttl,
        }
    }

    pub async fn begin(&self, id: &Identifier, total_bytes: u64) -> DownloadHandle {
        let token = self.ids.generate_download_token();
        let progress = Arc::new(Progress::new(total_bytes));
        self.sessions.write().await.insert(
            token,
            Session {
                id: id.clone(),
                started_at: self.clock.now(),
                progress: Arc::clone(&progress),
            },
        );
        tracing::debug!(id = %id, token = %token, total_bytes, "download started");
        DownloadHandle {
            token,
            id: id.clone(),
            progress,
        }
    }

    pub async fn session(&self, token: &DownloadToken) -> Option<DownloadSession> {
        let sessions = self.sessions.read().await;
        sessions.get(token).map(|s| DownloadSession {
            token: *token,
            id: s.id.clone(),
            started_at: s.started_at,
            total_bytes: s.progress.total,
            written_bytes: s.progress.written(),
            completed: s.progress.is_complete(),
        })
    }

    /// Drop sessions older than the TTL; returns how many went.
    pub async fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.started_at <= self.ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = sessions.len(), "expired download sessions pruned");
        }
        pruned
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Caller side of one download.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    token: DownloadToken,
    id: Identifier,
    progress: Arc<Progress>,
}

impl DownloadHandle {
    pub fn token(&self) -> DownloadToken {
        self.token
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn total_bytes(&self) -> u64 {
        self.progress.total
    }

    pub fn written_bytes(&self) -> u64 {
        self.progress.written()
    }

    pub fn is_complete(&self) -> bool {
        self.progress.is_complete()
    }

    /// Count every byte the sink accepts against this download.
    pub fn wrap<W: AsyncWrite + Unpin>(&self, inner: W) -> TrackedWriter<W> {
        TrackedWriter {
            inner,
            progress: Arc::clone(&self.progress),
        }
    }
}

pub struct TrackedWriter<W> {
    inner: W,
    progress: Arc<Progress>,
}

impl<W> TrackedWriter<W> {
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TrackedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.progress.record(*n as u64);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;
    use tokio::io::AsyncWriteExt;

    fn setup() -> (Arc<FixedClock>, DownloadTracker) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let ids = Arc::new(UlidGenerator::new(FixedClock::new(clock.now())));
        let tracker = DownloadTracker::new(ids, clock.clone(), Duration::hours(1));
        (clock, tracker)
    }

    fn id() -> Identifier {
        Identifier::parse("ST001").unwrap()
    }

    #[tokio::test]
    async fn streaming_all_bytes_completes() {
        let (_, tracker) = setup();
        let handle = tracker.begin(&id(), 10).await;

        let mut sink = handle.wrap(Vec::new());
        sink.write_all(b"0123456789").await.unwrap();
        sink.flush().await.unwrap();

        let session = tracker.session(&handle.token()).await.unwrap();
        assert!(session.completed);
        assert_eq!(session.written_bytes, 10);
        assert_eq!(sink.into_inner().len(), 10);
    }

    #[tokio::test]
    async fn short_stream_stays_incomplete() {
        let (_, tracker) = setup();
        let handle = tracker.begin(&id(), 10).await;

        let mut sink = handle.wrap(Vec::new());
        sink.write_all(b"01234").await.unwrap();
        drop(sink);

        let session = tracker.session(&handle.token()).await.unwrap();
        assert!(!session.completed);
        assert_eq!(session.written_bytes, 5);
        assert!(!handle.is_complete());
    }

    #[tokio::test]
    async fn empty_artifact_is_complete_on_begin() {
        let (_, tracker) = setup();
        let handle = tracker.begin(&id(), 0).await;
        assert!(handle.is_complete());
    }

    #[tokio::test]
    async fn sessions_expire_after_ttl_regardless_of_completion() {
        let (clock, tracker) = setup();
        let done = tracker.begin(&id(), 0).await;
        let _pending = tracker.begin(&id(), 100).await;
        assert_ne!(done.token(), _pending.token());

        clock.advance(Duration::minutes(30));
        let fresh = tracker.begin(&id(), 1).await;
        assert_eq!(tracker.prune_expired().await, 0);

        clock.advance(Duration::minutes(31));
        assert_eq!(tracker.prune_expired().await, 2);
        assert_eq!(tracker.len().await, 1);
        assert!(tracker.session(&fresh.token()).await.is_some());
        assert!(tracker.session(&done.token()).await.is_none());
    }
}
