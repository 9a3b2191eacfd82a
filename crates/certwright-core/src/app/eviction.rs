//! EvictionEngine - 参照履歴に基づく成果物の削除
//!
//! # サイクル
//! idle → scanning → deciding → deleting → idle
//!
//! 1. 成果物を列挙し、監査履歴から identifier ごとの最新参照日を得る
//! 2. `now − 最新参照日 ≤ window` なら protected
//! 3. 履歴なし・window 外は即削除
//! 4. 残った protected から `⌈fraction × n⌉` 件を PruneSelector で選んで削除
//! 5. 集計を監査ログへ（cleanup_success / cleanup_error）
//!
//! ディレクトリ列挙や監査履歴の取得に失敗したらそのサイクルだけ中断します。

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use super::scheduler::RecurringJob;
use crate::domain::{Artifact, CertError, Identifier};
use crate::ports::{ArtifactStore, AuditTrail, Clock, PruneSelector, prune_count};

pub const CLEANUP_SUCCESS: &str = "cleanup_success";
pub const CLEANUP_ERROR: &str = "cleanup_error";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    pub window: Duration,
    /// Share of protected artifacts removed each cycle.
    pub prune_fraction: f64,
}

impl RetentionPolicy {
    pub fn days(days: i64) -> Self {
        Self {
            window: Duration::days(days),
            ..Self::default()
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(10),
            prune_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPhase {
    Idle,
    Scanning,
    Deciding,
    Deleting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub files_scanned: usize,
    pub files_deleted: usize,
    /// Protected artifacts removed by the pruning pass (included in `files_deleted`).
    pub files_pruned: usize,
    pub files_protected: usize,
    pub bytes_freed: u64,
    pub error_count: usize,
    pub duration: std::time::Duration,
    pub oldest_reference: Option<NaiveDate>,
    pub newest_reference: Option<NaiveDate>,
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("static pattern"))
}

/// Latest valid `YYYY-MM-DD` date anywhere in `remarks`.
pub fn most_recent_reference(remarks: &str) -> Option<NaiveDate> {
    date_pattern()
        .find_iter(remarks)
        .filter_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .max()
}

/// Dates count from UTC midnight.
pub fn is_protected(reference: NaiveDate, now: DateTime<Utc>, window: Duration) -> bool {
    let referenced_at = reference.and_time(chrono::NaiveTime::MIN).and_utc();
    now - referenced_at <= window
}

pub struct EvictionEngine {
    store: Arc<dyn ArtifactStore>,
    audit: Arc<dyn AuditTrail>,
    selector: Arc<dyn PruneSelector>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
    phase: Mutex<CleanupPhase>,
    // 手動実行とスケジュール実行が重ならないように
    cycle: tokio::sync::Mutex<()>,
}

impl EvictionEngine {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        audit: Arc<dyn AuditTrail>,
        selector: Arc<dyn PruneSelector>,
        clock: Arc<dyn Clock>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            selector,
            clock,
            policy,
            phase: Mutex::new(CleanupPhase::Idle),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn phase(&self) -> CleanupPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, phase: CleanupPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        tracing::debug!(phase = ?phase, "cleanup phase");
    }

    /// One full cycle. Errors here mean the cycle was aborted.
    pub async fn run_cycle(&self) -> Result<CleanupStats, CertError> {
        let _running = self.cycle.lock().await;
        let started = Instant::now();
        let mut stats = CleanupStats::default();

        let result = self.cycle_inner(&mut stats).await;
        stats.duration = started.elapsed();
        self.enter(CleanupPhase::Idle);

        match result {
            Ok(()) => {
                tracing::info!(
                    scanned = stats.files_scanned,
                    deleted = stats.files_deleted,
                    pruned = stats.files_pruned,
                    bytes_freed = stats.bytes_freed,
                    errors = stats.error_count,
                    "cleanup finished"
                );
                self.report(CLEANUP_SUCCESS, &self.success_remark(&stats)).await;
                Ok(stats)
            }
            Err((message, e)) => {
                tracing::error!(error = %e, message, "cleanup aborted");
                self.report(CLEANUP_ERROR, &error_remark(message, &e, &stats))
                    .await;
                Err(e)
            }
        }
    }

    async fn cycle_inner(
        &self,
        stats: &mut CleanupStats,
    ) -> Result<(), (&'static str, CertError)> {
        self.enter(CleanupPhase::Scanning);
        let artifacts = self
            .store
            .list()
            .await
            .map_err(|e| ("failed to read artifact directory", e))?;
        stats.files_scanned = artifacts.len();

        let histories = self
            .audit
            .reference_histories()
            .await
            .map_err(|e| ("failed to query audit trail", e))?;

        self.enter(CleanupPhase::Deciding);
        let now = self.clock.now();
        let references: HashMap<Identifier, NaiveDate> = histories
            .into_iter()
            .filter_map(|h| most_recent_reference(&h.remarks).map(|d| (h.id, d)))
            .collect();

        let mut expired = Vec::new();
        let mut protected = Vec::new();
        for artifact in artifacts {
            match references.get(&artifact.id) {
                Some(date) => {
                    stats.oldest_reference = Some(stats.oldest_reference.map_or(*date, |d| d.min(*date)));
                    stats.newest_reference = Some(stats.newest_reference.map_or(*date, |d| d.max(*date)));
                    if is_protected(*date, now, self.policy.window) {
                        protected.push(artifact);
                    } else {
                        expired.push(artifact);
                    }
                }
                None => expired.push(artifact),
            }
        }
        stats.files_protected = protected.len();

        self.enter(CleanupPhase::Deleting);
        for artifact in &expired {
            self.delete(artifact, stats, "expired").await;
        }

        let count = prune_count(protected.len(), self.policy.prune_fraction);
        tracing::info!(
            protected = protected.len(),
            to_prune = count,
            "selecting protected artifacts for pruning"
        );
        if count > 0 {
            for artifact in self.selector.select(protected, count) {
                if self.delete(&artifact, stats, "pruned").await {
                    stats.files_pruned += 1;
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, artifact: &Artifact, stats: &mut CleanupStats, reason: &str) -> bool {
        match self.store.remove(&artifact.id).await {
            Ok(Some(freed)) => {
                stats.files_deleted += 1;
                stats.bytes_freed += freed;
                tracing::info!(id = %artifact.id, bytes = freed, reason, "artifact deleted");
                true
            }
            // 他の経路で既に消えている
            Ok(None) => false,
            Err(e) => {
                stats.error_count += 1;
                tracing::warn!(id = %artifact.id, error = %e, reason, "artifact delete failed");
                false
            }
        }
    }

    async fn report(&self, event_type: &str, remark: &str) {
        if let Err(e) = self.audit.log_event(event_type, remark).await {
            tracing::warn!(event_type, error = %e, "failed to record cleanup summary");
        }
    }

    fn success_remark(&self, stats: &CleanupStats) -> String {
        format!(
            "Automated cleanup completed:\n\
             Retention window: {} days\n\
             Files scanned: {}\n\
             Files deleted: {} ({} pruned)\n\
             Storage freed: {:.2} MB\n\
             Errors encountered: {}\n\
             Duration: {:?}\n\
             Oldest reference: {}\n\
             Newest reference: {}",
            self.policy.window.num_days(),
            stats.files_scanned,
            stats.files_deleted,
            stats.files_pruned,
            stats.bytes_freed as f64 / (1024.0 * 1024.0),
            stats.error_count,
            stats.duration,
            format_date(stats.oldest_reference),
            format_date(stats.newest_reference),
        )
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "none".to_string(), |d| d.format("%Y-%m-%d").to_string())
}

fn error_remark(message: &str, err: &CertError, stats: &CleanupStats) -> String {
    format!(
        "Cleanup error: {message}\n\
         Error details: {err}\n\
         Files scanned: {}\n\
         Files deleted: {}\n\
         Bytes freed: {}\n\
         Errors encountered: {}\n\
         Duration: {:?}",
        stats.files_scanned,
        stats.files_deleted,
        stats.bytes_freed,
        stats.error_count,
        stats.duration,
    )
}

#[async_trait]
impl RecurringJob for EvictionEngine {
    fn name(&self) -> &str {
        "eviction"
    }

    async fn run(&self) {
        // 失敗はログ済み。次のスケジュールでやり直す
        let _ = self.run_cycle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;
    use crate::impls::{LocalArtifactStore, RecordBook};
    use crate::ports::{FixedClock, RandomSelector};
    use chrono::TimeZone;
    use rstest::rstest;

    /// Deterministic selector: the highest identifiers first.
    struct HighestIds;

    impl PruneSelector for HighestIds {
        fn select(&self, mut candidates: Vec<Artifact>, count: usize) -> Vec<Artifact> {
            candidates.sort_by(|a, b| b.id.cmp(&a.id));
            candidates.truncate(count);
            candidates
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn id(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    fn record(raw: &str, remark: &str) -> Record {
        Record {
            id: id(raw),
            full_name: "Jane Doe".into(),
            national_id: String::new(),
            phone_no: String::new(),
            remark: remark.into(),
        }
    }

    fn referenced(raw: &str, days_ago: i64) -> Record {
        let date = (now() - Duration::days(days_ago)).format("%Y-%m-%dT%H:%M:%SZ");
        record(
            raw,
            &format!("\n{date} - Certificate downloaded at {date} from IP 10.0.0.1"),
        )
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<LocalArtifactStore>,
        book: Arc<RecordBook>,
    }

    async fn fixture(records: Vec<Record>, artifacts: &[(&str, usize)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalArtifactStore::open(dir.path()).await.unwrap());
        for (raw, size) in artifacts {
            store.write(&id(raw), vec![0; *size]).await.unwrap();
        }
        let book = Arc::new(RecordBook::in_memory(records).with_clock(Arc::new(FixedClock::new(now()))));
        Fixture {
            _dir: dir,
            store,
            book,
        }
    }

    fn engine(fx: &Fixture, selector: Arc<dyn PruneSelector>, policy: RetentionPolicy) -> EvictionEngine {
        EvictionEngine::new(
            fx.store.clone(),
            fx.book.clone(),
            selector,
            Arc::new(FixedClock::new(now())),
            policy,
        )
    }

    #[rstest]
    #[case("", None)]
    #[case("no dates here", None)]
    #[case("\n2024-05-01T10:00:00Z - Certificate downloaded", Some((2024, 5, 1)))]
    #[case("2024-05-01 x\n2024-05-20 y\n2024-05-03 z", Some((2024, 5, 20)))]
    #[case("2024-13-45 invalid\n2023-02-01 ok", Some((2023, 2, 1)))]
    fn finds_latest_reference(#[case] remarks: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(most_recent_reference(remarks), expected);
    }

    #[rstest]
    #[case(3, true)]
    #[case(9, true)]
    #[case(11, false)]
    #[case(15, false)]
    #[case(-1, true)]
    fn protection_window(#[case] days_ago: i64, #[case] protected: bool) {
        let date = (now() - Duration::days(days_ago)).date_naive();
        assert_eq!(is_protected(date, now(), Duration::days(10)), protected);
    }

    #[tokio::test]
    async fn recently_referenced_artifact_survives() {
        let fx = fixture(vec![referenced("ST001", 3)], &[("ST001", 64)]).await;
        let policy = RetentionPolicy {
            prune_fraction: 0.0,
            ..RetentionPolicy::default()
        };

        let stats = engine(&fx, Arc::new(HighestIds), policy).run_cycle().await.unwrap();

        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.files_deleted, 0);
        assert_eq!(stats.files_protected, 1);
        assert!(fx.store.exists(&id("ST001")).await.unwrap());
    }

    #[tokio::test]
    async fn protected_artifact_survives_alongside_pruning() {
        let records = ["ST001", "ST002", "ST003", "ST004", "ST005"]
            .into_iter()
            .map(|raw| referenced(raw, 3))
            .collect();
        let artifacts = [("ST001", 10), ("ST002", 10), ("ST003", 10), ("ST004", 10), ("ST005", 10)];
        let fx = fixture(records, &artifacts).await;

        let stats = engine(&fx, Arc::new(HighestIds), RetentionPolicy::default())
            .run_cycle()
            .await
            .unwrap();

        // ⌈0.2 × 5⌉ = 1
        assert_eq!(stats.files_pruned, 1);
        assert_eq!(stats.files_deleted, 1);
        assert!(fx.store.exists(&id("ST001")).await.unwrap());
        assert!(!fx.store.exists(&id("ST005")).await.unwrap());
    }

    #[tokio::test]
    async fn stale_artifact_is_deleted_and_bytes_counted() {
        let fx = fixture(vec![referenced("ST001", 15)], &[("ST001", 4096)]).await;

        let stats = engine(&fx, Arc::new(HighestIds), RetentionPolicy::default())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.files_pruned, 0);
        assert_eq!(stats.bytes_freed, 4096);
        assert!(!fx.store.exists(&id("ST001")).await.unwrap());

        let events = fx.book.events_of(CLEANUP_SUCCESS).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].remark.contains("Files deleted: 1"));
        assert!(events[0].remark.contains("Oldest reference: 2024-05-17"));
    }

    #[tokio::test]
    async fn artifacts_without_history_are_deleted() {
        let fx = fixture(vec![record("ST001", "")], &[("ST001", 8), ("ST002", 8)]).await;

        let stats = engine(&fx, Arc::new(HighestIds), RetentionPolicy::default())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(stats.files_deleted, 2);
        assert_eq!(stats.bytes_freed, 16);
        assert_eq!(stats.oldest_reference, None);
        assert!(fx.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_comes_from_policy() {
        let fx = fixture(vec![referenced("ST001", 15)], &[("ST001", 8)]).await;
        let policy = RetentionPolicy {
            prune_fraction: 0.0,
            ..RetentionPolicy::days(30)
        };

        let stats = engine(&fx, Arc::new(HighestIds), policy).run_cycle().await.unwrap();
        assert_eq!(stats.files_deleted, 0);
    }

    #[tokio::test]
    async fn seeded_pruning_is_reproducible() {
        async fn deleted_with_seed(seed: u64) -> Vec<Identifier> {
            let raws: Vec<String> = (1..=12).map(|i| format!("ST{i:03}")).collect();
            let records = raws.iter().map(|r| referenced(r, 1)).collect();
            let artifacts: Vec<(&str, usize)> = raws.iter().map(|r| (r.as_str(), 4)).collect();
            let fx = fixture(records, &artifacts).await;

            let stats = engine(&fx, Arc::new(RandomSelector::seeded(seed)), RetentionPolicy::default())
                .run_cycle()
                .await
                .unwrap();
            // ⌈0.2 × 12⌉ = 3
            assert_eq!(stats.files_pruned, 3);

            let left: Vec<Identifier> = fx.store.list().await.unwrap().into_iter().map(|a| a.id).collect();
            raws.iter().map(|r| id(r)).filter(|i| !left.contains(i)).collect()
        }

        assert_eq!(deleted_with_seed(7).await, deleted_with_seed(7).await);
    }

    #[tokio::test]
    async fn unreadable_directory_aborts_and_reports() {
        let fx = fixture(vec![referenced("ST001", 1)], &[]).await;
        tokio::fs::remove_dir_all(fx.store.root()).await.unwrap();

        let engine = engine(&fx, Arc::new(HighestIds), RetentionPolicy::default());
        let err = engine.run_cycle().await.unwrap_err();

        assert_eq!(err.kind(), crate::domain::ErrorKind::Storage);
        assert_eq!(engine.phase(), CleanupPhase::Idle);
        let events = fx.book.events_of(CLEANUP_ERROR).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].remark.contains("failed to read artifact directory"));
        assert!(fx.book.events_of(CLEANUP_SUCCESS).await.is_empty());
    }
}
