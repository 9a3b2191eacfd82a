//! GenerationTracker - identifier ごとの生成状態
//!
//! チェックと状態遷移は同じ write lock の中で行うので、同じ identifier に
//! in_progress が 2 つ立つことはありません。

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{GenerationState, Identifier, TaskEntry};
use crate::ports::Clock;

/// Outcome of trying to take the in-progress slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Slot taken. `previous` is what to restore on rollback.
    Claimed { previous: Option<TaskEntry> },
    AlreadyInProgress,
    RecentlyCompleted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerCounts {
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct GenerationTracker {
    entries: RwLock<HashMap<Identifier, TaskEntry>>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl GenerationTracker {
    pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cooldown,
            clock,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Take the slot unless a task is running or one finished within the cool-down.
    pub async fn try_claim(&self, id: &Identifier) -> Claim {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            Some(TaskEntry::InProgress { .. }) => return Claim::AlreadyInProgress,
            Some(TaskEntry::Completed { at }) if now - *at < self.cooldown => {
                return Claim::RecentlyCompleted;
            }
            _ => {}
        }
        let previous = entries.insert(id.clone(), TaskEntry::InProgress { started_at: now });
        Claim::Claimed { previous }
    }

    /// Take the slot ignoring the cool-down. `None` when a task is already running.
    pub async fn try_claim_forced(&self, id: &Identifier) -> Option<Option<TaskEntry>> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        if matches!(entries.get(id), Some(TaskEntry::InProgress { .. })) {
            return None;
        }
        Some(entries.insert(id.clone(), TaskEntry::InProgress { started_at: now }))
    }

    /// Put back whatever was there before a claim that never ran.
    pub async fn rollback(&self, id: &Identifier, previous: Option<TaskEntry>) {
        let mut entries = self.entries.write().await;
        match previous {
            Some(entry) => {
                entries.insert(id.clone(), entry);
            }
            None => {
                entries.remove(id);
            }
        }
    }

    pub async fn complete(&self, id: &Identifier) {
        let at = self.clock.now();
        self.entries
            .write()
            .await
            .insert(id.clone(), TaskEntry::Completed { at });
    }

    pub async fn fail(&self, id: &Identifier, reason: impl Into<String>) {
        let at = self.clock.now();
        self.entries.write().await.insert(
            id.clone(),
            TaskEntry::Failed {
                at,
                reason: reason.into(),
            },
        );
    }

    pub async fn entry(&self, id: &Identifier) -> Option<TaskEntry> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn state(&self, id: &Identifier) -> GenerationState {
        self.entry(id)
            .await
            .map(|e| e.state())
            .unwrap_or(GenerationState::Absent)
    }

    /// Drop a terminal marker. Running tasks are left alone.
    pub async fn invalidate(&self, id: &Identifier) -> bool {
        let mut entries = self.entries.write().await;
        if entries.get(id).is_some_and(|e| e.state().is_terminal()) {
            entries.remove(id);
            return true;
        }
        false
    }

    /// Remove terminal markers older than `max_age`; returns how many went.
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.state().is_terminal() || now - e.touched_at() <= max_age);
        before - entries.len()
    }

    pub async fn counts(&self) -> TrackerCounts {
        let entries = self.entries.read().await;
        let mut counts = TrackerCounts::default();
        for entry in entries.values() {
            match entry.state() {
                GenerationState::InProgress => counts.in_progress += 1,
                GenerationState::Completed => counts.completed += 1,
                GenerationState::Failed => counts.failed += 1,
                GenerationState::Absent => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (Arc<FixedClock>, GenerationTracker) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let tracker = GenerationTracker::new(clock.clone(), Duration::hours(1));
        (clock, tracker)
    }

    fn id(raw: &str) -> Identifier {
        Identifier::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn second_claim_sees_in_progress() {
        let (_, tracker) = setup();
        assert_eq!(
            tracker.try_claim(&id("ST002")).await,
            Claim::Claimed { previous: None }
        );
        assert_eq!(tracker.try_claim(&id("ST002")).await, Claim::AlreadyInProgress);
        assert_eq!(tracker.state(&id("ST002")).await, GenerationState::InProgress);
    }

    #[tokio::test]
    async fn completion_short_circuits_within_cooldown_only() {
        let (clock, tracker) = setup();
        tracker.try_claim(&id("ST001")).await;
        tracker.complete(&id("ST001")).await;

        clock.advance(Duration::minutes(59));
        assert_eq!(tracker.try_claim(&id("ST001")).await, Claim::RecentlyCompleted);

        clock.advance(Duration::minutes(2));
        assert!(matches!(
            tracker.try_claim(&id("ST001")).await,
            Claim::Claimed {
                previous: Some(TaskEntry::Completed { .. })
            }
        ));
    }

    #[tokio::test]
    async fn failure_does_not_block_retry() {
        let (_, tracker) = setup();
        tracker.try_claim(&id("ST001")).await;
        tracker.fail(&id("ST001"), "font missing").await;
        assert_eq!(tracker.state(&id("ST001")).await, GenerationState::Failed);
        assert!(matches!(
            tracker.try_claim(&id("ST001")).await,
            Claim::Claimed { .. }
        ));
    }

    #[tokio::test]
    async fn forced_claim_ignores_cooldown_but_not_running_tasks() {
        let (_, tracker) = setup();
        tracker.try_claim(&id("ST001")).await;
        assert_eq!(tracker.try_claim_forced(&id("ST001")).await, None);

        tracker.complete(&id("ST001")).await;
        assert!(tracker.try_claim_forced(&id("ST001")).await.is_some());
    }

    #[tokio::test]
    async fn rollback_restores_previous_entry() {
        let (_, tracker) = setup();
        tracker.complete(&id("ST001")).await;
        let previous = tracker.try_claim_forced(&id("ST001")).await.unwrap();
        tracker.rollback(&id("ST001"), previous).await;
        assert_eq!(tracker.state(&id("ST001")).await, GenerationState::Completed);

        let Claim::Claimed { previous } = tracker.try_claim(&id("ST009")).await else {
            panic!("expected claim");
        };
        tracker.rollback(&id("ST009"), previous).await;
        assert_eq!(tracker.state(&id("ST009")).await, GenerationState::Absent);
    }

    #[tokio::test]
    async fn invalidate_only_touches_terminal_markers() {
        let (_, tracker) = setup();
        tracker.try_claim(&id("ST001")).await;
        assert!(!tracker.invalidate(&id("ST001")).await);

        tracker.complete(&id("ST001")).await;
        assert!(tracker.invalidate(&id("ST001")).await);
        assert_eq!(tracker.state(&id("ST001")).await, GenerationState::Absent);
    }

    #[tokio::test]
    async fn sweep_drops_stale_terminal_markers() {
        let (clock, tracker) = setup();
        tracker.complete(&id("ST001")).await;
        tracker.fail(&id("ST002"), "x").await;
        tracker.try_claim(&id("ST003")).await;

        clock.advance(Duration::hours(25));
        tracker.complete(&id("ST004")).await;

        assert_eq!(tracker.sweep(Duration::hours(24)).await, 2);
        let counts = tracker.counts().await;
        assert_eq!(
            counts,
            TrackerCounts {
                in_progress: 1,
                completed: 1,
                failed: 0
            }
        );
    }
}
