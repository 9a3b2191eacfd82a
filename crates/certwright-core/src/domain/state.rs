//! State - 生成タスクの状態
//!
//! absent → in_progress → {completed, failed}
//!
//! 1 つの identifier につき map エントリは 1 つだけなので、in_progress と
//! completed が同時に真になることは構造上ありえません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracking record for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEntry {
    InProgress { started_at: DateTime<Utc> },
    Completed { at: DateTime<Utc> },
    Failed { at: DateTime<Utc>, reason: String },
}

impl TaskEntry {
    pub fn state(&self) -> GenerationState {
        match self {
            TaskEntry::InProgress { .. } => GenerationState::InProgress,
            TaskEntry::Completed { .. } => GenerationState::Completed,
            TaskEntry::Failed { .. } => GenerationState::Failed,
        }
    }

    /// When the entry last changed.
    pub fn touched_at(&self) -> DateTime<Utc> {
        match self {
            TaskEntry::InProgress { started_at } => *started_at,
            TaskEntry::Completed { at } | TaskEntry::Failed { at, .. } => *at,
        }
    }
}

/// Public view of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Absent,
    InProgress,
    Completed,
    Failed,
}

impl GenerationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationState::Completed | GenerationState::Failed)
    }
}

/// EnsureStatus は EnsureGenerated の即時応答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureStatus {
    AlreadyInProgress,
    RecentlyCompleted,
    Started,
    FailedToStart,
}

impl EnsureStatus {
    /// Whether a terminal notification will follow for this request.
    pub fn expects_notification(self) -> bool {
        matches!(self, EnsureStatus::AlreadyInProgress | EnsureStatus::Started)
    }
}
