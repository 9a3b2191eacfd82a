//! App - アプリケーション層
//!
//! ports を組み合わせて証明書の発行・配信・削除を実装します。
//!
//! # 主要コンポーネント
//! - **GenerationCoordinator**: 重複排除、状態遷移、購読者への終端通知
//! - **DownloadTracker**: 配信バイト数の計測と完了判定
//! - **EvictionEngine**: 参照履歴に基づく削除サイクル
//! - **RecurringTimer / BackgroundGroup**: 定期ジョブ
//! - **CertificateService**: 呼び出し側の入口
//! - **AppBuilder**: 設定からの組み立て（fail-fast）

pub mod background;
pub mod builder;
pub mod config;
pub mod coordinator;
pub mod download;
pub mod eviction;
pub mod scheduler;
pub mod service;
pub mod subscribers;
pub mod tracker;

// 主要な型を再エクスポート
pub use self::background::{BackgroundGroup, SweepJob};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::config::{Config, ConfigError};
pub use self::coordinator::{CoordinatorCounts, GenerationCoordinator};
pub use self::download::{DownloadHandle, DownloadSession, DownloadTracker, TrackedWriter};
pub use self::eviction::{CleanupPhase, CleanupStats, EvictionEngine, RetentionPolicy};
pub use self::scheduler::{DailyAt, Every, RecurringJob, RecurringTimer, Schedule};
pub use self::service::{CertificateService, DocumentResponse};
pub use self::subscribers::{SubscriberRegistry, Subscription};
pub use self::tracker::{Claim, GenerationTracker, TrackerCounts};
