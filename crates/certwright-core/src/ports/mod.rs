//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の協調者（レコードストア、監査ログ、ファイルシステム、
//! 時計、乱数）へのインターフェースを提供し、実装の詳細を隠蔽します。
//! app 層はこれらを `Arc<dyn ...>` で受け取るため、テストでは差し替え可能です。

pub mod artifact_store;
pub mod audit_trail;
pub mod clock;
pub mod id_generator;
pub mod pipeline;
pub mod record_lookup;
pub mod selector;

pub use self::artifact_store::ArtifactStore;
pub use self::audit_trail::{AuditTrail, ReferenceHistory};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::pipeline::DocumentPipeline;
pub use self::record_lookup::RecordLookup;
pub use self::selector::{PruneSelector, RandomSelector, prune_count};
