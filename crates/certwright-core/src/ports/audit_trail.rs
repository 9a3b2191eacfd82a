//! AuditTrail port - 追記専用の参照履歴とイベントログ
//!
//! - identifier ごとの remark（ダウンロード・検証の記録）
//! - システムイベント（cleanup_success, incomplete_download など）
//!
//! 削除エンジンは remark に含まれる日付から最終参照日時を求めます。

use async_trait::async_trait;

use crate::domain::{CertError, Identifier};

/// Remarks recorded against one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceHistory {
    pub id: Identifier,
    pub remarks: String,
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Append a timestamped remark to the identifier's history.
    async fn append_remark(&self, id: &Identifier, remark: &str) -> Result<(), CertError>;

    /// Every identifier with a non-empty history.
    async fn reference_histories(&self) -> Result<Vec<ReferenceHistory>, CertError>;

    /// Record a system event (`event_type` is a short snake_case tag).
    async fn log_event(&self, event_type: &str, remark: &str) -> Result<(), CertError>;
}
