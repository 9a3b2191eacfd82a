//! RecordLookup port - 検索語から identifier と表示名を解決

use async_trait::async_trait;

use crate::domain::{CertError, Record};

#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// `Ok(None)` when nothing matches; `Err` only for store failures.
    async fn lookup(&self, term: &str) -> Result<Option<Record>, CertError>;
}
