//! Errors - エラー型と分類
//!
//! リクエスト単位のエラーは呼び出し元へ型付きで返します（デフォルト文書で
//! 誤魔化さない）。削除サイクルのエラーはそのサイクル内で完結します。

use thiserror::Error;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Template or font missing/unreadable.
    Asset,
    /// Image decode/encode failure.
    Render,
    /// Verification code could not be produced.
    CodeGeneration,
    /// Document packaging failure.
    Assembly,
    /// Duplicate request observed an in-flight task. Not a failure.
    Noop,
    /// Disk I/O on the artifact directory.
    Storage,
    /// The record store has nothing for the term.
    NotFound,
    /// Malformed input from the caller.
    Invalid,
    /// Record store / audit trail failure.
    Audit,
    /// Work could not be scheduled at all.
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CertError {
    #[error("asset unavailable: {0}")]
    Asset(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("verification code generation failed: {0}")]
    CodeGeneration(String),

    #[error("document assembly failed: {0}")]
    Assembly(String),

    #[error("generation already in progress for id={0}")]
    ConcurrencyNoop(String),

    #[error("storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no record found for {0}")]
    LookupNotFound(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid search term: {0}")]
    InvalidSearchTerm(String),

    #[error("audit trail error: {0}")]
    Audit(String),

    #[error("generation could not be started for id={0}")]
    NotStarted(String),
}

impl CertError {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        CertError::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CertError::Asset(_) => ErrorKind::Asset,
            CertError::Render(_) => ErrorKind::Render,
            CertError::CodeGeneration(_) => ErrorKind::CodeGeneration,
            CertError::Assembly(_) => ErrorKind::Assembly,
            CertError::ConcurrencyNoop(_) => ErrorKind::Noop,
            CertError::Storage { .. } => ErrorKind::Storage,
            CertError::LookupNotFound(_) => ErrorKind::NotFound,
            CertError::InvalidIdentifier(_) | CertError::InvalidSearchTerm(_) => ErrorKind::Invalid,
            CertError::Audit(_) => ErrorKind::Audit,
            CertError::NotStarted(_) => ErrorKind::Unavailable,
        }
    }

    /// Noop は「待つ/再利用せよ」という通知であって失敗ではない
    pub fn is_noop(&self) -> bool {
        self.kind() == ErrorKind::Noop
    }
}
