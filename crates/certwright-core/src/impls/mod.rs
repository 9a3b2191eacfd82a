//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **LocalArtifactStore**: ローカルディレクトリの成果物ストア
//! - **RecordBook**: レコードストア + 監査ログ（インメモリ、JSON 永続化可）

pub mod fs_store;
pub mod record_book;

pub use self::fs_store::LocalArtifactStore;
pub use self::record_book::{EventEntry, RecordBook};
