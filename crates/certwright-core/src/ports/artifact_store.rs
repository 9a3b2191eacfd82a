//! ArtifactStore port - 生成済み文書の保存先
//!
//! # 設計原則
//! - 1 identifier につき 1 ファイル（バージョン管理なし、再生成で上書き）
//! - ディスクの状態が「使える文書があるか」の最終的な正本
//! - 削除→書き込みの間にファイルが無い瞬間があっても許容する

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{Artifact, CertError, Identifier};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Deterministic location of the artifact for `id`.
    fn path_for(&self, id: &Identifier) -> PathBuf;

    /// Directory for transient files (verification code, intermediate raster).
    fn scratch_dir(&self) -> &Path;

    async fn exists(&self, id: &Identifier) -> Result<bool, CertError>;

    async fn stat(&self, id: &Identifier) -> Result<Option<Artifact>, CertError>;

    /// Replace the artifact for `id` with `bytes`.
    async fn write(&self, id: &Identifier, bytes: Vec<u8>) -> Result<Artifact, CertError>;

    /// Remove the artifact, returning the number of bytes freed.
    async fn remove(&self, id: &Identifier) -> Result<Option<u64>, CertError>;

    /// Every artifact currently on disk.
    async fn list(&self) -> Result<Vec<Artifact>, CertError>;
}
