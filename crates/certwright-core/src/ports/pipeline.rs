//! DocumentPipeline port - Render → Assemble → 配置
//!
//! Coordinator はこの trait しか知らないので、テストでは偽の pipeline を
//! 差し込んで実行回数や失敗を制御できます。

use async_trait::async_trait;

use crate::domain::{Artifact, CertError, GenerationRequest};

#[async_trait]
pub trait DocumentPipeline: Send + Sync {
    /// Produce the artifact for `request`, replacing any existing file.
    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, CertError>;
}
