//! CertificatePipeline - render → assemble → store
//!
//! CPU を使う描画と組版は `spawn_blocking` の中で行い、配置だけを
//! ArtifactStore に任せます。

use async_trait::async_trait;
use std::sync::Arc;

use super::document::DocumentAssembler;
use super::renderer::CertificateRenderer;
use crate::domain::{Artifact, CertError, GenerationRequest};
use crate::ports::{ArtifactStore, DocumentPipeline};

pub struct CertificatePipeline {
    renderer: Arc<CertificateRenderer>,
    assembler: DocumentAssembler,
    store: Arc<dyn ArtifactStore>,
}

impl CertificatePipeline {
    pub fn new(
        renderer: CertificateRenderer,
        assembler: DocumentAssembler,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            renderer: Arc::new(renderer),
            assembler,
            store,
        }
    }

    pub fn renderer(&self) -> &CertificateRenderer {
        &self.renderer
    }
}

#[async_trait]
impl DocumentPipeline for CertificatePipeline {
    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, CertError> {
        let renderer = Arc::clone(&self.renderer);
        let assembler = self.assembler.clone();
        let scratch_dir = self.store.scratch_dir().to_path_buf();
        let owned = request.clone();

        let bytes = tokio::task::spawn_blocking(move || {
            let image = renderer.render(&owned, &scratch_dir)?;
            assembler.assemble(&image, owned.id.as_str(), &scratch_dir)
        })
        .await
        .map_err(|e| CertError::Render(format!("render task aborted: {e}")))??;

        let artifact = self.store.write(&request.id, bytes).await?;
        tracing::info!(
            id = %request.id,
            size_bytes = artifact.size_bytes,
            "certificate generated"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Identifier};
    use crate::impls::LocalArtifactStore;
    use crate::render::RenderOptions;

    #[tokio::test]
    async fn render_failures_leave_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalArtifactStore::open(dir.path()).await.unwrap());
        let pipeline = CertificatePipeline::new(
            CertificateRenderer::new(
                dir.path().join("missing.jpg"),
                dir.path().join("missing.ttf"),
                RenderOptions::default(),
            ),
            DocumentAssembler::default(),
            store.clone(),
        );

        let id = Identifier::parse("ST001").unwrap();
        let err = pipeline
            .generate(&GenerationRequest::new(id.clone(), "Jane Doe"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Asset);
        assert!(!store.exists(&id).await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
