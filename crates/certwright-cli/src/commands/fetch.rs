//! `fetch` - 生成を待ってファイルへ書き出す

use std::path::Path;

use anyhow::{Context, Result, bail};
use certwright_core::app::{App, DocumentResponse};
use tracing::info;

use crate::CALLER;

pub async fn run(app: &App, term: &str, out: &Path) -> Result<()> {
    let artifact = match app
        .service
        .request_document(term, CALLER)
        .await
        .with_context(|| format!("no certificate available for {term}"))?
    {
        DocumentResponse::ServeCached(artifact) => artifact,
        DocumentResponse::Pending(mut subscription) => {
            info!(id = %subscription.id(), "waiting for generation");
            let id = subscription.id().clone();
            let outcome = subscription.recv().await;
            subscription.release().await;
            match outcome {
                Some(event) if event.is_complete() => {}
                Some(_) => bail!("certificate generation failed for {id}"),
                None => bail!("generation for {id} ended without a result"),
            }
            app.service
                .coordinator()
                .store()
                .stat(&id)
                .await
                .context("failed to read generated certificate")?
                .with_context(|| format!("certificate for {id} disappeared after generation"))?
        }
    };

    let file = tokio::fs::File::create(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    let session = app
        .service
        .stream_document(&artifact, CALLER, file)
        .await
        .context("failed to write certificate")?;

    println!(
        "{} -> {} ({} bytes, download {})",
        artifact.id,
        out.display(),
        session.written_bytes,
        session.token
    );
    Ok(())
}
