//! LocalArtifactStore - ローカルディレクトリに `<id>.pdf` を置く実装
//!
//! 書き込みは同じディレクトリの一時ファイル → rename で置き換えるので、
//! 読み手が中途半端なファイルを見ることはありません。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{ARTIFACT_EXTENSION, Artifact, CertError, Identifier};
use crate::ports::ArtifactStore;

pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    /// Open (and create if needed) the artifact directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CertError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CertError::storage(format!("create {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_from_metadata(
        id: Identifier,
        path: PathBuf,
        metadata: &std::fs::Metadata,
    ) -> Artifact {
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Artifact {
            id,
            path,
            size_bytes: metadata.len(),
            created_at,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn path_for(&self, id: &Identifier) -> PathBuf {
        self.root.join(Artifact::file_name(id))
    }

    fn scratch_dir(&self) -> &Path {
        &self.root
    }

    async fn exists(&self, id: &Identifier) -> Result<bool, CertError> {
        Ok(self.stat(id).await?.is_some())
    }

    async fn stat(&self, id: &Identifier) -> Result<Option<Artifact>, CertError> {
        let path = self.path_for(id);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(Self::artifact_from_metadata(
                id.clone(),
                path,
                &metadata,
            ))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CertError::storage(format!("stat {}", path.display()), e)),
        }
    }

    async fn write(&self, id: &Identifier, bytes: Vec<u8>) -> Result<Artifact, CertError> {
        let root = self.root.clone();
        let target = self.path_for(id);
        let persisted = target.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&persisted).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CertError::storage(format!("write {}", target.display()), std::io::Error::other(e)))?
        .map_err(|e| CertError::storage(format!("write {}", target.display()), e))?;

        self.stat(id).await?.ok_or_else(|| {
            CertError::storage(
                format!("write {}", target.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact vanished after write"),
            )
        })
    }

    async fn remove(&self, id: &Identifier) -> Result<Option<u64>, CertError> {
        let Some(artifact) = self.stat(id).await? else {
            return Ok(None);
        };
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => Ok(Some(artifact.size_bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CertError::storage(
                format!("remove {}", artifact.path.display()),
                e,
            )),
        }
    }

    async fn list(&self) -> Result<Vec<Artifact>, CertError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| CertError::storage(format!("read_dir {}", self.root.display()), e))?;

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CertError::storage(format!("read_dir {}", self.root.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // 手で置かれた想定外のファイル名は無視する
            let Ok(id) = Identifier::parse(stem) else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| CertError::storage(format!("stat {}", path.display()), e))?;
            if !metadata.is_file() {
                continue;
            }
            artifacts.push(Self::artifact_from_metadata(id, path, &metadata));
        }
        artifacts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(artifacts)
    }
}
