//! Built distributables

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Kind of distributable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    SourceDist,
    BuiltDist,
}

impl ArtifactKind {
    /// Classify a file by name; `None` for files that are not distributables
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".whl") {
            Some(ArtifactKind::BuiltDist)
        } else if name.ends_with(".tar.gz") || name.ends_with(".zip") {
            Some(ArtifactKind::SourceDist)
        } else {
            None
        }
    }
}

/// A single file produced by the build stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Lowercase hex sha256 of the file contents
    pub content_hash: String,
    pub size: u64,
}

impl Artifact {
    /// Read and hash a file
    pub async fn load(path: &Path, kind: ArtifactKind) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            kind,
            path: path.to_path_buf(),
            content_hash: sha256_hex(&bytes),
            size: bytes.len() as u64,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Hex sha256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Collect every distributable directly inside `dir`, sorted by file name
pub async fn collect_artifacts(dir: &Path) -> std::io::Result<Vec<Artifact>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(kind) = ArtifactKind::from_file_name(&name) {
            found.push((name, entry.path(), kind));
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut artifacts = Vec::with_capacity(found.len());
    for (_, path, kind) in found {
        artifacts.push(Artifact::load(&path, kind).await?);
    }
    Ok(artifacts)
}
