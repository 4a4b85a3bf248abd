//! Abstract blob storage and a local-filesystem implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ChordResult;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn initialize(&self) -> ChordResult<()>;
    async fn save(&self, name: &str, content: Vec<u8>) -> ChordResult<String>;
    async fn get(&self, name: &str) -> ChordResult<Option<Vec<u8>>>;
    async fn delete(&self, name: &str) -> ChordResult<bool>;
    async fn exists(&self, name: &str) -> ChordResult<bool>;
    async fn list(&self) -> ChordResult<Vec<String>>;
}

/// Local file system storage backend. Stores files flat in `base_path`,
/// stripping any directory components from the requested name first —
/// the core's only path-traversal defense.
pub struct LocalFsStorage {
    base_path: PathBuf,
}

impl LocalFsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalFsStorage { base_path: base_path.into() }
    }

    fn file_path(&self, name: &str) -> PathBuf {
        let safe_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        self.base_path.join(safe_name)
    }
}

#[async_trait]
impl Storage for LocalFsStorage {
    async fn initialize(&self) -> ChordResult<()> {
        if !self.base_path.exists() {
            tokio::fs::create_dir_all(&self.base_path).await?;
            debug!(path = %self.base_path.display(), "created storage directory");
        }
        Ok(())
    }

    async fn save(&self, name: &str, content: Vec<u8>) -> ChordResult<String> {
        let path = self.file_path(name);
        tokio::fs::write(&path, &content).await?;
        debug!(name, bytes = content.len(), "saved file");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, name: &str) -> ChordResult<Option<Vec<u8>>> {
        let path = self.file_path(name);
        match tokio::fs::read(&path).await {
            Ok(content) => {
                debug!(name, bytes = content.len(), "retrieved file");
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> ChordResult<bool> {
        let path = self.file_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name, "deleted file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> ChordResult<bool> {
        Ok(tokio::fs::try_exists(self.file_path(name)).await?)
    }

    async fn list(&self) -> ChordResult<Vec<String>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("chord-dfs-test-{}", std::process::id()));
        dir
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let storage = LocalFsStorage::new(temp_dir());
        storage.initialize().await.unwrap();
        storage.save("alpha.txt", b"A".to_vec()).await.unwrap();
        let value = storage.get("alpha.txt").await.unwrap();
        assert_eq!(value, Some(b"A".to_vec()));
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let storage = LocalFsStorage::new(temp_dir());
        storage.initialize().await.unwrap();
        assert_eq!(storage.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_then_get_returns_not_found() {
        let storage = LocalFsStorage::new(temp_dir());
        storage.initialize().await.unwrap();
        storage.save("beta.txt", b"B".to_vec()).await.unwrap();
        assert!(storage.delete("beta.txt").await.unwrap());
        assert_eq!(storage.get("beta.txt").await.unwrap(), None);
        assert!(!storage.delete("beta.txt").await.unwrap());
    }

    #[tokio::test]
    async fn name_is_sanitized_against_path_traversal() {
        let storage = LocalFsStorage::new(temp_dir());
        storage.initialize().await.unwrap();
        storage.save("../../etc/passwd", b"nope".to_vec()).await.unwrap();
        assert!(!std::path::Path::new("/etc/passwd-tampered").exists());
        let files = storage.list().await.unwrap();
        assert!(files.contains(&"passwd".to_string()));
    }
}
