use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{ObjectStore, validate_key};
use crate::error::AppResult;

/// Objets rangés sous un répertoire local, la clé devient le chemin relatif
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()> {
        let target = self.resolve(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let target = self.resolve(key)?;
        match fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let target = self.resolve(key)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put("cours/year3/M/a.pdf", b"%PDF".to_vec()).await.unwrap();
        assert!(dir.path().join("cours/year3/M/a.pdf").exists());
        assert_eq!(store.get("cours/year3/M/a.pdf").await.unwrap(), Some(b"%PDF".to_vec()));

        store.delete("cours/year3/M/a.pdf").await.unwrap();
        assert_eq!(store.get("cours/year3/M/a.pdf").await.unwrap(), None);
        // deuxième suppression : pas d'erreur
        store.delete("cours/year3/M/a.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        assert!(store.put("../evil.txt", b"x".to_vec()).await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }
}
