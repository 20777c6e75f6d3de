//! Object store collaborator and per-request scratch space

use crate::error::ServiceError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Source of raw recordings
pub trait ObjectStore: Send + Sync {
    /// Copy `key` into `dest_dir`, returning the local path
    fn fetch(&self, key: &str, dest_dir: &Path) -> Result<PathBuf, ServiceError>;

    fn exists(&self, key: &str) -> bool;
}

/// Bucket backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root; keys may not escape it
    fn resolve(&self, key: &str) -> Result<PathBuf, ServiceError> {
        let relative = Path::new(key);
        if key.is_empty() {
            return Err(ServiceError::storage(key, "empty key"));
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ServiceError::storage(key, "key must be relative and stay inside the bucket"));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, key: &str, dest_dir: &Path) -> Result<PathBuf, ServiceError> {
        let source = self.resolve(key)?;
        if !source.is_file() {
            return Err(ServiceError::storage(key, "object not found"));
        }
        let name = source
            .file_name()
            .ok_or_else(|| ServiceError::storage(key, "key has no file name"))?;
        let dest = dest_dir.join(name);
        fs::copy(&source, &dest).map_err(|e| ServiceError::storage(key, e))?;
        debug!(key, dest = %dest.display(), "fetched object");
        Ok(dest)
    }

    fn exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Key of the `.fdt` companion for a `.set` key
pub fn companion_key(key: &str) -> Option<String> {
    let stem = key.len().checked_sub(4).filter(|&i| key.is_char_boundary(i))?;
    key[stem..]
        .eq_ignore_ascii_case(".set")
        .then(|| format!("{}.fdt", &key[..stem]))
}

/// Fetch a recording and, for `.set` keys, its companion when the store has one
pub fn fetch_recording(store: &dyn ObjectStore, key: &str, dest_dir: &Path) -> Result<PathBuf, ServiceError> {
    let path = store.fetch(key, dest_dir)?;
    if let Some(companion) = companion_key(key) {
        if store.exists(&companion) {
            store.fetch(&companion, dest_dir)?;
        } else {
            debug!(key = %companion, "no companion data file in store");
        }
    }
    Ok(path)
}

/// Uniquely named directory removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(parent: &Path) -> Result<Self, ServiceError> {
        let path = parent.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path)
            .map_err(|e| ServiceError::storage(path.display().to_string(), e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eeg-store-{}-{}", std::process::id(), name));
        fs::create_dir_all(dir.join("uploads")).unwrap();
        dir
    }

    #[test]
    fn test_companion_key() {
        assert_eq!(companion_key("uploads/a.set").as_deref(), Some("uploads/a.fdt"));
        assert_eq!(companion_key("uploads/A.SET").as_deref(), Some("uploads/A.fdt"));
        assert_eq!(companion_key("uploads/a.edf"), None);
        assert_eq!(companion_key("set"), None);
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = LocalObjectStore::new(bucket("escape"));
        for key in ["../secret.set", "/etc/passwd", "uploads/../../x.set", ""] {
            let err = store.fetch(key, Path::new("/tmp")).unwrap_err();
            assert_eq!(err.kind(), "storage");
            assert!(!store.exists(key));
        }
    }

    #[test]
    fn test_fetch_with_and_without_companion() {
        let root = bucket("fetch");
        fs::write(root.join("uploads/a.set"), b"set").unwrap();
        fs::write(root.join("uploads/a.fdt"), b"fdt").unwrap();
        fs::write(root.join("uploads/b.set"), b"set").unwrap();
        let store = LocalObjectStore::new(&root);

        let scratch = ScratchDir::create(&root.join("work")).unwrap();
        let path = fetch_recording(&store, "uploads/a.set", scratch.path()).unwrap();
        assert_eq!(path, scratch.path().join("a.set"));
        assert!(scratch.path().join("a.fdt").is_file());

        fetch_recording(&store, "uploads/b.set", scratch.path()).unwrap();
        assert!(!scratch.path().join("b.fdt").exists());

        let err = fetch_recording(&store, "uploads/missing.set", scratch.path()).unwrap_err();
        assert_eq!(err.kind(), "storage");

        let dir = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!dir.exists());
        fs::remove_dir_all(root).ok();
    }
}
