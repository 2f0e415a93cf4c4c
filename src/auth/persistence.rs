//! Where the token pair survives between process runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::token_store::TokenRecord;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage backend for the token record.
pub trait TokenPersistence: Send + Sync {
    fn load(&self) -> Result<Option<TokenRecord>, TokenStoreError>;
    fn save(&self, record: &TokenRecord) -> Result<(), TokenStoreError>;
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Keeps nothing beyond the in-memory record.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryPersistence;

impl TokenPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<TokenRecord>, TokenStoreError> {
        Ok(None)
    }

    fn save(&self, _record: &TokenRecord) -> Result<(), TokenStoreError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        Ok(())
    }
}

/// Stores the record as a JSON file.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenPersistence for FilePersistence {
    fn load(&self) -> Result<Option<TokenRecord>, TokenStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, record: &TokenRecord) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(record)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("storefront-tokens-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_file_round_trip_and_clear() {
        let store = FilePersistence::new(temp_path());
        assert!(store.load().unwrap().is_none());

        let record = TokenRecord {
            access_token: "a1".into(),
            refresh_token: "r1".into(),
            expires_at: Some(1_700_000_000_000),
        };
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let path = temp_path();
        fs::write(&path, "{not json").unwrap();
        let err = FilePersistence::new(&path).load().unwrap_err();
        assert!(matches!(err, TokenStoreError::Json(_)));
        fs::remove_file(&path).unwrap();
    }
}
