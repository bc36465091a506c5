use sled::Db;

use crate::utils::error::StorageError;

/// String key/value tables backed by sled.
///
/// Each logical table maps to a sled tree; values are UTF-8 strings. The
/// handle is cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct LocalStorage {
    db: Db,
}

impl LocalStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn get(&self, table: &str, key: &str) -> Result<Option<String>, StorageError> {
        let tree = self.db.open_tree(table)?;
        match tree.get(key)? {
            Some(value) => Ok(Some(String::from_utf8(value.to_vec())?)),
            None => Ok(None),
        }
    }

    /// Writes through to disk before returning.
    pub fn put(&self, table: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let tree = self.db.open_tree(table)?;
        tree.insert(key, value.as_bytes())?;
        tree.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage").field("db", &"sled::Db").finish()
    }
}
