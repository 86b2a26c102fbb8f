//! Named index lifecycle.
//!
//! An [`IndexManager`] owns a root directory and hands out shared engines by
//! name. KV and document indexes live side by side:
//!
//! ```text
//! <root>/
//! ├── kv/<name>/     IndexKvStore
//! └── doc/<name>/    IndexDocStore
//! ```

use super::config::{IndexConfig, IndexLocation};
use super::engine::{IndexDocStore, IndexKvStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// The two engine flavors a manager can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFlavor {
    Kv,
    Doc,
}

impl IndexFlavor {
    fn dir_name(self) -> &'static str {
        match self {
            IndexFlavor::Kv => "kv",
            IndexFlavor::Doc => "doc",
        }
    }
}

/// Checks that `name` can be used as a directory name.
pub fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Opens, shares and closes named indexes.
#[derive(Debug)]
pub struct IndexManager {
    root: Option<PathBuf>,
    template: IndexConfig,
    kv: Mutex<HashMap<String, Arc<IndexKvStore>>>,
    docs: Mutex<HashMap<String, Arc<IndexDocStore>>>,
}

impl IndexManager {
    /// A manager storing every index under `root`.
    ///
    /// `template` supplies the commit mode and writer settings; its location
    /// is ignored.
    pub fn new(root: impl AsRef<Path>, template: IndexConfig) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            template,
            kv: Mutex::new(HashMap::new()),
            docs: Mutex::new(HashMap::new()),
        }
    }

    /// A manager whose indexes live in RAM only.
    pub fn in_memory(template: IndexConfig) -> Self {
        Self {
            root: None,
            template,
            kv: Mutex::new(HashMap::new()),
            docs: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The configuration an index called `name` is opened with.
    pub fn config_for(&self, flavor: IndexFlavor, name: &str) -> StoreResult<IndexConfig> {
        validate_name(name)?;
        let location = match &self.root {
            Some(root) => IndexLocation::Directory(root.join(flavor.dir_name()).join(name)),
            None => IndexLocation::Memory,
        };
        Ok(self.template.clone().with_location(location))
    }

    /// Opens (or returns the already open) KV index `name`.
    pub fn open_kv(&self, name: &str) -> StoreResult<Arc<IndexKvStore>> {
        let mut open = self.kv.lock();
        if let Some(store) = open.get(name) {
            return Ok(Arc::clone(store));
        }

        let config = self.config_for(IndexFlavor::Kv, name)?;
        let store = Arc::new(IndexKvStore::open(&config)?);
        open.insert(name.to_string(), Arc::clone(&store));
        info!(name = name, flavor = "kv", "Index registered");
        Ok(store)
    }

    /// Opens (or returns the already open) document index `name`.
    pub fn open_doc(&self, name: &str) -> StoreResult<Arc<IndexDocStore>> {
        let mut open = self.docs.lock();
        if let Some(store) = open.get(name) {
            return Ok(Arc::clone(store));
        }

        let config = self.config_for(IndexFlavor::Doc, name)?;
        let store = Arc::new(IndexDocStore::open(&config)?);
        open.insert(name.to_string(), Arc::clone(&store));
        info!(name = name, flavor = "doc", "Index registered");
        Ok(store)
    }

    /// Closes and forgets every index called `name`.
    ///
    /// Returns false if nothing by that name was open. Handles still held
    /// elsewhere fail with `Closed` from now on.
    pub fn close(&self, name: &str) -> StoreResult<bool> {
        let kv = self.kv.lock().remove(name);
        let doc = self.docs.lock().remove(name);
        let found = kv.is_some() || doc.is_some();

        if let Some(store) = kv {
            store.close()?;
        }
        if let Some(store) = doc {
            store.close()?;
        }
        Ok(found)
    }

    /// Closes every open index.
    ///
    /// Keeps going past failures and returns the first one.
    pub fn close_all(&self) -> StoreResult<()> {
        let kv: Vec<_> = self.kv.lock().drain().collect();
        let docs: Vec<_> = self.docs.lock().drain().collect();
        let mut first_error = None;

        let results = kv
            .iter()
            .map(|(name, store)| (name, store.close()))
            .chain(docs.iter().map(|(name, store)| (name, store.close())));

        for (name, result) in results {
            if let Err(err) = result {
                warn!(name = %name, error = %err, "Failed to close index");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Names of the open indexes of one flavor, sorted.
    pub fn names(&self, flavor: IndexFlavor) -> Vec<String> {
        let mut names: Vec<String> = match flavor {
            IndexFlavor::Kv => self.kv.lock().keys().cloned().collect(),
            IndexFlavor::Doc => self.docs.lock().keys().cloned().collect(),
        };
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::document::Document;
    use bytes::Bytes;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("users").is_ok());
        assert!(validate_name("user_events-2").is_ok());
        for bad in ["", "..", "a/b", "a b", "a:b"] {
            assert!(matches!(
                validate_name(bad),
                Err(StoreError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_shared_handles() {
        let manager = IndexManager::in_memory(IndexConfig::default());

        let first = manager.open_kv("sessions").unwrap();
        let second = manager.open_kv("sessions").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.put("s", "k", Bytes::from("v"), None).unwrap();
        assert_eq!(second.get("s", "k").unwrap(), Some(Bytes::from("v")));

        // Same name, other flavor: a separate index
        let docs = manager.open_doc("sessions").unwrap();
        assert_eq!(docs.size("s").unwrap(), 0);

        assert_eq!(manager.names(IndexFlavor::Kv), vec!["sessions"]);
        assert_eq!(manager.names(IndexFlavor::Doc), vec!["sessions"]);
    }

    #[test]
    fn test_rejects_bad_names() {
        let manager = IndexManager::in_memory(IndexConfig::default());
        assert!(matches!(
            manager.open_kv("../escape"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(manager.names(IndexFlavor::Kv).is_empty());
    }

    #[test]
    fn test_close_forgets_index() {
        let manager = IndexManager::in_memory(IndexConfig::default());
        let store = manager.open_kv("tmp").unwrap();

        assert!(manager.close("tmp").unwrap());
        assert!(!manager.close("tmp").unwrap());
        assert!(matches!(store.get("s", "k"), Err(StoreError::Closed)));

        // Reopening yields a fresh engine
        let reopened = manager.open_kv("tmp").unwrap();
        assert!(!Arc::ptr_eq(&store, &reopened));
        assert!(reopened.exists("s", "k").is_ok());
    }

    #[test]
    fn test_on_disk_layout_and_close_all() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IndexManager::new(dir.path(), IndexConfig::default());

        manager.open_kv("cache").unwrap();
        let docs = manager.open_doc("users").unwrap();
        docs.put("users", "42", Document::new().with("name", "Ada"), None)
            .unwrap();

        assert!(dir.path().join("kv").join("cache").is_dir());
        assert!(dir.path().join("doc").join("users").is_dir());

        manager.close_all().unwrap();
        assert!(manager.names(IndexFlavor::Kv).is_empty());
        assert!(manager.names(IndexFlavor::Doc).is_empty());

        let reopened = IndexManager::new(dir.path(), IndexConfig::default());
        let docs = reopened.open_doc("users").unwrap();
        assert_eq!(
            docs.get("users", "42").unwrap(),
            Some(Document::new().with("name", "Ada"))
        );
    }
}
