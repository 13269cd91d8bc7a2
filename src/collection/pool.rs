use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::collection::collection::Collection;
use crate::core::error::{Error, Result};
use crate::core::validate::validate_collname_throw;

/// Cached readonly handles per collection. Disabled until cached readers
/// can be invalidated when their collection is deleted out from under
/// them.
const MAX_CACHED_READERS_PER_COLLECTION: usize = 0;

#[derive(Default)]
struct PoolState {
    readonly: BTreeMap<String, Vec<Collection>>,
    /// At most one writable handle per collection; `None` while it is
    /// checked out.
    writable: BTreeMap<String, Option<Collection>>,
}

/// A pool of open collection handles shared between threads. The mutex
/// covers pool bookkeeping only; opening and closing collections happens
/// outside it.
pub struct CollectionPool {
    datadir: PathBuf,
    state: Mutex<PoolState>,
    max_cached_readers_per_collection: usize,
}

impl CollectionPool {
    pub fn new(datadir: impl Into<PathBuf>) -> Result<Self> {
        let datadir = datadir.into();
        if !datadir.is_dir() {
            fs::create_dir_all(&datadir).map_err(|e| {
                Error::sys(
                    format!("unable to create datadir '{}'", datadir.display()),
                    e.raw_os_error(),
                )
            })?;
        }
        Ok(CollectionPool {
            datadir,
            state: Mutex::new(PoolState::default()),
            max_cached_readers_per_collection: MAX_CACHED_READERS_PER_COLLECTION,
        })
    }

    fn coll_path(&self, coll_name: &str) -> PathBuf {
        self.datadir.join(coll_name)
    }

    /// Is there an open handle for the collection, or a directory for it
    /// on disk?
    pub fn exists(&self, coll_name: &str) -> bool {
        {
            let state = self.state.lock();
            if state.readonly.contains_key(coll_name) || state.writable.contains_key(coll_name) {
                return true;
            }
        }
        self.coll_path(coll_name).is_dir()
    }

    /// Check out a readonly handle, reusing a cached one if available.
    pub fn get_readonly(&self, coll_name: &str) -> Result<Collection> {
        validate_collname_throw(coll_name)?;
        let cached = {
            let mut state = self.state.lock();
            state
                .readonly
                .get_mut(coll_name)
                .and_then(|stack| stack.pop())
        };
        let mut coll =
            cached.unwrap_or_else(|| Collection::new(coll_name, self.coll_path(coll_name)));
        coll.open_readonly()?;
        Ok(coll)
    }

    /// Check out the writable handle. While checked out, no other caller
    /// can obtain writable access to the same collection.
    pub fn get_writable(&self, coll_name: &str) -> Result<Collection> {
        validate_collname_throw(coll_name)?;
        let cached = {
            let mut state = self.state.lock();
            state
                .writable
                .get_mut(coll_name)
                .and_then(|slot| slot.take())
        };
        let mut coll =
            cached.unwrap_or_else(|| Collection::new(coll_name, self.coll_path(coll_name)));
        coll.open_writable()?;
        Ok(coll)
    }

    /// Return a checked-out handle to the pool.
    pub fn release(&self, coll: Collection) {
        let mut state = self.state.lock();
        if coll.is_writable() {
            let slot = state
                .writable
                .entry(coll.name().to_string())
                .or_insert(None);
            if slot.is_none() {
                *slot = Some(coll);
            }
        } else {
            let stack = state.readonly.entry(coll.name().to_string()).or_default();
            if stack.len() < self.max_cached_readers_per_collection {
                stack.push(coll);
            }
        }
    }

    /// Destroy all cached handles for the collection and remove its data
    /// directory.
    pub fn del(&self, coll_name: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.readonly.remove(coll_name);
            state.writable.remove(coll_name);
        }
        let topdir = self.coll_path(coll_name);
        if topdir.is_dir() {
            fs::remove_dir_all(&topdir).map_err(|e| {
                Error::sys(
                    format!("unable to remove '{}'", topdir.display()),
                    e.raw_os_error(),
                )
            })?;
        }
        Ok(())
    }

    /// Names of the collections present on disk.
    pub fn get_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.datadir)
            .map_err(|e| Error::sys("unable to read datadir", e.raw_os_error()))?
        {
            let entry = entry.map_err(|e| Error::sys("unable to read datadir", e.raw_os_error()))?;
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_exists_and_names() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();
        assert!(!pool.exists("c1"));

        let coll = pool.get_writable("c1").unwrap();
        pool.release(coll);
        assert!(pool.exists("c1"));
        assert_eq!(pool.get_names().unwrap(), ["c1"]);
    }

    #[test]
    fn test_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();
        assert!(pool.get_writable("bad/name").is_err());
        assert!(pool.get_readonly("").is_err());
    }

    #[test]
    fn test_writable_slot_empty_while_checked_out() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();

        let writer = pool.get_writable("c1").unwrap();
        assert!(writer.is_writable());
        {
            let state = pool.state.lock();
            // The slot exists only once a handle has been released.
            assert!(state
                .writable
                .get("c1")
                .map(|slot| slot.is_none())
                .unwrap_or(true));
        }
        pool.release(writer);

        let state = pool.state.lock();
        assert!(state.writable.get("c1").unwrap().is_some());
    }

    #[test]
    fn test_release_roundtrip_preserves_pending_state() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();

        let mut writer = pool.get_writable("c1").unwrap();
        writer.from_json(&json!({"format": 3})).unwrap();
        writer.commit().unwrap();
        pool.release(writer);

        // The released handle is reused for the next writable checkout.
        let writer = pool.get_writable("c1").unwrap();
        assert_eq!(writer.to_json()["format"], 3);
        pool.release(writer);

        let mut reader = pool.get_readonly("c1").unwrap();
        assert_eq!(reader.doc_count().unwrap(), 0);
        pool.release(reader);
    }

    #[test]
    fn test_del_removes_directory() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();
        let coll = pool.get_writable("c1").unwrap();
        pool.release(coll);
        assert!(pool.exists("c1"));

        pool.del("c1").unwrap();
        assert!(!pool.exists("c1"));
        assert!(pool.get_names().unwrap().is_empty());
    }

    #[test]
    fn test_readonly_cache_disabled() {
        let dir = TempDir::new().unwrap();
        let pool = CollectionPool::new(dir.path().join("data")).unwrap();
        let coll = pool.get_writable("c1").unwrap();
        pool.release(coll);

        let reader = pool.get_readonly("c1").unwrap();
        pool.release(reader);
        // With caching disabled the reader was dropped, not cached.
        let state = pool.state.lock();
        assert!(state
            .readonly
            .get("c1")
            .map(|stack| stack.is_empty())
            .unwrap_or(true));
    }
}
