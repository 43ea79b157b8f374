//! The namespace allocator.
//!
//! The knowledge base has a fixed number of namespaces (redis databases).
//! Namespace 0 holds the NVT cache written by the import pipeline and the
//! `GVM.__GlobalDBIndex` hash, whose fields are the namespaces in use.
//! Every other namespace is scratch space for one scanner process.
//!
//! A namespace is claimed when it holds no keys and `HSETNX` on the hash
//! succeeds. The emptiness probe alone would let two processes that
//! probe at the same time share a namespace; `HSETNX` is atomic on the
//! server, so only one of them gets it. Processes that do not register in
//! the hash are only kept out by the emptiness probe.
//!
//! A process which dies without releasing leaves its field in the hash.
//! That namespace stays out of the pool, even once empty, until its field
//! is removed from `GVM.__GlobalDBIndex` (or namespace 0 is flushed).

use log::{debug, error, info, trace, warn};

use crate::errors::CacheError;
use crate::readers::KbStore;

/// The namespace holding the shared NVT cache. It is never claimed.
pub const RECORD_NAMESPACE: usize = 0;

/// The hash listing the claimed namespaces.
pub const GLOBAL_DB_INDEX: &str = "GVM.__GlobalDBIndex";

/// Hands out the namespaces of a knowledge base.
pub struct NamespaceAllocator<S: KbStore> {
    store: S,
}

impl<S: KbStore> NamespaceAllocator<S> {
    /// Creates a new NamespaceAllocator over a fresh connection.
    pub fn new(store: S) -> Self {
        NamespaceAllocator { store }
    }

    /// Reads how many namespaces the store has.
    pub fn discover_capacity(&mut self) -> Result<usize, CacheError> {
        trace!("Running NamespaceAllocator::discover_capacity()");
        let databases = self.store.config_get("databases").map_err(|e| {
            error!("Unable to read the number of databases: {}", e);
            CacheError::ConfigUnavailable(format!("CONFIG GET databases failed: {}", e))
        })?;

        let capacity = databases
            .as_deref()
            .and_then(|d| d.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                error!("Invalid number of databases: {:?}", databases);
                CacheError::ConfigUnavailable(format!("invalid databases setting {:?}", databases))
            })?;
        debug!("The knowledge base has {} namespaces", capacity);
        Ok(capacity)
    }

    /// Claims the first free namespace and binds the connection to it.
    pub fn claim(mut self) -> Result<BoundConnection<S>, CacheError> {
        trace!("Running NamespaceAllocator::claim()");
        let capacity = self.discover_capacity()?;

        for index in RECORD_NAMESPACE + 1..capacity {
            self.store.select(index)?;
            if self.store.dbsize()? > 0 {
                trace!("Namespace {} holds keys, skipping", index);
                continue;
            }

            self.store.select(RECORD_NAMESPACE)?;
            if !self.store.hsetnx(GLOBAL_DB_INDEX, &index.to_string(), "1")? {
                trace!("Namespace {} is registered by another process", index);
                continue;
            }

            // A previous owner may have left keys between the probe and the claim
            if let Err(e) = self.clear(index) {
                self.unregister(index);
                return Err(e);
            }
            info!("Claimed namespace {}", index);
            return Ok(BoundConnection {
                store: Some(self.store),
                index,
                released: false,
            });
        }

        error!("All the {} namespaces are in use", capacity);
        Err(CacheError::NamespacePoolExhausted(capacity))
    }

    fn clear(&mut self, index: usize) -> Result<(), CacheError> {
        self.store.select(index)?;
        self.store.flushdb()
    }

    /// Gives back a namespace registered by a claim which then failed.
    fn unregister(&mut self, index: usize) {
        let result = self
            .store
            .select(RECORD_NAMESPACE)
            .and_then(|_| self.store.hdel(GLOBAL_DB_INDEX, &index.to_string()));
        if let Err(e) = result {
            warn!("Unable to unregister namespace {}: {}", index, e);
        }
    }
}

/// A connection bound to a claimed namespace.
///
/// The namespace is given back by [`BoundConnection::release`], or when
/// the connection is dropped.
pub struct BoundConnection<S: KbStore> {
    /// Only taken by the methods consuming the connection
    store: Option<S>,
    index: usize,
    released: bool,
}

impl<S: KbStore> BoundConnection<S> {
    /// The claimed namespace.
    pub fn index(&self) -> usize {
        self.index
    }

    fn store(&mut self) -> &mut S {
        self.store
            .as_mut()
            .expect("the store is only taken when the connection is consumed")
    }

    /// The connection, switched to the NVT cache namespace.
    pub fn records(&mut self) -> Result<&mut S, CacheError> {
        let store = self.store();
        store.select(RECORD_NAMESPACE)?;
        Ok(store)
    }

    /// The connection, switched to the claimed namespace.
    pub fn scratch(&mut self) -> Result<&mut S, CacheError> {
        let index = self.index;
        let store = self.store();
        store.select(index)?;
        Ok(store)
    }

    /// Empties the claimed namespace and unregisters it.
    /// Releasing twice does nothing the second time.
    pub fn release(&mut self) -> Result<(), CacheError> {
        trace!("Running BoundConnection::release()");
        if self.released {
            debug!("Namespace {} already released", self.index);
            return Ok(());
        }
        let index = self.index;
        let store = self.store();
        store.select(index)?;
        store.flushdb()?;
        store.select(RECORD_NAMESPACE)?;
        store.hdel(GLOBAL_DB_INDEX, &index.to_string())?;
        self.released = true;
        info!("Released namespace {}", index);
        Ok(())
    }

    /// Releases the namespace and gives back the connection.
    pub fn into_inner(mut self) -> Result<S, CacheError> {
        self.release()?;
        Ok(self.detach())
    }

    /// Gives back the connection and leaves the namespace claimed.
    /// The namespace stays registered until someone releases it.
    pub fn detach(mut self) -> S {
        self.released = true;
        self.store
            .take()
            .expect("the store is only taken when the connection is consumed")
    }
}

impl<S: KbStore> Drop for BoundConnection<S> {
    fn drop(&mut self) {
        if !self.released && self.store.is_some() {
            if let Err(e) = self.release() {
                warn!("Unable to release namespace {}: {}", self.index, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::memory::MemoryKb;

    /// A store whose FLUSHDB fails the first `failures` times.
    struct FailingFlush {
        kb: MemoryKb,
        failures: usize,
    }

    impl KbStore for FailingFlush {
        fn select(&mut self, index: usize) -> Result<(), CacheError> {
            self.kb.select(index)
        }
        fn dbsize(&mut self) -> Result<usize, CacheError> {
            self.kb.dbsize()
        }
        fn keys(&mut self, pattern: &str) -> Result<Vec<String>, CacheError> {
            self.kb.keys(pattern)
        }
        fn config_get(&mut self, parameter: &str) -> Result<Option<String>, CacheError> {
            self.kb.config_get(parameter)
        }
        fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
            self.kb.get(key)
        }
        fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
            self.kb.lrange(key, start, stop)
        }
        fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>, CacheError> {
            self.kb.lindex(key, index)
        }
        fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, CacheError> {
            self.kb.hsetnx(key, field, value)
        }
        fn hdel(&mut self, key: &str, field: &str) -> Result<bool, CacheError> {
            self.kb.hdel(key, field)
        }
        fn flushdb(&mut self) -> Result<(), CacheError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(CacheError::StoreUnavailable("timed out".to_string()));
            }
            self.kb.flushdb()
        }
    }

    #[test]
    fn failed_claim_leaves_the_namespace_free() {
        let mut store = FailingFlush {
            kb: MemoryKb::new(2),
            failures: 1,
        };
        let result = NamespaceAllocator::new(&mut store).claim();
        assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
        drop(result);
        assert_eq!(store.kb.len_of(RECORD_NAMESPACE), 0);

        let bound = NamespaceAllocator::new(&mut store).claim().unwrap();
        assert_eq!(bound.index(), 1);
    }

    /// A store whose cache namespace is loaded, like after an import.
    fn loaded_kb(capacity: usize) -> MemoryKb {
        let mut kb = MemoryKb::new(capacity);
        kb.set_string(RECORD_NAMESPACE, "nvticache", "201807101012");
        kb
    }

    #[test]
    fn capacity_comes_from_the_store() {
        let mut allocator = NamespaceAllocator::new(MemoryKb::new(16));
        assert_eq!(allocator.discover_capacity().unwrap(), 16);
    }

    #[test]
    fn unreadable_capacity_is_config_unavailable() {
        let mut allocator = NamespaceAllocator::new(MemoryKb::new(16).without_config());
        assert!(matches!(
            allocator.discover_capacity(),
            Err(CacheError::ConfigUnavailable(_))
        ));
    }

    #[test]
    fn namespace_zero_is_never_claimed() {
        let bound = NamespaceAllocator::new(MemoryKb::new(4)).claim().unwrap();
        assert_eq!(bound.index(), 1);
    }

    #[test]
    fn occupied_namespaces_are_skipped() {
        let mut kb = loaded_kb(4);
        kb.set_string(1, "internal/scan_id", "abc");
        let bound = NamespaceAllocator::new(kb).claim().unwrap();
        assert_eq!(bound.index(), 2);
    }

    #[test]
    fn pool_is_exhausted_after_capacity_minus_one_claims() {
        let capacity = 5;
        let mut kb = loaded_kb(capacity);
        let mut claimed = Vec::new();
        for _ in 1..capacity {
            let bound = NamespaceAllocator::new(kb).claim().unwrap();
            claimed.push(bound.index());
            // Keep the claim registered, as a still running process would
            kb = bound.detach();
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed, vec![1, 2, 3, 4]);
        assert!(matches!(
            NamespaceAllocator::new(kb).claim(),
            Err(CacheError::NamespacePoolExhausted(5))
        ));
    }

    #[test]
    fn release_clears_and_unregisters() {
        let mut bound = NamespaceAllocator::new(loaded_kb(3)).claim().unwrap();
        let index = bound.index();
        bound
            .scratch()
            .unwrap()
            .hsetnx("internal/results", "1", "x")
            .unwrap();
        bound.release().unwrap();
        bound.release().unwrap();
        let kb = bound.into_inner().unwrap();
        assert_eq!(kb.len_of(index), 0);
        // Only the cache version is left in namespace 0
        assert_eq!(kb.len_of(RECORD_NAMESPACE), 1);
    }

    #[test]
    fn released_namespace_can_be_claimed_again() {
        let bound = NamespaceAllocator::new(loaded_kb(3)).claim().unwrap();
        assert_eq!(bound.index(), 1);
        let kb = bound.into_inner().unwrap();
        let bound = NamespaceAllocator::new(kb).claim().unwrap();
        assert_eq!(bound.index(), 1);
    }

    #[test]
    fn records_are_read_from_namespace_zero() {
        let mut bound = NamespaceAllocator::new(loaded_kb(3)).claim().unwrap();
        assert_eq!(
            bound.records().unwrap().get("nvticache").unwrap(),
            Some("201807101012".to_string())
        );
    }
}
