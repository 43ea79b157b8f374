//! This module declares the knowledge base readers.
//! A reader gives access to the redis store holding the NVT cache. The
//! [`KbStore`] trait lists the commands this crate needs, so the
//! allocator and the decoder work the same on a real connection
//! ([`resp::RedisKb`]) and on the in-memory double ([`memory::MemoryKb`]).

pub mod memory;
pub mod resp;

use crate::errors::CacheError;

/// A common interface between all knowledge base connections.
///
/// Commands run against the namespace last passed to [`KbStore::select`].
pub trait KbStore {
    /// Switches the connection to the namespace `index`.
    fn select(&mut self, index: usize) -> Result<(), CacheError>;

    /// Returns the number of keys in the current namespace.
    fn dbsize(&mut self) -> Result<usize, CacheError>;

    /// Lists the keys matching a glob pattern.
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Reads a store configuration parameter.
    fn config_get(&mut self, parameter: &str) -> Result<Option<String>, CacheError>;

    /// Reads a string value.
    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError>;

    /// Reads the elements `start..=stop` of a list. Negative indices
    /// count from the end. A missing key is an empty list.
    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError>;

    /// Reads one element of a list.
    fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>, CacheError>;

    /// Sets a hash field only if it does not exist yet.
    /// Returns true if the field was set.
    fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, CacheError>;

    /// Removes a hash field. Returns true if it existed.
    fn hdel(&mut self, key: &str, field: &str) -> Result<bool, CacheError>;

    /// Removes every key of the current namespace.
    fn flushdb(&mut self) -> Result<(), CacheError>;
}

/// A borrowed connection is a connection too, so a caller can lend one
/// and keep it afterwards.
impl<S: KbStore + ?Sized> KbStore for &mut S {
    fn select(&mut self, index: usize) -> Result<(), CacheError> {
        (**self).select(index)
    }

    fn dbsize(&mut self) -> Result<usize, CacheError> {
        (**self).dbsize()
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, CacheError> {
        (**self).keys(pattern)
    }

    fn config_get(&mut self, parameter: &str) -> Result<Option<String>, CacheError> {
        (**self).config_get(parameter)
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }

    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
        (**self).lrange(key, start, stop)
    }

    fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>, CacheError> {
        (**self).lindex(key, index)
    }

    fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, CacheError> {
        (**self).hsetnx(key, field, value)
    }

    fn hdel(&mut self, key: &str, field: &str) -> Result<bool, CacheError> {
        (**self).hdel(key, field)
    }

    fn flushdb(&mut self) -> Result<(), CacheError> {
        (**self).flushdb()
    }
}
