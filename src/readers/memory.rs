//! This module declares an in-memory knowledge base.
//! It behaves like a redis server for the commands of [`KbStore`], and
//! lets a caller seed the namespaces the way the import pipeline would.

use std::collections::HashMap;

use log::trace;

use super::KbStore;
use crate::errors::CacheError;

/// A value held by the in-memory store.
#[derive(Clone, Debug, PartialEq)]
enum Value {
    Str(String),
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

/// An in-memory knowledge base.
#[derive(Debug)]
pub struct MemoryKb {
    /// One map of keys per namespace
    namespaces: Vec<HashMap<String, Value>>,
    /// The namespace commands run against
    current: usize,
    /// Whether CONFIG GET answers
    config_available: bool,
}

impl MemoryKb {
    /// Creates a store with `capacity` namespaces.
    pub fn new(capacity: usize) -> Self {
        MemoryKb {
            namespaces: vec![HashMap::new(); capacity],
            current: 0,
            config_available: true,
        }
    }

    /// Makes CONFIG GET fail, like a server with the command renamed.
    pub fn without_config(mut self) -> Self {
        self.config_available = false;
        self
    }

    /// The namespace commands currently run against.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Stores a list in the given namespace.
    pub fn push_list(&mut self, namespace: usize, key: &str, values: &[&str]) {
        self.namespaces[namespace].insert(
            key.to_string(),
            Value::List(values.iter().map(|v| v.to_string()).collect()),
        );
    }

    /// Stores a string in the given namespace.
    pub fn set_string(&mut self, namespace: usize, key: &str, value: &str) {
        self.namespaces[namespace].insert(key.to_string(), Value::Str(value.to_string()));
    }

    /// Number of keys in the given namespace.
    pub fn len_of(&self, namespace: usize) -> usize {
        self.namespaces[namespace].len()
    }

    fn namespace(&mut self) -> &mut HashMap<String, Value> {
        &mut self.namespaces[self.current]
    }

    fn list(&mut self, key: &str) -> Result<Vec<String>, CacheError> {
        match self.namespace().get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(values)) => Ok(values.clone()),
            Some(_) => Err(wrong_type()),
        }
    }
}

fn wrong_type() -> CacheError {
    CacheError::UnexpectedReply(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

/// Resolves a redis list index, negative ones counting from the end.
fn resolve(index: i64, len: usize) -> i64 {
    if index < 0 {
        len as i64 + index
    } else {
        index
    }
}

/// Supports the patterns this crate sends: `*`, `prefix*` and exact keys.
fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl KbStore for MemoryKb {
    fn select(&mut self, index: usize) -> Result<(), CacheError> {
        trace!("MemoryKb: SELECT {}", index);
        if index >= self.namespaces.len() {
            return Err(CacheError::UnexpectedReply(
                "ERR DB index is out of range".to_string(),
            ));
        }
        self.current = index;
        Ok(())
    }

    fn dbsize(&mut self) -> Result<usize, CacheError> {
        Ok(self.namespace().len())
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .namespace()
            .keys()
            .filter(|k| matches(pattern, k))
            .cloned()
            .collect())
    }

    fn config_get(&mut self, parameter: &str) -> Result<Option<String>, CacheError> {
        if !self.config_available {
            return Err(CacheError::UnexpectedReply(
                "ERR unknown command 'CONFIG'".to_string(),
            ));
        }
        match parameter {
            "databases" => Ok(Some(self.namespaces.len().to_string())),
            _ => Ok(None),
        }
    }

    fn get(&mut self, key: &str) -> Result<Option<String>, CacheError> {
        match self.namespace().get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type()),
        }
    }

    fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
        let values = self.list(key)?;
        let start = resolve(start, values.len()).max(0);
        let stop = resolve(stop, values.len()).min(values.len() as i64 - 1);
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(values[start as usize..=stop as usize].to_vec())
    }

    fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>, CacheError> {
        let values = self.list(key)?;
        let index = resolve(index, values.len());
        if index < 0 {
            return Ok(None);
        }
        Ok(values.get(index as usize).cloned())
    }

    fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<bool, CacheError> {
        let entry = self
            .namespace()
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry {
            Value::Hash(hash) => {
                if hash.contains_key(field) {
                    Ok(false)
                } else {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(true)
                }
            }
            _ => Err(wrong_type()),
        }
    }

    fn hdel(&mut self, key: &str, field: &str) -> Result<bool, CacheError> {
        let namespace = self.namespace();
        let (removed, now_empty) = match namespace.get_mut(key) {
            None => return Ok(false),
            Some(Value::Hash(hash)) => (hash.remove(field).is_some(), hash.is_empty()),
            Some(_) => return Err(wrong_type()),
        };
        // redis drops a hash once its last field is gone
        if now_empty {
            namespace.remove(key);
        }
        Ok(removed)
    }

    fn flushdb(&mut self) -> Result<(), CacheError> {
        self.namespace().clear();
        Ok(())
    }
}
