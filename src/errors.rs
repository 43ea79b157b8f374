//! Errors raised while talking to the knowledge base or decoding records.

use thiserror::Error;

/// Every failure this crate can report.
///
/// `MalformedPreference` and `MalformedTag` are produced per entry by the
/// decoding helpers. Record-level operations log and skip them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    /// The scanner settings or the store configuration could not be read.
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),
    /// Every namespace above the shared one is already in use.
    #[error("no free namespace among the {0} available")]
    NamespacePoolExhausted(usize),
    /// Connection failure or timeout while talking to the store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// The store answered, but not with what the command expects.
    #[error("unexpected reply from the store: {0}")]
    UnexpectedReply(String),
    /// Nothing is cached for this OID.
    #[error("no record cached for {0}")]
    RecordNotFound(String),
    /// A preference entry without its three parts.
    #[error("malformed preference {0:?}")]
    MalformedPreference(String),
    /// A tag segment without a '=' separator.
    #[error("malformed tag segment {0:?}")]
    MalformedTag(String),
}
