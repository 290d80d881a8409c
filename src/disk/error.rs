use std::io;

use snafu::Snafu;

/// Errors surfaced by [`super::Cache`] operations.
///
/// Corrupt-journal conditions are recovered internally during [`super::Cache::open`]
/// and never reach a caller as this error; everything else propagates as documented
/// on the operation that produced it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// A public operation was attempted after [`super::Cache::close`].
    #[snafu(display("cache is closed"))]
    Closed,

    /// A key did not match `[a-z0-9_-]{1,120}`.
    #[snafu(display("invalid key '{}': must match [a-z0-9_-]{{1,120}}", key))]
    InvalidKey { key: String },

    /// A filesystem operation (rename, delete, write, read) failed.
    #[snafu(display("I/O error: {}", source))]
    Io { source: io::Error },

    /// `commit` was called on a newly created entry missing a written index, or
    /// was called twice on the same editor.
    #[snafu(display("illegal state: {}", reason))]
    IllegalState { reason: String },

    /// An editor method was called after the editor already committed or aborted.
    #[snafu(display("editor for '{}' is no longer active", key))]
    NotAnEditor { key: String },

    /// The on-disk journal was malformed beyond what recovery could repair in place.
    #[snafu(display("corrupt journal: {}", reason))]
    CorruptJournal { reason: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;
