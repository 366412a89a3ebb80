//! Error types for the store and node layers.

use thiserror::Error;

/// Errors raised by [`crate::bucket::Bucket`] and [`crate::table::Table`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Owned bucket does not contain the requested key.
    #[error("key missing")]
    KeyMissing,

    /// Unowned bucket was read for a key that isn't locally cached.
    #[error("uncached lookup")]
    UncachedLookup,

    /// A write was attempted against an unowned bucket.
    #[error("unowned write")]
    UnownedWrite,
}

/// Errors raised by [`crate::node::Node`] operations.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Underlying store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O failure establishing or using a socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer rejected the handshake (returned our own identity or an
    /// identity we already know about).
    #[error("peer handshake rejected for {0}")]
    PeerHandshakeRejected(String),

    /// A reply frame did not match the shape the protocol expects.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The peer closed the connection or timed out.
    #[error("peer disconnected")]
    PeerDisconnected,
}
