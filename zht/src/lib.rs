//! A partitioned, eventually-consistent key-value node built on the
//! `monocoque` ZeroMQ-compatible fabric.
//!
//! Keys are routed to one of `16^P` buckets by the first `P` hex digits of
//! their SHA-1 digest (`P = 1` by default). Writes carry an external
//! timestamp and converge under last-writer-wins. Nodes discover peers
//! explicitly (`CONNECT`) or transitively (an adopted peer is announced over
//! the publish channel so others dial it too), then replay `UPDATE` frames
//! to stay in sync.

pub mod bucket;
pub mod control;
pub mod entry;
pub mod error;
pub mod fabric;
pub mod hash;
pub mod node;
pub mod peer;
pub mod table;
pub mod wire;

pub use error::{NodeError, StoreError};
pub use node::{Node, NodeConfig, NodeShared};
pub use peer::Peer;
pub use table::Table;
