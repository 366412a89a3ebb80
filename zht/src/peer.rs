//! Remote-node handles and the initial-sync state machine.

use crate::error::NodeError;
use crate::fabric::ReqClient;
use crate::node::NodeShared;
use crate::wire::{PublishMessage, ReplyResponse};
use async_lock::Mutex as AsyncMutex;
use bytes::Bytes;
use hashbrown::HashSet;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use tracing::{debug, warn};

/// A handle to a remote node, reached over its reply endpoint.
///
/// Peers are never destroyed once installed — see the module docs on
/// [`crate::node`] for why ownership between peers is allowed to overlap
/// rather than be rebalanced away.
pub struct Peer {
    identity: String,
    reply_addr: String,
    publish_addr: String,
    /// Serializes requests on the peer's dedicated channel: REQ enforces
    /// strict send-then-recv alternation, and only one request may be
    /// outstanding at a time.
    req_client: AsyncMutex<ReqClient>,
    owned_buckets: RwLock<HashSet<String>>,
    initialized: AtomicBool,
}

impl Peer {
    pub(crate) fn new(identity: String, reply_addr: String, publish_addr: String, req_client: ReqClient) -> Self {
        Self {
            identity,
            reply_addr,
            publish_addr,
            req_client: AsyncMutex::new(req_client),
            owned_buckets: RwLock::new(HashSet::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn reply_addr(&self) -> &str {
        &self.reply_addr
    }

    pub fn publish_addr(&self) -> &str {
        &self.publish_addr
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Prefixes this peer is known to own, learned during initial sync.
    pub fn owned_buckets(&self) -> HashSet<String> {
        self.owned_buckets.read().clone()
    }

    /// Sends `frames` and awaits the reply, serialized against any other
    /// in-flight request to this peer.
    pub async fn request(&self, frames: Vec<Bytes>) -> Result<Vec<Bytes>, NodeError> {
        let mut client = self.req_client.lock().await;
        match client.request(frames).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                warn!(peer = %self.identity, "peer disconnected");
                Err(NodeError::PeerDisconnected)
            }
            Err(err) => {
                warn!(peer = %self.identity, error = %err, "peer request failed");
                Err(NodeError::from(err))
            }
        }
    }

    /// Runs the initial-sync dialogue: discover the peer's owned buckets,
    /// diff keys in the owned prefixes we share, and pull anything we're
    /// missing or stale on.
    ///
    /// `node` is a weak handle — the peer must not keep the node alive, or
    /// the two would form an ownership cycle (the node's peer map already
    /// owns this `Peer` strongly).
    pub(crate) async fn init_state(self: std::sync::Arc<Self>, node: Weak<NodeShared>) {
        let Some(node) = node.upgrade() else { return };

        // Step 1: PEERS, logged only — discovery happens transitively via
        // the publish channel, not by dialing what this reply returns.
        if let Ok(reply) = self.request(vec![Bytes::from_static(b"PEERS")]).await {
            if let Some(peers) = ReplyResponse::decode_peers(&reply) {
                debug!(peer = %self.identity, ?peers, "peer's known peers");
            }
        }

        // Step 2: BUCKETS.
        let Ok(reply) = self.request(vec![Bytes::from_static(b"BUCKETS")]).await else {
            return;
        };
        let Some(remote_buckets) = ReplyResponse::decode_buckets(&reply) else {
            return;
        };
        *self.owned_buckets.write() = remote_buckets.iter().cloned().collect();

        let local_owned: HashSet<String> = node.table_owned_buckets().into_iter().collect();

        // Step 3 & 4: for every prefix we both own, diff key timestamps and
        // pull anything absent locally or staler than the peer's copy.
        for prefix in remote_buckets.iter().filter(|p| local_owned.contains(*p)) {
            let Ok(reply) = self
                .request(vec![Bytes::from_static(b"KEYS"), Bytes::from(prefix.clone())])
                .await
            else {
                continue;
            };
            let Some(remote_keys) = ReplyResponse::decode_keys(&reply) else {
                continue;
            };

            for (key, remote_ts) in remote_keys {
                let needs_fetch = match node.table_local_timestamp(&key) {
                    Some(local_ts) => local_ts < remote_ts,
                    None => true,
                };
                if !needs_fetch {
                    continue;
                }
                let Ok(get_reply) = self.request(vec![Bytes::from_static(b"GET"), key.clone()]).await else {
                    continue;
                };
                let Some((value, ts)) = ReplyResponse::decode_get(&get_reply) else {
                    continue;
                };
                if node.table_put_with_ts(key.clone(), value.clone(), ts) {
                    node.publish(PublishMessage::Update {
                        hash: crate::hash::sha1_hex(&key),
                        key,
                        value,
                        timestamp: ts,
                    })
                    .await;
                }
            }
        }

        self.initialized.store(true, Ordering::Release);
        debug!(peer = %self.identity, "initial sync complete");
    }
}
