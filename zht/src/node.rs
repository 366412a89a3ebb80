//! The node runtime: owns the table and peer set, dispatches incoming
//! frames, and drives the four concurrent loops (reply, subscribe,
//! control, heartbeat) described in the specification's concurrency model.
//!
//! Bucket ownership between peers is never rebalanced in this design: when
//! a peer is adopted whose owned prefixes overlap ours (the default, since
//! every node owns the full `16^P` space), writes to those prefixes land on
//! both nodes and converge via `UPDATE` flooding. That's intentionally
//! wasteful rather than broken — see the specification's design notes.

use crate::error::NodeError;
use crate::fabric::{Publisher, ReqClient, RepConn, RepListener};
use crate::peer::Peer;
use crate::table::{Table, DEFAULT_PREFIX_LENGTH};
use crate::wire::{PublishMessage, ReplyRequest, ReplyResponse};
use async_lock::{Mutex as AsyncMutex, Semaphore};
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Constructor parameters for a [`Node`]. The external configuration layer
/// (file + command-line merging, section `zht`) is out of scope for this
/// crate — callers assemble a `NodeConfig` however they like and hand it to
/// [`Node::bind`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub identity: String,
    pub reply_addr: String,
    pub publish_addr: String,
    pub control_addr: String,
    pub pool_size: usize,
    pub prefix_length: usize,
}

impl NodeConfig {
    /// Builds a config with the default control address
    /// (`ipc://.zhtnode-control-<identity>`), pool size (200), and prefix
    /// length (1).
    pub fn new(identity: impl Into<String>, reply_addr: impl Into<String>, publish_addr: impl Into<String>) -> Self {
        let identity = identity.into();
        let control_addr = format!("ipc://.zhtnode-control-{identity}");
        Self {
            identity,
            reply_addr: reply_addr.into(),
            publish_addr: publish_addr.into(),
            control_addr,
            pool_size: 200,
            prefix_length: DEFAULT_PREFIX_LENGTH,
        }
    }
}

/// State shared by every task spawned for a node. `Node` is the owning
/// handle; `Peer`'s init-sync task holds only a [`std::sync::Weak`] to this
/// so the node/peer reference never becomes an ownership cycle.
pub struct NodeShared {
    identity: String,
    reply_addr: String,
    publish_addr: String,
    table: Mutex<Table>,
    peers: Mutex<HashMap<String, Arc<Peer>>>,
    connected_addrs: Mutex<HashSet<String>>,
    subscribed_pub_addrs: Mutex<HashSet<String>>,
    publisher: AsyncMutex<Publisher>,
    task_pool: Semaphore,
}

impl NodeShared {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn reply_addr(&self) -> &str {
        &self.reply_addr
    }

    pub fn publish_addr(&self) -> &str {
        &self.publish_addr
    }

    pub(crate) fn table_owned_buckets(&self) -> Vec<String> {
        self.table.lock().owned_buckets()
    }

    pub(crate) fn table_local_timestamp(&self, key: &Bytes) -> Option<f64> {
        self.table.lock().get(key).ok().and_then(|e| e.timestamp())
    }

    pub(crate) fn table_put_with_ts(&self, key: Bytes, value: Bytes, ts: f64) -> bool {
        self.table
            .lock()
            .put_with_ts(key, value, ts)
            .unwrap_or(false)
    }

    /// Broadcasts `message` to every subscriber of this node's publish
    /// endpoint.
    pub(crate) async fn publish(&self, message: PublishMessage) {
        let mut publisher = self.publisher.lock().await;
        if let Err(err) = publisher.send(message.encode()).await {
            warn!(node = %self.identity, error = %err, "publish failed");
        }
    }

    fn peer_snapshot(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().values().cloned().collect()
    }

    /// Remote get: forwards to the first peer whose learned owned buckets
    /// contain a prefix of `key`'s full hash.
    pub(crate) async fn rget(&self, key: &Bytes) -> Option<Bytes> {
        let hash = crate::hash::sha1_hex(key);
        for peer in self.peer_snapshot() {
            let owns_it = peer
                .owned_buckets()
                .iter()
                .any(|prefix| hash.starts_with(prefix.as_str()));
            if !owns_it {
                continue;
            }
            let Ok(reply) = peer.request(vec![Bytes::from_static(b"GET"), key.clone()]).await else {
                continue;
            };
            if let Some((value, _ts)) = ReplyResponse::decode_get(&reply) {
                return Some(value);
            }
        }
        None
    }

    /// Local get, falling back to [`Self::rget`] when the local bucket
    /// isn't owned (never happens at the default topology, since every
    /// bucket starts owned, but the fallback is part of the contract).
    pub(crate) async fn local_get(&self, key: &Bytes) -> Option<Bytes> {
        let local = { self.table.lock().get(key).map(|e| e.value().clone()) };
        match local {
            Ok(value) => Some(value),
            Err(crate::error::StoreError::UncachedLookup) => self.rget(key).await,
            Err(crate::error::StoreError::KeyMissing) => None,
            Err(crate::error::StoreError::UnownedWrite) => unreachable!("get never writes"),
        }
    }

    /// Local put with the wall-clock timestamp; publishes an `UPDATE` if it
    /// mutated the store.
    pub(crate) async fn local_put(&self, key: Bytes, value: Bytes) {
        let mutated = {
            let mut table = self.table.lock();
            table.put(key.clone(), value.clone()).unwrap_or(false)
        };
        if mutated {
            let entry_ts = { self.table.lock().get(&key).ok().and_then(|e| e.timestamp()) };
            if let Some(ts) = entry_ts {
                self.publish(PublishMessage::Update {
                    hash: crate::hash::sha1_hex(&key),
                    key,
                    value,
                    timestamp: ts,
                })
                .await;
            }
        }
    }

    /// `(identity, reply_addr)` for every installed peer, for the `PEERS`
    /// control command.
    pub(crate) fn peer_identities_and_addrs(&self) -> Vec<(String, String)> {
        self.peers
            .lock()
            .values()
            .map(|p| (p.identity().to_string(), p.reply_addr().to_string()))
            .collect()
    }

    /// Idempotently dials `reply_addr`, performs the `PEER` handshake, and
    /// installs the resulting peer. Silently returns if `reply_addr` was
    /// already dialed, or if the remote rejects the handshake (returns our
    /// own identity, or an identity we already know) — per the specification,
    /// handshake rejection is a silent, idempotent outcome, not a warning.
    pub(crate) async fn connect(self: &Arc<Self>, reply_addr: &str) {
        match self.try_connect(reply_addr).await {
            Ok(()) => {}
            Err(NodeError::PeerHandshakeRejected(id)) => {
                debug!(addr = reply_addr, rejected_id = %id, "peer handshake rejected (self or already known)");
            }
            Err(err) => {
                warn!(addr = reply_addr, error = %err, "connect failed");
            }
        }
    }

    async fn try_connect(self: &Arc<Self>, reply_addr: &str) -> Result<(), NodeError> {
        {
            let mut connected = self.connected_addrs.lock();
            if !connected.insert(reply_addr.to_string()) {
                return Ok(());
            }
        }

        let mut client = ReqClient::connect(reply_addr).await?;

        let handshake = vec![
            Bytes::from_static(b"PEER"),
            Bytes::from(self.identity.clone()),
            Bytes::from(self.reply_addr.clone()),
            Bytes::from(self.publish_addr.clone()),
        ];
        let reply = client
            .request(handshake)
            .await?
            .ok_or(NodeError::PeerDisconnected)?;
        let (remote_id, remote_publish_addr) = ReplyResponse::decode_peer(&reply)
            .ok_or_else(|| NodeError::MalformedReply("PEER handshake".to_string()))?;

        if remote_id == self.identity || self.peers.lock().contains_key(&remote_id) {
            return Err(NodeError::PeerHandshakeRejected(remote_id));
        }

        self.adopt_peer(remote_id, reply_addr.to_string(), remote_publish_addr, client)
            .await;
        Ok(())
    }

    /// Subscribes, installs the `Peer`, spawns its init-sync task, and
    /// advertises the new peer so others can discover it transitively.
    async fn adopt_peer(self: &Arc<Self>, id: String, reply_addr: String, publish_addr: String, req_client: ReqClient) {
        {
            let mut subscribed = self.subscribed_pub_addrs.lock();
            if subscribed.insert(publish_addr.clone()) {
                let node = Arc::clone(self);
                let addr = publish_addr.clone();
                compio::runtime::spawn(async move {
                    node.run_subscriber(&addr).await;
                })
                .detach();
            }
        }

        let peer = Arc::new(Peer::new(id.clone(), reply_addr.clone(), publish_addr, req_client));
        self.peers.lock().insert(id.clone(), Arc::clone(&peer));

        let weak_self = Arc::downgrade(self);
        compio::runtime::spawn(async move {
            peer.init_state(weak_self).await;
        })
        .detach();

        self.publish(PublishMessage::Peer { id, reply_addr }).await;
    }

    async fn run_subscriber(self: Arc<Self>, addr: &str) {
        let mut subscriber = match crate::fabric::Subscriber::connect(addr).await {
            Ok(sub) => sub,
            Err(err) => {
                warn!(addr, error = %err, "subscribe connect failed");
                return;
            }
        };
        loop {
            match subscriber.recv().await {
                Ok(Some(frames)) => {
                    let node = Arc::clone(&self);
                    self.spawn_bounded(async move {
                        node.handle_publish_frame(frames).await;
                    })
                    .await;
                }
                Ok(None) | Err(_) => return,
            }
        }
    }

    async fn handle_publish_frame(self: Arc<Self>, frames: Vec<Bytes>) {
        match PublishMessage::decode(&frames) {
            Some(PublishMessage::Update { hash: _, key, value, timestamp }) => {
                let mutated = self.table_put_with_ts(key.clone(), value.clone(), timestamp);
                if mutated {
                    self.publish(PublishMessage::Update {
                        hash: crate::hash::sha1_hex(&key),
                        key,
                        value,
                        timestamp,
                    })
                    .await;
                }
            }
            Some(PublishMessage::Peer { id, reply_addr }) => {
                if id != self.identity && !self.peers.lock().contains_key(&id) {
                    self.connect(&reply_addr).await;
                }
            }
            Some(PublishMessage::Heartbeat { id }) => {
                info!(node = %self.identity, from = %id, "heartbeat");
            }
            None => {}
        }
    }

    async fn handle_reply_conn(self: Arc<Self>, mut conn: RepConn) {
        loop {
            let Some(frames) = conn.recv().await else { return };
            let node = Arc::clone(&self);
            let response = node.handle_reply_request(frames).await;
            if conn.send(response).await.is_err() {
                return;
            }
        }
    }

    async fn handle_reply_request(self: Arc<Self>, frames: Vec<Bytes>) -> Vec<Bytes> {
        let response = match ReplyRequest::decode(&frames) {
            ReplyRequest::Peer {
                id,
                reply_addr,
                publish_addr,
            } => {
                let response = ReplyResponse::Peer {
                    id: self.identity.clone(),
                    publish_addr: self.publish_addr.clone(),
                };
                if id != self.identity && !self.peers.lock().contains_key(&id) {
                    match ReqClient::connect(&reply_addr).await {
                        Ok(client) => self.adopt_peer(id, reply_addr, publish_addr, client).await,
                        Err(err) => {
                            let err = NodeError::from(err);
                            warn!(addr = reply_addr, error = %err, "dial-back to new peer failed");
                        }
                    }
                }
                response
            }
            ReplyRequest::Peers => {
                ReplyResponse::Peers(self.peer_identities_and_addrs().into_iter().collect())
            }
            ReplyRequest::Buckets => ReplyResponse::Buckets(self.table_owned_buckets()),
            ReplyRequest::Keys { prefix } => {
                let entries = self.table.lock().keys_of(&prefix);
                ReplyResponse::Keys { prefix, entries }
            }
            ReplyRequest::Get { key } => match self.table.lock().get(&key) {
                Ok(entry) => ReplyResponse::Get {
                    key: key.clone(),
                    value: entry.value().clone(),
                    timestamp: entry.timestamp().unwrap_or(0.0),
                },
                Err(_) => ReplyResponse::GetMiss { key },
            },
            ReplyRequest::Other(frames) => ReplyResponse::Echo(frames),
        };
        response.encode()
    }

    /// Runs `fut` under the node's bounded task-pool permit, limiting how
    /// many reply/subscribe handlers run concurrently.
    async fn spawn_bounded<F>(self: &Arc<Self>, fut: F)
    where
        F: std::future::Future<Output = ()> + 'static,
    {
        let node = Arc::clone(self);
        compio::runtime::spawn(async move {
            let _permit = node.task_pool.acquire().await;
            fut.await;
        })
        .detach();
    }
}

/// Owning handle to a node's shared state and its listening sockets.
pub struct Node {
    shared: Arc<NodeShared>,
    control_addr: String,
}

impl Node {
    /// Binds the reply and publish endpoints. Does not yet accept
    /// connections or run any loop — call [`Node::start`] for that.
    pub async fn bind(config: NodeConfig) -> std::io::Result<Self> {
        let (publisher, resolved_publish_addr) = Publisher::bind(&config.publish_addr).await?;
        let publish_addr = if config.publish_addr.starts_with("tcp://") {
            config.publish_addr.clone()
        } else {
            resolved_publish_addr
        };

        let shared = Arc::new(NodeShared {
            identity: config.identity.clone(),
            reply_addr: config.reply_addr.clone(),
            publish_addr,
            table: Mutex::new(Table::new(config.prefix_length)),
            peers: Mutex::new(HashMap::new()),
            connected_addrs: Mutex::new(HashSet::new()),
            subscribed_pub_addrs: Mutex::new(HashSet::new()),
            publisher: AsyncMutex::new(publisher),
            task_pool: Semaphore::new(config.pool_size),
        });

        Ok(Self {
            shared,
            control_addr: config.control_addr,
        })
    }

    pub fn shared(&self) -> Arc<NodeShared> {
        Arc::clone(&self.shared)
    }

    /// Spawns the reply loop, subscribe-accept loop (for future peers'
    /// publish endpoints), control loop, and heartbeat timer. Returns once
    /// all four are running; they keep running on the compio runtime after
    /// this returns.
    pub async fn start(&self) -> std::io::Result<()> {
        let reply_listener = RepListener::bind(&self.shared.reply_addr).await?;
        let reply_node = self.shared();
        compio::runtime::spawn(async move {
            loop {
                match reply_listener.accept().await {
                    Ok(conn) => {
                        let node = Arc::clone(&reply_node);
                        node.spawn_bounded(async move {
                            node.handle_reply_conn(conn).await;
                        })
                        .await;
                    }
                    Err(err) => {
                        warn!(error = %err, "reply accept failed");
                        return;
                    }
                }
            }
        })
        .detach();

        let publisher_node = self.shared();
        compio::runtime::spawn(async move {
            loop {
                let accepted = {
                    let mut publisher = publisher_node.publisher.lock().await;
                    publisher.accept_one().await
                };
                if accepted.is_err() {
                    return;
                }
            }
        })
        .detach();

        let heartbeat_node = self.shared();
        compio::runtime::spawn(async move {
            loop {
                compio::time::sleep(HEARTBEAT_INTERVAL).await;
                heartbeat_node
                    .publish(PublishMessage::Heartbeat {
                        id: heartbeat_node.identity.clone(),
                    })
                    .await;
            }
        })
        .detach();

        crate::control::spawn_control_loop(self.shared(), self.control_addr.clone());

        Ok(())
    }

    /// Dials an initial peer, equivalent to a `CONNECT` control command.
    pub async fn connect(&self, reply_addr: &str) {
        self.shared.connect(reply_addr).await;
    }
}
