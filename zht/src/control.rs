//! The local control endpoint: the one-operator-at-a-time command surface
//! used by the interactive shell binary.
//!
//! Unlike the reply endpoint (peer-to-peer, TCP or IPC, many simultaneous
//! callers), the control endpoint is always IPC and is meant for a single
//! local client at a time — but nothing here enforces that, it's simply how
//! the shell binary happens to use it.

use crate::fabric::{RepConn, RepListener};
use crate::node::NodeShared;
use crate::wire::ControlRequest;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};

/// Spawns the accept loop for the control endpoint. Runs until the bind
/// fails or the process exits via `EOF`.
pub(crate) fn spawn_control_loop(node: Arc<NodeShared>, control_addr: String) {
    compio::runtime::spawn(async move {
        let listener = match RepListener::bind(&control_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(addr = %control_addr, error = %err, "control endpoint bind failed");
                return;
            }
        };
        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let node = Arc::clone(&node);
                    compio::runtime::spawn(async move {
                        handle_control_conn(node, conn).await;
                    })
                    .detach();
                }
                Err(err) => {
                    warn!(error = %err, "control accept failed");
                    return;
                }
            }
        }
    })
    .detach();
}

async fn handle_control_conn(node: Arc<NodeShared>, mut conn: RepConn) {
    loop {
        let Some(frames) = conn.recv().await else { return };
        let request = ControlRequest::decode(&frames);
        let is_eof = matches!(request, ControlRequest::Eof);
        let response = dispatch(&node, request).await;
        if conn.send(response).await.is_err() {
            return;
        }
        if is_eof {
            // The specification treats shutdown as abrupt: pending publishes
            // are not flushed, outstanding peer requests are dropped in
            // place. A graceful drain isn't part of the contract.
            info!(node = %node.identity(), "EOF received, shutting down");
            std::process::exit(0);
        }
    }
}

async fn dispatch(node: &Arc<NodeShared>, request: ControlRequest) -> Vec<Bytes> {
    match request {
        ControlRequest::Eof => vec![Bytes::from_static(b"OK")],
        ControlRequest::Connect(addrs) => {
            for addr in addrs {
                node.connect(&addr).await;
            }
            vec![Bytes::from_static(b"OK")]
        }
        ControlRequest::Get(keys) => {
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                match node.local_get(&key).await {
                    Some(value) => out.push(value),
                    None => out.push(Bytes::from_static(b"KeyError")),
                }
            }
            out
        }
        ControlRequest::Rget(keys) => {
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                out.push(node.rget(&key).await.unwrap_or_default());
            }
            out
        }
        ControlRequest::Put { key, value } => {
            node.local_put(key.clone(), value.clone()).await;
            vec![Bytes::from_static(b"OK"), key, value]
        }
        ControlRequest::Peers => {
            let mut out = vec![Bytes::from_static(b"PEERS")];
            out.extend(
                node.peer_identities_and_addrs()
                    .into_iter()
                    .map(|(id, _addr)| Bytes::from(id)),
            );
            out
        }
        ControlRequest::Unknown(frames) => {
            let mut out = vec![Bytes::from_static(b"ERR"), Bytes::from_static(b"UNKNOWN COMMAND")];
            out.extend(frames);
            out
        }
    }
}
