//! End-to-end node scenarios, driven entirely through the control endpoint —
//! the same surface the operator shell uses.

use bytes::Bytes;
use std::time::Duration;
use zht::fabric::ReqClient;
use zht::node::{Node, NodeConfig};

async fn start_node(identity: &str, rep_port: u16, pub_port: u16) -> (Node, ReqClient) {
    let config = NodeConfig::new(
        identity,
        format!("tcp://127.0.0.1:{rep_port}"),
        format!("tcp://127.0.0.1:{pub_port}"),
    );
    let control_addr = config.control_addr.clone();
    let node = Node::bind(config).await.expect("bind");
    node.start().await.expect("start");
    // give the accept loops a tick to register before any client dials in.
    compio::time::sleep(Duration::from_millis(20)).await;
    let client = ReqClient::connect(&control_addr).await.expect("control connect");
    (node, client)
}

async fn control(client: &mut ReqClient, frames: Vec<Bytes>) -> Vec<Bytes> {
    client
        .request(frames)
        .await
        .expect("control request io")
        .expect("control reply")
}

fn frame(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

#[compio::test]
async fn empty_get_reports_key_error() {
    let (_a, mut a_ctrl) = start_node("node-a", 15001, 15002).await;
    let (_b, mut b_ctrl) = start_node("node-b", 15003, 15004).await;

    let reply = control(&mut a_ctrl, vec![frame("GET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("KeyError")]);

    let reply = control(&mut b_ctrl, vec![frame("GET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("KeyError")]);
}

#[compio::test]
async fn local_put_then_get_does_not_cross_unpeered_nodes() {
    let (_a, mut a_ctrl) = start_node("node-a2", 15011, 15012).await;
    let (_b, mut b_ctrl) = start_node("node-b2", 15013, 15014).await;

    let reply = control(&mut a_ctrl, vec![frame("PUT"), frame("asdf"), frame("qwer")]).await;
    assert_eq!(reply, vec![frame("OK"), frame("asdf"), frame("qwer")]);

    let reply = control(&mut a_ctrl, vec![frame("GET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("qwer")]);

    let reply = control(&mut b_ctrl, vec![frame("GET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("KeyError")]);
}

#[compio::test]
async fn peer_sync_replicates_existing_and_future_writes() {
    let (_a, mut a_ctrl) = start_node("node-a3", 15021, 15022).await;
    let (_b, mut b_ctrl) = start_node("node-b3", 15023, 15024).await;

    control(&mut a_ctrl, vec![frame("PUT"), frame("asdf"), frame("qwer")]).await;

    let reply = control(
        &mut b_ctrl,
        vec![frame("CONNECT"), frame("tcp://127.0.0.1:15021")],
    )
    .await;
    assert_eq!(reply, vec![frame("OK")]);

    compio::time::sleep(Duration::from_millis(200)).await;

    let reply = control(&mut b_ctrl, vec![frame("GET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("qwer")]);

    control(&mut b_ctrl, vec![frame("PUT"), frame("zxcv"), frame("poiu")]).await;
    compio::time::sleep(Duration::from_millis(100)).await;

    let reply = control(&mut a_ctrl, vec![frame("GET"), frame("zxcv")]).await;
    assert_eq!(reply, vec![frame("poiu")]);
}

#[compio::test]
async fn transitive_peering_converges_peer_sets() {
    let (_a, mut a_ctrl) = start_node("node-a4", 15031, 15032).await;
    let (_b, mut b_ctrl) = start_node("node-b4", 15033, 15034).await;
    let (_c, mut c_ctrl) = start_node("node-c4", 15035, 15036).await;

    control(&mut a_ctrl, vec![frame("CONNECT"), frame("tcp://127.0.0.1:15033")]).await;
    compio::time::sleep(Duration::from_millis(150)).await;

    control(&mut b_ctrl, vec![frame("CONNECT"), frame("tcp://127.0.0.1:15035")]).await;
    compio::time::sleep(Duration::from_millis(250)).await;

    let a_peers = control(&mut a_ctrl, vec![frame("PEERS")]).await;
    let b_peers = control(&mut b_ctrl, vec![frame("PEERS")]).await;
    let c_peers = control(&mut c_ctrl, vec![frame("PEERS")]).await;

    assert_eq!(a_peers[0], frame("PEERS"));
    assert_eq!(a_peers.len(), 3, "node-a4 should know both other identities");
    assert_eq!(b_peers.len(), 3, "node-b4 should know both other identities");
    assert_eq!(c_peers.len(), 3, "node-c4 should learn node-a4 transitively");
}

#[compio::test]
async fn rget_forwards_to_the_owning_peer_before_sync_completes() {
    let (_a, mut a_ctrl) = start_node("node-a5", 15041, 15042).await;
    let (_b, mut b_ctrl) = start_node("node-b5", 15043, 15044).await;

    control(&mut b_ctrl, vec![frame("CONNECT"), frame("tcp://127.0.0.1:15041")]).await;
    // No quiescence wait: rget must reach across before init_state finishes.
    control(&mut a_ctrl, vec![frame("PUT"), frame("asdf"), frame("qwer")]).await;

    let reply = control(&mut b_ctrl, vec![frame("RGET"), frame("asdf")]).await;
    assert_eq!(reply, vec![frame("qwer")]);
}

#[compio::test]
async fn rget_with_no_owning_peer_is_empty() {
    let (_a, mut a_ctrl) = start_node("node-a6", 15051, 15052).await;

    let reply = control(&mut a_ctrl, vec![frame("RGET"), frame("nope")]).await;
    assert_eq!(reply, vec![Bytes::new()]);
}

#[compio::test]
async fn unknown_control_command_is_echoed_with_error_prefix() {
    let (_a, mut a_ctrl) = start_node("node-a7", 15061, 15062).await;

    let reply = control(&mut a_ctrl, vec![frame("NOPE"), frame("x")]).await;
    assert_eq!(reply, vec![frame("ERR"), frame("UNKNOWN COMMAND"), frame("NOPE"), frame("x")]);
}

#[compio::test]
async fn connect_is_idempotent_across_repeated_calls() {
    let (_a, mut a_ctrl) = start_node("node-a8", 15081, 15082).await;
    let (_b, mut b_ctrl) = start_node("node-b8", 15083, 15084).await;

    for _ in 0..3 {
        let reply = control(&mut a_ctrl, vec![frame("CONNECT"), frame("tcp://127.0.0.1:15083")]).await;
        assert_eq!(reply, vec![frame("OK")]);
    }
    compio::time::sleep(Duration::from_millis(150)).await;

    let a_peers = control(&mut a_ctrl, vec![frame("PEERS")]).await;
    assert_eq!(a_peers.len(), 2, "node-a8 should install at most one peer despite repeated connect calls");

    let b_peers = control(&mut b_ctrl, vec![frame("PEERS")]).await;
    assert_eq!(b_peers.len(), 2, "node-b8 should only see node-a8 once too");
}
