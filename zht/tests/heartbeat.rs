//! Heartbeat broadcast, observed directly on the publish endpoint.
//!
//! Ignored by default since it waits out the real 30-second heartbeat
//! interval — run explicitly with `cargo test -- --ignored` when exercising
//! the timer end to end.

use zht::fabric::Subscriber;
use zht::node::{Node, NodeConfig};
use zht::wire::PublishMessage;

#[compio::test]
#[ignore = "waits out the real 30s heartbeat interval"]
async fn heartbeat_is_broadcast_roughly_every_thirty_seconds() {
    let config = NodeConfig::new("node-hb", "tcp://127.0.0.1:15071", "tcp://127.0.0.1:15072");
    let node = Node::bind(config).await.expect("bind");
    node.start().await.expect("start");

    let mut subscriber = Subscriber::connect("tcp://127.0.0.1:15072")
        .await
        .expect("subscribe");

    loop {
        let frames = subscriber
            .recv()
            .await
            .expect("recv io")
            .expect("publisher still connected");
        if let Some(PublishMessage::Heartbeat { id }) = PublishMessage::decode(&frames) {
            assert_eq!(id, "node-hb");
            break;
        }
    }
}
