//! Frame encoding and decoding for the reply, publish, and control protocols.
//!
//! All three protocols exchange multipart messages of opaque byte frames.
//! This module is the single place that knows how those frames map to the
//! verbs in the specification tables — everywhere else works with the typed
//! request/response/message enums below.

use bytes::Bytes;
use hashbrown::HashMap;

fn ts_to_bytes(ts: f64) -> Bytes {
    Bytes::from(ts.to_string())
}

fn parse_ts(frame: &Bytes) -> Option<f64> {
    std::str::from_utf8(frame).ok()?.parse::<f64>().ok()
}

fn key_to_string(key: &Bytes) -> String {
    String::from_utf8_lossy(key).into_owned()
}

/// A request received on the reply endpoint.
#[derive(Debug, Clone)]
pub enum ReplyRequest {
    /// `PEER, id, reply_addr, publish_addr`
    Peer {
        id: String,
        reply_addr: String,
        publish_addr: String,
    },
    /// `PEERS`
    Peers,
    /// `BUCKETS`
    Buckets,
    /// `KEYS, prefix`
    Keys { prefix: String },
    /// `GET, key`
    Get { key: Bytes },
    /// Anything else — echoed back verbatim.
    Other(Vec<Bytes>),
}

impl ReplyRequest {
    /// Decodes the application payload of an inbound reply-endpoint message.
    pub fn decode(frames: &[Bytes]) -> Self {
        match frames.first().map(Bytes::as_ref) {
            Some(b"PEER") if frames.len() == 4 => Self::Peer {
                id: key_to_string(&frames[1]),
                reply_addr: key_to_string(&frames[2]),
                publish_addr: key_to_string(&frames[3]),
            },
            Some(b"PEERS") => Self::Peers,
            Some(b"BUCKETS") => Self::Buckets,
            Some(b"KEYS") if frames.len() == 2 => Self::Keys {
                prefix: key_to_string(&frames[1]),
            },
            Some(b"GET") if frames.len() == 2 => Self::Get {
                key: frames[1].clone(),
            },
            _ => Self::Other(frames.to_vec()),
        }
    }
}

/// A reply sent back over the reply endpoint.
#[derive(Debug, Clone)]
pub enum ReplyResponse {
    /// `PEER, self_id, self_publish_addr`
    Peer { id: String, publish_addr: String },
    /// `PEERS, json({id: reply_addr, ...})`
    Peers(HashMap<String, String>),
    /// `BUCKETS, json([prefix, ...])`
    Buckets(Vec<String>),
    /// `KEYS, prefix, json({key: timestamp, ...})`
    Keys {
        prefix: String,
        entries: HashMap<Bytes, f64>,
    },
    /// `GET, key, value, repr(timestamp)`
    Get { key: Bytes, value: Bytes, timestamp: f64 },
    /// `ERROR, KeyError, GET, key`
    GetMiss { key: Bytes },
    /// Unknown verb: `ECHO, <original frames>`
    Echo(Vec<Bytes>),
}

impl ReplyResponse {
    /// Encodes this response into application-payload frames (the envelope
    /// is prepended separately by the reply endpoint).
    pub fn encode(&self) -> Vec<Bytes> {
        match self {
            Self::Peer { id, publish_addr } => vec![
                Bytes::from_static(b"PEER"),
                Bytes::from(id.clone()),
                Bytes::from(publish_addr.clone()),
            ],
            Self::Peers(map) => {
                let json = serde_json::to_string(map).expect("string map always serializes");
                vec![Bytes::from_static(b"PEERS"), Bytes::from(json)]
            }
            Self::Buckets(prefixes) => {
                let json = serde_json::to_string(prefixes).expect("string vec always serializes");
                vec![Bytes::from_static(b"BUCKETS"), Bytes::from(json)]
            }
            Self::Keys { prefix, entries } => {
                let as_strings: HashMap<String, f64> = entries
                    .iter()
                    .map(|(k, ts)| (key_to_string(k), *ts))
                    .collect();
                let json = serde_json::to_string(&as_strings).expect("key/ts map always serializes");
                vec![
                    Bytes::from_static(b"KEYS"),
                    Bytes::from(prefix.clone()),
                    Bytes::from(json),
                ]
            }
            Self::Get { key, value, timestamp } => vec![
                Bytes::from_static(b"GET"),
                key.clone(),
                value.clone(),
                ts_to_bytes(*timestamp),
            ],
            Self::GetMiss { key } => vec![
                Bytes::from_static(b"ERROR"),
                Bytes::from_static(b"KeyError"),
                Bytes::from_static(b"GET"),
                key.clone(),
            ],
            Self::Echo(frames) => {
                let mut out = Vec::with_capacity(frames.len() + 1);
                out.push(Bytes::from_static(b"ECHO"));
                out.extend(frames.iter().cloned());
                out
            }
        }
    }

    /// Decodes a reply payload coming back from a peer's reply endpoint, for
    /// the expected `verb`. Used by the peer request client.
    pub fn decode_peer(frames: &[Bytes]) -> Option<(String, String)> {
        if frames.len() == 3 && frames[0] == "PEER" {
            Some((key_to_string(&frames[1]), key_to_string(&frames[2])))
        } else {
            None
        }
    }

    /// Decodes a `PEERS` reply's JSON body into `id -> reply_addr`.
    pub fn decode_peers(frames: &[Bytes]) -> Option<HashMap<String, String>> {
        if frames.len() == 2 && frames[0] == "PEERS" {
            serde_json::from_slice(&frames[1]).ok()
        } else {
            None
        }
    }

    /// Decodes a `BUCKETS` reply's JSON body into a prefix list.
    pub fn decode_buckets(frames: &[Bytes]) -> Option<Vec<String>> {
        if frames.len() == 2 && frames[0] == "BUCKETS" {
            serde_json::from_slice(&frames[1]).ok()
        } else {
            None
        }
    }

    /// Decodes a `KEYS` reply's JSON body into `key -> timestamp`.
    pub fn decode_keys(frames: &[Bytes]) -> Option<HashMap<Bytes, f64>> {
        if frames.len() == 3 && frames[0] == "KEYS" {
            let as_strings: HashMap<String, f64> = serde_json::from_slice(&frames[2]).ok()?;
            Some(
                as_strings
                    .into_iter()
                    .map(|(k, ts)| (Bytes::from(k.into_bytes()), ts))
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Decodes a `GET` reply into `(value, timestamp)`, or `None` on a
    /// `KeyError` / malformed reply.
    pub fn decode_get(frames: &[Bytes]) -> Option<(Bytes, f64)> {
        if frames.len() == 4 && frames[0] == "GET" {
            let ts = parse_ts(&frames[3])?;
            Some((frames[2].clone(), ts))
        } else {
            None
        }
    }
}

/// A frame broadcast on the publish endpoint (no envelope).
#[derive(Debug, Clone)]
pub enum PublishMessage {
    /// `UPDATE|<full-sha1-hex>, key, value, repr(timestamp)`
    Update {
        hash: String,
        key: Bytes,
        value: Bytes,
        timestamp: f64,
    },
    /// `PEER, id, reply_addr`
    Peer { id: String, reply_addr: String },
    /// `HEARTBEAT, self_id`
    Heartbeat { id: String },
}

impl PublishMessage {
    /// Encodes this message for broadcast.
    pub fn encode(&self) -> Vec<Bytes> {
        match self {
            Self::Update {
                hash,
                key,
                value,
                timestamp,
            } => vec![
                Bytes::from(format!("UPDATE|{hash}")),
                key.clone(),
                value.clone(),
                ts_to_bytes(*timestamp),
            ],
            Self::Peer { id, reply_addr } => vec![
                Bytes::from_static(b"PEER"),
                Bytes::from(id.clone()),
                Bytes::from(reply_addr.clone()),
            ],
            Self::Heartbeat { id } => {
                vec![Bytes::from_static(b"HEARTBEAT"), Bytes::from(id.clone())]
            }
        }
    }

    /// Decodes a subscribed frame. `None` for anything unrecognized — the
    /// subscribe handler drops those silently.
    pub fn decode(frames: &[Bytes]) -> Option<Self> {
        let first = frames.first()?;
        if first.starts_with(b"UPDATE|") {
            if frames.len() != 4 {
                return None;
            }
            let hash = String::from_utf8_lossy(&first[b"UPDATE|".len()..]).into_owned();
            let timestamp = parse_ts(&frames[3])?;
            return Some(Self::Update {
                hash,
                key: frames[1].clone(),
                value: frames[2].clone(),
                timestamp,
            });
        }
        match first.as_ref() {
            b"PEER" if frames.len() == 3 => Some(Self::Peer {
                id: key_to_string(&frames[1]),
                reply_addr: key_to_string(&frames[2]),
            }),
            b"HEARTBEAT" if frames.len() == 2 => Some(Self::Heartbeat {
                id: key_to_string(&frames[1]),
            }),
            _ => None,
        }
    }
}

/// A command received on the local control endpoint.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    /// `EOF`
    Eof,
    /// `CONNECT, addr, ...`
    Connect(Vec<String>),
    /// `GET, key, ...`
    Get(Vec<Bytes>),
    /// `RGET, key, ...`
    Rget(Vec<Bytes>),
    /// `PUT, key, value`
    Put { key: Bytes, value: Bytes },
    /// `PEERS`
    Peers,
    /// Anything else.
    Unknown(Vec<Bytes>),
}

impl ControlRequest {
    /// Decodes an inbound control-endpoint request.
    pub fn decode(frames: &[Bytes]) -> Self {
        match frames.first().map(Bytes::as_ref) {
            Some(b"EOF") => Self::Eof,
            Some(b"CONNECT") => {
                Self::Connect(frames[1..].iter().map(key_to_string).collect())
            }
            Some(b"GET") if frames.len() >= 2 => Self::Get(frames[1..].to_vec()),
            Some(b"RGET") if frames.len() >= 2 => Self::Rget(frames[1..].to_vec()),
            Some(b"PUT") if frames.len() == 3 => Self::Put {
                key: frames[1].clone(),
                value: frames[2].clone(),
            },
            Some(b"PEERS") => Self::Peers,
            _ => Self::Unknown(frames.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_peer_request() {
        let frames = vec![
            Bytes::from_static(b"PEER"),
            Bytes::from_static(b"node-b"),
            Bytes::from_static(b"tcp://b:5555"),
            Bytes::from_static(b"tcp://b:5556"),
        ];
        match ReplyRequest::decode(&frames) {
            ReplyRequest::Peer {
                id,
                reply_addr,
                publish_addr,
            } => {
                assert_eq!(id, "node-b");
                assert_eq!(reply_addr, "tcp://b:5555");
                assert_eq!(publish_addr, "tcp://b:5556");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_verb_falls_back_to_other() {
        let frames = vec![Bytes::from_static(b"WHATEVER"), Bytes::from_static(b"x")];
        assert!(matches!(ReplyRequest::decode(&frames), ReplyRequest::Other(_)));
    }

    #[test]
    fn get_miss_round_trips_as_key_error() {
        let response = ReplyResponse::GetMiss {
            key: Bytes::from_static(b"asdf"),
        };
        let encoded = response.encode();
        assert_eq!(encoded[0], Bytes::from_static(b"ERROR"));
        assert_eq!(encoded[1], Bytes::from_static(b"KeyError"));
    }

    #[test]
    fn update_publish_message_round_trips() {
        let msg = PublishMessage::Update {
            hash: "a".repeat(40),
            key: Bytes::from_static(b"asdf"),
            value: Bytes::from_static(b"qwer"),
            timestamp: 1319876543.125,
        };
        let encoded = msg.encode();
        let decoded = PublishMessage::decode(&encoded).unwrap();
        match decoded {
            PublishMessage::Update { hash, key, value, timestamp } => {
                assert_eq!(hash, "a".repeat(40));
                assert_eq!(key, Bytes::from_static(b"asdf"));
                assert_eq!(value, Bytes::from_static(b"qwer"));
                assert_eq!(timestamp, 1319876543.125);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_round_trips() {
        let msg = PublishMessage::Heartbeat { id: "a".to_string() };
        let encoded = msg.encode();
        assert!(matches!(
            PublishMessage::decode(&encoded),
            Some(PublishMessage::Heartbeat { id }) if id == "a"
        ));
    }

    #[test]
    fn control_put_requires_exactly_key_and_value() {
        let frames = vec![
            Bytes::from_static(b"PUT"),
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
        ];
        assert!(matches!(ControlRequest::decode(&frames), ControlRequest::Put { .. }));
    }

    #[test]
    fn control_unknown_command_preserved_for_echo() {
        let frames = vec![Bytes::from_static(b"NOPE"), Bytes::from_static(b"x")];
        match ControlRequest::decode(&frames) {
            ControlRequest::Unknown(echoed) => assert_eq!(echoed, frames),
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
