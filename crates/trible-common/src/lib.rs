//! Trible Common Types and Transport
//!
//! This crate provides the protocol definitions, the binary wire codec and the
//! TCP transport shared by every Trible RPC component.
//!
//! # Overview
//!
//! Trible turns a local interface-method call into a remote invocation. This
//! crate contains the pieces that both ends of a connection agree on:
//!
//! - **Protocol Layer**: Request/Response payloads, the envelope header,
//!   request id generation and the error taxonomy
//! - **Transport Layer**: framing codec, body serializers and a TCP transport
//!
//! # Wire Format
//!
//! Every message is an envelope: a fixed 17-byte big-endian header followed by
//! `body_length` bytes of serializer-specific payload.
//!
//! ```text
//! +-------+---------+------------+------+--------+------------+-------------+
//! | magic | version | serializer | type | status | request_id | body_length |
//! |  u8   |   u8    |     u8     |  u8  |   u8   |    u64     |     u32     |
//! +-------+---------+------------+------+--------+------------+-------------+
//! ```
//!
//! # Example
//!
//! ```
//! use trible_common::{Envelope, Header, MessageType, Request};
//! use trible_common::transport::{ProtocolCodec, Serializer};
//! use serde_json::json;
//!
//! let request = Request::new("Calculator", "add", vec!["i64".into(), "i64".into()], vec![json!(1), json!(2)], 7);
//! let serializer = Serializer::json();
//! let body = serializer.encode_request(&request).unwrap();
//!
//! let envelope = Envelope::new(Header::request(serializer.id(), request.request_id), body);
//! let frame = ProtocolCodec::encode(&envelope);
//!
//! let mut buf = bytes::BytesMut::from(&frame[..]);
//! let decoded = ProtocolCodec::decode(&mut buf).unwrap().unwrap();
//! assert_eq!(decoded.header.message_type, MessageType::Request);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
