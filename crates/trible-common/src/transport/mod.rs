//! Trible Transport Layer
//!
//! This module provides the envelope codec, body serializers and the TCP
//! transport used to exchange request/response frames with providers.
//!
//! # Components
//!
//! - **[`ProtocolCodec`]** / **[`FrameDecoder`]**: Encode envelopes and split a
//!   byte stream back into complete envelopes
//! - **[`Serializer`]** / **[`JsonSerializer`]**: Encode/decode request and
//!   response bodies
//! - **[`Transport`]**: The seam between the invocation pipeline and the network
//! - **[`TcpTransport`]**: Async TCP implementation of [`Transport`]
//!
//! # Message Size Limits
//!
//! Bodies larger than [`MAX_BODY_SIZE`](crate::MAX_BODY_SIZE) are rejected
//! while decoding the header, before any buffer is allocated for them.

pub mod codec;
pub mod tcp;

pub use codec::{FrameDecoder, JsonSerializer, ProtocolCodec, Serializer, JSON_SERIALIZER_ID};
pub use tcp::{TcpTransport, Transport};
