//! Trible Message Envelope
//!
//! The envelope is the unit exchanged on the wire: a fixed-width header and an
//! opaque body. Encoding and framing live in [`crate::transport::codec`].

use bytes::Bytes;

use super::RequestId;

/// Fixed protocol constant carried in the first byte of every frame.
pub const MAGIC: u8 = 0x01;

/// Current protocol version.
pub const VERSION: u8 = 0x01;

/// Size of the fixed header in bytes.
///
/// magic(1) + version(1) + serializer(1) + type(1) + status(1)
/// + request_id(8) + body_length(4)
pub const HEADER_LEN: usize = 17;

/// Upper bound on a single body, matching the transport's message size limit.
pub const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

/// Kind of message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Heartbeat = 2,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageType::Request),
            1 => Some(MessageType::Response),
            2 => Some(MessageType::Heartbeat),
            _ => None,
        }
    }
}

/// Outcome flag set by the responder.
///
/// Requests always carry [`MessageStatus::Success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageStatus {
    Success = 20,
    BadRequest = 40,
    BadResponse = 50,
}

impl MessageStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(MessageStatus::Success),
            40 => Some(MessageStatus::BadRequest),
            50 => Some(MessageStatus::BadResponse),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == MessageStatus::Success
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Success => "success",
            MessageStatus::BadRequest => "bad request",
            MessageStatus::BadResponse => "bad response",
        }
    }
}

/// Envelope header.
///
/// `body_length` always describes the body it travels with: [`Envelope::new`]
/// derives it from the body, and the decoder only yields a message once exactly
/// that many body bytes are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub version: u8,
    pub serializer: u8,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub request_id: RequestId,
    pub body_length: u32,
}

impl Header {
    /// Header for an outgoing request.
    pub fn request(serializer: u8, request_id: RequestId) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            serializer,
            message_type: MessageType::Request,
            status: MessageStatus::Success,
            request_id,
            body_length: 0,
        }
    }

    /// Header for a response to `request_id`.
    pub fn response(serializer: u8, request_id: RequestId, status: MessageStatus) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            serializer,
            message_type: MessageType::Response,
            status,
            request_id,
            body_length: 0,
        }
    }
}

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: Header,
    pub body: Bytes,
}

impl Envelope {
    /// Builds an envelope, setting `header.body_length` from `body`.
    pub fn new(mut header: Header, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        header.body_length = body.len() as u32;
        Self { header, body }
    }

    /// Total encoded size of this envelope.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_from_u8() {
        assert_eq!(MessageType::from_u8(0), Some(MessageType::Request));
        assert_eq!(MessageType::from_u8(1), Some(MessageType::Response));
        assert_eq!(MessageType::from_u8(2), Some(MessageType::Heartbeat));
        assert_eq!(MessageType::from_u8(3), None);
    }

    #[test]
    fn test_message_status_from_u8() {
        assert_eq!(MessageStatus::from_u8(20), Some(MessageStatus::Success));
        assert_eq!(MessageStatus::from_u8(40), Some(MessageStatus::BadRequest));
        assert_eq!(MessageStatus::from_u8(50), Some(MessageStatus::BadResponse));
        assert_eq!(MessageStatus::from_u8(0), None);
        assert!(MessageStatus::Success.is_success());
        assert!(!MessageStatus::BadResponse.is_success());
    }

    #[test]
    fn test_envelope_new_sets_body_length() {
        let envelope = Envelope::new(Header::request(1, 42), vec![1u8, 2, 3, 4, 5]);
        assert_eq!(envelope.header.body_length, 5);
        assert_eq!(envelope.frame_len(), HEADER_LEN + 5);
    }

    #[test]
    fn test_request_and_response_headers() {
        let request = Header::request(1, 9);
        assert_eq!(request.magic, MAGIC);
        assert_eq!(request.version, VERSION);
        assert_eq!(request.message_type, MessageType::Request);
        assert_eq!(request.status, MessageStatus::Success);

        let response = Header::response(1, 9, MessageStatus::BadRequest);
        assert_eq!(response.message_type, MessageType::Response);
        assert_eq!(response.status, MessageStatus::BadRequest);
        assert_eq!(response.request_id, 9);
    }
}
