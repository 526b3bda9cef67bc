use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::error::{Result, TribleError};
use crate::protocol::{
    Envelope, Header, MessageStatus, MessageType, Request, Response, HEADER_LEN, MAGIC,
    MAX_BODY_SIZE, VERSION,
};

/// Serializer id of the JSON body format.
pub const JSON_SERIALIZER_ID: u8 = 1;

/// Envelope codec implementing the length-prefixed framing.
///
/// Decoding never consumes a partial frame: when the buffer holds fewer bytes
/// than the header, or fewer body bytes than `body_length` announces, the
/// buffer is left untouched and `Ok(None)` is returned so the caller can read
/// more. Several frames in one buffer are returned one per call.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use trible_common::{Envelope, Header};
/// use trible_common::transport::ProtocolCodec;
///
/// let frame = ProtocolCodec::encode(&Envelope::new(Header::request(1, 42), &b"{}"[..]));
///
/// // Half a frame is not enough
/// let mut partial = BytesMut::from(&frame[..10]);
/// assert!(ProtocolCodec::decode(&mut partial).unwrap().is_none());
/// assert_eq!(partial.len(), 10);
///
/// let mut full = BytesMut::from(&frame[..]);
/// let envelope = ProtocolCodec::decode(&mut full).unwrap().unwrap();
/// assert_eq!(envelope.header.request_id, 42);
/// ```
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Encodes an envelope into a fresh buffer.
    pub fn encode(envelope: &Envelope) -> Bytes {
        let mut dst = BytesMut::with_capacity(envelope.frame_len());
        Self::encode_into(envelope, &mut dst);
        dst.freeze()
    }

    /// Appends the encoded envelope to `dst`.
    ///
    /// The length field is written from the body itself.
    pub fn encode_into(envelope: &Envelope, dst: &mut BytesMut) {
        let header = &envelope.header;
        dst.reserve(envelope.frame_len());
        dst.put_u8(header.magic);
        dst.put_u8(header.version);
        dst.put_u8(header.serializer);
        dst.put_u8(header.message_type as u8);
        dst.put_u8(header.status as u8);
        dst.put_u64(header.request_id);
        dst.put_u32(envelope.body.len() as u32);
        dst.put_slice(&envelope.body);
    }

    /// Checks that a body of `len` bytes fits in one frame.
    ///
    /// Encoders call this before building an envelope so they never emit a
    /// frame the decoder would refuse or a length field that wraps.
    pub fn check_body_len(len: usize) -> Result<()> {
        if len > MAX_BODY_SIZE {
            return Err(TribleError::IllegalArgument(format!(
                "Message too large: {} bytes (max {})",
                len, MAX_BODY_SIZE
            )));
        }
        Ok(())
    }

    /// Decodes one envelope from the front of `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(envelope))` - a complete frame was removed from `src`
    /// - `Ok(None)` - more data is needed; `src` is unchanged
    /// - `Err(ProtocolDecode)` - the header is invalid
    pub fn decode(src: &mut BytesMut) -> Result<Option<Envelope>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = Self::decode_header(&src[..HEADER_LEN])?;
        let frame_len = HEADER_LEN + header.body_length as usize;

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_LEN);

        Ok(Some(Envelope {
            header,
            body: frame.freeze(),
        }))
    }

    /// Length of the first complete frame in `src`, if there is one.
    ///
    /// Validates the header as soon as it is available, so transports can
    /// reject garbage without waiting for a body that will never be sent.
    pub fn frame_length(src: &[u8]) -> Result<Option<usize>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = Self::decode_header(&src[..HEADER_LEN])?;
        let frame_len = HEADER_LEN + header.body_length as usize;

        Ok((src.len() >= frame_len).then_some(frame_len))
    }

    /// Parses and validates a fixed-size header.
    ///
    /// The magic byte is checked before anything else is read.
    pub fn decode_header(mut buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_LEN {
            return Err(TribleError::ProtocolDecode(format!(
                "header needs {} bytes, got {}",
                HEADER_LEN,
                buf.len()
            )));
        }

        let magic = buf.get_u8();
        if magic != MAGIC {
            return Err(TribleError::ProtocolDecode(format!(
                "invalid magic byte: {magic:#04x}"
            )));
        }

        let version = buf.get_u8();
        if version != VERSION {
            return Err(TribleError::ProtocolDecode(format!(
                "unsupported protocol version: {version}"
            )));
        }

        let serializer = buf.get_u8();
        if Serializer::from_id(serializer).is_none() {
            return Err(TribleError::ProtocolDecode(format!(
                "unsupported serializer id: {serializer}"
            )));
        }

        let raw_type = buf.get_u8();
        let message_type = MessageType::from_u8(raw_type).ok_or_else(|| {
            TribleError::ProtocolDecode(format!("unknown message type: {raw_type}"))
        })?;

        let raw_status = buf.get_u8();
        let status = MessageStatus::from_u8(raw_status).ok_or_else(|| {
            TribleError::ProtocolDecode(format!("unknown message status: {raw_status}"))
        })?;

        let request_id = buf.get_u64();
        let body_length = buf.get_u32();

        if body_length as usize > MAX_BODY_SIZE {
            return Err(TribleError::ProtocolDecode(format!(
                "Message too large: {} bytes (max {} bytes)",
                body_length, MAX_BODY_SIZE
            )));
        }

        Ok(Header {
            magic,
            version,
            serializer,
            message_type,
            status,
            request_id,
            body_length,
        })
    }
}

/// Incremental decoder for byte streams.
///
/// Bytes arrive in arbitrary chunks; the decoder buffers them and yields each
/// complete envelope exactly once, in order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete envelope, or `None` if more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>> {
        ProtocolCodec::decode(&mut self.buffer)
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Body serializer selected by the header's serializer id.
///
/// Encoders pick one from configuration with [`Serializer::from_key`] and
/// stamp its [`id`](Serializer::id) into the header; decoders resolve the id
/// found on the wire with [`Serializer::from_id`]. An id with no variant is
/// rejected before the body is read.
///
/// # Example
///
/// ```
/// use trible_common::transport::Serializer;
/// use trible_common::Response;
/// use serde_json::json;
///
/// let serializer = Serializer::from_key("json").unwrap();
/// let response = Response::success(json!(3));
///
/// let encoded = serializer.encode_response(&response).unwrap();
/// let decoded = serializer.decode_response(&encoded).unwrap();
/// assert_eq!(response, decoded);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    /// Serializer id 1
    Json(JsonSerializer),
}

impl Serializer {
    pub fn json() -> Self {
        Serializer::Json(JsonSerializer)
    }

    /// Looks up a serializer by wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            JSON_SERIALIZER_ID => Some(Self::json()),
            _ => None,
        }
    }

    /// Looks up a serializer by configuration key (case-insensitive).
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_uppercase().as_str() {
            "JSON" => Some(Self::json()),
            _ => None,
        }
    }

    /// Wire id written into the header.
    pub fn id(&self) -> u8 {
        match self {
            Serializer::Json(_) => JSON_SERIALIZER_ID,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Serializer::Json(_) => "JSON",
        }
    }

    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        match self {
            Serializer::Json(_) => JsonSerializer::encode_request(request),
        }
    }

    pub fn decode_request(&self, data: &[u8]) -> Result<Request> {
        match self {
            Serializer::Json(_) => JsonSerializer::decode_request(data),
        }
    }

    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        match self {
            Serializer::Json(_) => JsonSerializer::encode_response(response),
        }
    }

    pub fn decode_response(&self, data: &[u8]) -> Result<Response> {
        match self {
            Serializer::Json(_) => JsonSerializer::decode_response(data),
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::json()
    }
}

/// JSON body serializer.
///
/// Encoding failures surface as `Serialization` errors. Decoding failures are
/// reported as `ProtocolDecode`, since a body that does not parse is a
/// malformed message rather than a local bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<Request> {
        serde_json::from_slice(data)
            .map_err(|e| TribleError::ProtocolDecode(format!("malformed request body: {e}")))
    }

    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    pub fn decode_response(data: &[u8]) -> Result<Response> {
        serde_json::from_slice(data)
            .map_err(|e| TribleError::ProtocolDecode(format!("malformed response body: {e}")))
    }
}
