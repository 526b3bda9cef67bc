//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use trible_common::transport::{FrameDecoder, ProtocolCodec, Serializer, Transport};
use trible_common::{
    Envelope, Header, MessageStatus, Request, RequestId, Response, Result, TribleError,
};

// ============================================================================
// Scripted transport
// ============================================================================

/// What a scripted provider does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer successfully with this value
    Value(Value),
    /// Echo the first argument back
    Echo,
    /// Answer with a business exception
    Exception(&'static str, &'static str),
    /// Fail at the transport level
    Down,
    /// Never answer
    Hang,
    /// Answer with a frame that has a bad magic byte
    BadMagic,
    /// Answer with a different request id
    WrongId,
}

/// In-memory transport with scripted replies per address.
///
/// Each address consumes its script front to back; once the script is
/// exhausted the last reply repeats. Unknown addresses are `Down`.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, addr: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(addr.to_string(), replies.into_iter().collect());
    }

    /// Addresses sent to, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, addr: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(addr) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or(Reply::Down),
            None => Reply::Down,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, addr: &str, frame: Bytes, _timeout: Duration) -> Result<Bytes> {
        self.calls.lock().unwrap().push(addr.to_string());

        let (request_id, request) = decode_request_frame(&frame);
        match self.next_reply(addr) {
            Reply::Value(value) => Ok(response_frame(request_id, &Response::success(value))),
            Reply::Echo => Ok(response_frame(request_id, &Response::success(request.args[0].clone()))),
            Reply::Exception(kind, message) => {
                Ok(response_frame(request_id, &Response::failure(kind, message)))
            }
            Reply::Down => Err(TribleError::Transport(format!("{addr}: Connection lost"))),
            Reply::Hang => std::future::pending().await,
            Reply::BadMagic => {
                let mut bytes = response_frame(request_id, &Response::success(Value::Null)).to_vec();
                bytes[0] = 0x00;
                Ok(Bytes::from(bytes))
            }
            Reply::WrongId => Ok(response_frame(
                request_id.wrapping_add(1),
                &Response::success(Value::Null),
            )),
        }
    }
}

pub fn decode_request_frame(frame: &[u8]) -> (RequestId, Request) {
    let mut buf = BytesMut::from(frame);
    let envelope = ProtocolCodec::decode(&mut buf).unwrap().unwrap();
    let request = Serializer::json().decode_request(&envelope.body).unwrap();
    (envelope.header.request_id, request)
}

pub fn response_frame(request_id: RequestId, response: &Response) -> Bytes {
    let serializer = Serializer::json();
    let body = serializer.encode_response(response).unwrap();
    ProtocolCodec::encode(&Envelope::new(
        Header::response(serializer.id(), request_id, MessageStatus::Success),
        body,
    ))
}

// ============================================================================
// TCP provider
// ============================================================================

/// Loopback provider answering `Calculator.add` and `Calculator.divide`.
///
/// Serves any number of connections, one request per connection. Division
/// by zero is answered with an `ArithmeticException`.
pub async fn spawn_calculator() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            tokio::spawn(async move {
                let mut decoder = FrameDecoder::new();
                let mut buf = [0u8; 1024];
                let envelope = loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    decoder.extend_from_slice(&buf[..n]);
                    if let Some(envelope) = decoder.next_frame().unwrap() {
                        break envelope;
                    }
                };

                let request = Serializer::json().decode_request(&envelope.body).unwrap();
                let response = calculate(&request);
                let reply = response_frame(envelope.header.request_id, &response);
                socket.write_all(&reply).await.unwrap();
                socket.flush().await.unwrap();
            });
        }
    });

    addr
}

fn calculate(request: &Request) -> Response {
    let arg = |i: usize| request.args.get(i).and_then(Value::as_f64).unwrap_or_default();

    match request.method_name.as_str() {
        "add" => Response::success(Value::from(arg(0) as i64 + arg(1) as i64)),
        "divide" if arg(1) == 0.0 => Response::failure("ArithmeticException", "/ by zero"),
        "divide" => Response::success(Value::from(arg(0) / arg(1))),
        other => Response::failure("NoSuchMethodException", other.to_string()),
    }
}
