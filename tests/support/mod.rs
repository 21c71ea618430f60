//! Shared harness for the integration tests: an in-process fake engine that
//! speaks just enough of the IPC protocol to exercise the client end to end.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use qlink::config::ConnectionParams;
use qlink::wire::{
    compress_frame, decode_response, encode_frame, ByteOrder, Frame, MessageKind, TextEncoding,
    Value, HEADER_LEN,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qlink=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// -----------------------------------------------------------------------------
// ----- Behavior --------------------------------------------------------------

/// What the fake engine does with each connection it accepts.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer every sync request with this value.
    Respond(Value),
    /// Answer every sync request with this value in a compressed frame.
    RespondCompressed(Value),
    /// Decode each sync request and send it straight back.
    Echo,
    /// First sync request gets a structured engine error, later ones the
    /// value.
    ErrorThenRespond(String, Value),
    /// Claim a long response, send a few bytes of it, and hang up.
    Truncate,
    /// Drop any versioned hello; acknowledge only the legacy form.
    LegacyOnly,
    /// Close every connection without acknowledging credentials.
    RejectAll,
    /// Stay quiet on sync requests; push this value after each async one.
    PushOnAsync(Value),
}

// -----------------------------------------------------------------------------
// ----- FakeEngine ------------------------------------------------------------

/// One listener on an ephemeral port, serving every connection on its own
/// thread until dropped.
pub struct FakeEngine {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
}

impl FakeEngine {
    pub fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake engine");
        let addr = listener.local_addr().expect("fake engine local addr");
        let stop = Arc::new(AtomicBool::new(false));

        let accept = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                for incoming in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    let Ok(stream) = incoming else { return };
                    let behavior = behavior.clone();
                    thread::spawn(move || serve(stream, behavior));
                }
            })
        };

        Self {
            addr,
            stop,
            accept: Some(accept),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Descriptor pointing at this engine with test credentials.
    pub fn params(&self) -> ConnectionParams {
        ConnectionParams::new(self.addr.ip().to_string(), self.addr.port())
            .with_credentials("tester", "pw")
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it observes the stop flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.accept.take() {
            let _ = handle.join();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Connection serving ----------------------------------------------------

fn serve(mut stream: TcpStream, behavior: Behavior) {
    let Some(creds) = read_credentials(&mut stream) else {
        return;
    };
    let versioned = creds.last() == Some(&3);

    match behavior {
        Behavior::RejectAll => return,
        Behavior::LegacyOnly if versioned => return,
        _ => {}
    }
    let ack = if versioned { 3u8 } else { 0 };
    if stream.write_all(&[ack]).is_err() {
        return;
    }

    let mut first_sync = true;
    loop {
        let Some((kind, payload)) = read_request(&mut stream) else {
            return;
        };

        let ok = match (&behavior, kind) {
            (Behavior::PushOnAsync(value), 0) => respond(&mut stream, value),
            (_, 0) => true,
            (Behavior::Respond(value), _) => respond(&mut stream, value),
            (Behavior::RespondCompressed(value), _) => respond_compressed(&mut stream, value),
            (Behavior::Echo, _) => {
                let frame = Frame {
                    kind,
                    order: ByteOrder::Little,
                    payload,
                };
                let value =
                    decode_response(&frame, TextEncoding::Utf8).expect("decode echoed request");
                respond(&mut stream, &value)
            }
            (Behavior::ErrorThenRespond(message, value), _) => {
                if first_sync {
                    first_sync = false;
                    respond_error(&mut stream, message)
                } else {
                    respond(&mut stream, value)
                }
            }
            (Behavior::Truncate, _) => {
                let _ = stream.write_all(&[1, 2, 0, 0, 64, 0, 0, 0, 0xF9, 1]);
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
            (Behavior::PushOnAsync(_), _) => true,
            (Behavior::LegacyOnly | Behavior::RejectAll, _) => true,
        };
        if !ok {
            return;
        }
    }
}

/// Credential bytes up to (excluding) the NUL terminator.
fn read_credentials(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut creds = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(1) if byte[0] == 0 => return Some(creds),
            Ok(1) => creds.push(byte[0]),
            _ => return None,
        }
    }
}

/// Next inbound frame as (kind, payload). Clients always frame little-endian.
fn read_request(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).ok()?;
    let total = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut payload = vec![0u8; total - HEADER_LEN];
    stream.read_exact(&mut payload).ok()?;
    Some((header[1], payload))
}

fn respond(stream: &mut TcpStream, value: &Value) -> bool {
    let frame =
        encode_frame(MessageKind::Response, value, TextEncoding::Utf8).expect("encode response");
    stream.write_all(&frame).is_ok()
}

fn respond_compressed(stream: &mut TcpStream, value: &Value) -> bool {
    let frame =
        encode_frame(MessageKind::Response, value, TextEncoding::Utf8).expect("encode response");
    let compressed = compress_frame(&frame).expect("response should compress");
    stream.write_all(&compressed).is_ok()
}

/// Structured engine error: response kind, error tag, NUL-terminated text.
fn respond_error(stream: &mut TcpStream, message: &str) -> bool {
    let total = (HEADER_LEN + 1 + message.len() + 1) as u32;
    let mut buf = Vec::with_capacity(total as usize);
    buf.extend_from_slice(&[1, MessageKind::Response.as_byte(), 0, 0]);
    buf.extend_from_slice(&total.to_le_bytes());
    buf.push(0x80);
    buf.extend_from_slice(message.as_bytes());
    buf.push(0);
    stream.write_all(&buf).is_ok()
}
