//! One blocking TCP session to one engine endpoint. The connection owns the
//! handshake, the five execute/receive operations, and the fault split:
//! engine-reported errors leave the session usable, anything touching raw
//! I/O or framing demotes it to non-reusable for good.

use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ConnectionParams;
use crate::errors::Error;
use crate::wire::{
    decode_response, encode_frame, read_frame, FromValue, MessageKind, Value, WireError,
};

/// Protocol revision sent with the handshake credential string.
const HANDSHAKE_VERSION: u8 = 3;

// -----------------------------------------------------------------------------
// ----- ConnectionState -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Authenticating,
    Open,
    Closed,
    /// Framing is suspect; the session must never carry another request.
    Broken,
}

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    /// Inbound side of the same socket, buffered at the descriptor's
    /// `buffer_size`.
    reader: BufReader<TcpStream>,
    params: ConnectionParams,
    state: ConnectionState,
    reusable: bool,
    /// Capability byte acknowledged by the engine; 0 after a legacy
    /// handshake.
    capability: u8,
}

// -----------------------------------------------------------------------------
// ----- Connection: Static ----------------------------------------------------

impl Connection {
    /// Connects and authenticates. Falls back to the legacy no-version
    /// handshake once if the engine drops the versioned attempt.
    pub fn open(params: &ConnectionParams) -> Result<Self, Error> {
        let stream = Self::dial(params)?;

        let (stream, capability) = match Self::handshake(stream, params, true) {
            Ok(ok) => ok,
            Err(first) => {
                debug!(
                    server = %params.server,
                    port = params.port,
                    "versioned handshake rejected ({first}), retrying legacy"
                );
                let retry = Self::dial(params)?;
                Self::handshake(retry, params, false).map_err(|_| Error::AccessDenied {
                    user: params.user.clone(),
                })?
            }
        };

        debug!(
            server = %params.server,
            port = params.port,
            capability,
            "session open"
        );

        let reader = BufReader::with_capacity(
            params.buffer_size,
            stream.try_clone().map_err(to_fatal)?,
        );

        Ok(Self {
            stream,
            reader,
            params: params.clone(),
            state: ConnectionState::Open,
            reusable: true,
            capability,
        })
    }

    fn dial(params: &ConnectionParams) -> Result<TcpStream, Error> {
        let addr = format!("{}:{}", params.server, params.port);
        let stream = TcpStream::connect(&addr).map_err(to_fatal)?;
        stream.set_nodelay(true).map_err(to_fatal)?;
        stream
            .set_write_timeout(timeout_opt(params.send_timeout))
            .map_err(to_fatal)?;
        stream
            .set_read_timeout(timeout_opt(params.receive_timeout))
            .map_err(to_fatal)?;
        Ok(stream)
    }

    /// Credential string, optional version byte, NUL; then a one-byte
    /// acknowledgement. A closed socket here means the engine rejected us.
    fn handshake(
        mut stream: TcpStream,
        params: &ConnectionParams,
        versioned: bool,
    ) -> Result<(TcpStream, u8), Error> {
        let mut hello = Vec::with_capacity(params.user.len() + 34);
        hello.extend_from_slice(params.user.as_bytes());
        hello.push(b':');
        hello.extend_from_slice(params.password_exposed().as_bytes());
        if versioned {
            hello.push(HANDSHAKE_VERSION);
        }
        hello.push(0);

        stream.write_all(&hello).map_err(to_fatal)?;

        let mut ack = [0u8; 1];
        match stream.read(&mut ack) {
            Ok(1) => Ok((stream, ack[0])),
            Ok(_) => Err(Error::AccessDenied {
                user: params.user.clone(),
            }),
            Err(e) => Err(Error::Fatal(WireError::Io(e))),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Public ----------------------------------------------------

impl Connection {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// A pool may only re-shelve a connection for which this holds.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open && self.reusable
    }

    pub fn capability(&self) -> u8 {
        self.capability
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Sends a sync request and decodes the response.
    pub fn execute_query(&mut self, query: &str, args: &[Value]) -> Result<Value, Error> {
        self.send(MessageKind::Sync, &request_value(query, args))?;
        self.read_response(query)
    }

    /// Sends a sync request and converts the scalar result.
    pub fn execute_scalar<T: FromValue>(&mut self, query: &str, args: &[Value]) -> Result<T, Error> {
        convert(self.execute_query(query, args)?)
    }

    /// Sends a sync request, discarding the result shape.
    pub fn execute_non_query(&mut self, query: &str, args: &[Value]) -> Result<(), Error> {
        self.execute_query(query, args).map(drop)
    }

    /// Fire-and-forget: the engine sends no response.
    pub fn execute_one_way(&mut self, query: &str, args: &[Value]) -> Result<(), Error> {
        self.send(MessageKind::Async, &request_value(query, args))
    }

    /// Blocks for the next inbound message, i.e. the response to a
    /// previously published subscription in pub/sub setups.
    pub fn receive<T: FromValue>(&mut self) -> Result<T, Error> {
        self.ensure_open()?;
        let frame = read_frame(&mut self.reader).map_err(|e| self.demote(e))?;
        let value = decode_response(&frame, self.params.encoding)
            .map_err(|e| self.classify(e, "<subscription>"))?;
        convert(value)
    }

    /// Idempotent close. Dropping the connection does the same.
    pub fn close(&mut self) {
        if matches!(self.state, ConnectionState::Closed) {
            return;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.state = ConnectionState::Closed;
        self.reusable = false;
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Private ---------------------------------------------------

impl Connection {
    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            ConnectionState::Open => Ok(()),
            _ => Err(Error::Fatal(WireError::Corrupt("session is not open"))),
        }
    }

    fn send(&mut self, kind: MessageKind, value: &Value) -> Result<(), Error> {
        self.ensure_open()?;
        let frame = encode_frame(kind, value, self.params.encoding).map_err(|e| self.demote(e))?;
        self.stream
            .write_all(&frame)
            .map_err(|e| self.demote(WireError::Io(e)))
    }

    fn read_response(&mut self, query: &str) -> Result<Value, Error> {
        let frame = read_frame(&mut self.reader).map_err(|e| self.demote(e))?;
        decode_response(&frame, self.params.encoding)
            .map_err(|e| self.classify(e, query))
    }

    /// Remote errors keep the session; everything else is a framing hazard.
    fn classify(&mut self, err: WireError, query: &str) -> Error {
        match err {
            WireError::Remote(message) => Error::Remote {
                query: query.to_owned(),
                message,
            },
            other => self.demote(other),
        }
    }

    fn demote(&mut self, err: WireError) -> Error {
        warn!(
            server = %self.params.server,
            port = self.params.port,
            "session fault, demoting connection: {err}"
        );
        self.state = ConnectionState::Broken;
        self.reusable = false;
        Error::Fatal(err)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

/// Bare queries travel as a char vector; parameterized ones as a list of the
/// query followed by its arguments.
fn request_value(query: &str, args: &[Value]) -> Value {
    if args.is_empty() {
        Value::CharVec(query.to_owned())
    } else {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Value::CharVec(query.to_owned()));
        items.extend_from_slice(args);
        Value::List(items)
    }
}

fn convert<T: FromValue>(value: Value) -> Result<T, Error> {
    T::from_value(value).map_err(|found| Error::Conversion {
        expected: T::EXPECTED,
        found: found.kind_name(),
    })
}

fn to_fatal(e: std::io::Error) -> Error {
    Error::Fatal(WireError::Io(e))
}

/// `Duration::ZERO` means "no timeout"; the socket API spells that `None`.
fn timeout_opt(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
