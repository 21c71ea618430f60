use std::io::Read;

use memchr::memchr;

use super::compress::decompress_payload;
use super::value::{tag, Dict, Table, Value};
use super::{ByteOrder, MessageKind, TextEncoding, WireError, HEADER_LEN};

/// Nesting bound for compound payloads. Genuine data stays in single
/// digits; a frame deeper than this is hostile or corrupt.
const MAX_DEPTH: u32 = 128;

// -----------------------------------------------------------------------------
// ----- Frame -----------------------------------------------------------------

/// One inbound message, post-decompression. `kind` is the raw header byte so
/// error frames (>= 128) survive untouched.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: u8,
    pub order: ByteOrder,
    pub payload: Vec<u8>,
}

// -----------------------------------------------------------------------------
// ----- read_frame ------------------------------------------------------------

/// Reads exactly one frame. A short read anywhere inside the frame is fatal
/// to the session: framing cannot be resynchronized, so the caller must
/// discard the connection.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, WireError> {
    let mut header = [0u8; HEADER_LEN];
    read_fully(reader, &mut header)?;

    let order = ByteOrder::from_header_byte(header[0]);
    let kind = header[1];
    let compressed = header[2] != 0;
    let total = order.read_u32([header[4], header[5], header[6], header[7]]) as usize;

    if total < HEADER_LEN {
        return Err(WireError::Corrupt("declared length shorter than the header"));
    }

    let mut body = vec![0u8; total - HEADER_LEN];
    read_fully(reader, &mut body)?;

    let payload = if compressed {
        decompress_payload(&body, order)?
    } else {
        body
    };

    Ok(Frame {
        kind,
        order,
        payload,
    })
}

/// `Read::read_exact` already loops on partial socket reads; this maps its
/// EOF onto the truncated-frame error so the fault surfaces as a framing
/// failure, not a generic I/O one.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), WireError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated { needed: buf.len() }
        } else {
            WireError::Io(e)
        }
    })
}

// -----------------------------------------------------------------------------
// ----- decode_response -------------------------------------------------------

/// Decodes a frame's payload. Error frames (header kind >= 128, or a payload
/// tag above the dict tag) yield [`WireError::Remote`] carrying the engine's
/// message text.
pub fn decode_response(frame: &Frame, encoding: TextEncoding) -> Result<Value, WireError> {
    let mut cur = Cursor {
        buf: &frame.payload,
        pos: 0,
        order: frame.order,
        encoding,
        depth: 0,
    };

    if frame.kind >= MessageKind::ERROR_THRESHOLD {
        return Err(WireError::Remote(cur.error_text()?));
    }

    let value = cur.value()?;
    if cur.pos != cur.buf.len() {
        return Err(WireError::Corrupt("trailing bytes after payload"));
    }
    Ok(value)
}

// -----------------------------------------------------------------------------
// ----- Internal: Cursor ------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
    encoding: TextEncoding,
    depth: u32,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.buf.len())
            .ok_or(WireError::Truncated { needed: n })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, WireError> {
        let b: [u8; 2] = self.take(2)?.try_into().unwrap_or_default();
        Ok(match self.order {
            ByteOrder::Big => i16::from_be_bytes(b),
            ByteOrder::Little => i16::from_le_bytes(b),
        })
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        let b: [u8; 4] = self.take(4)?.try_into().unwrap_or_default();
        Ok(match self.order {
            ByteOrder::Big => i32::from_be_bytes(b),
            ByteOrder::Little => i32::from_le_bytes(b),
        })
    }

    fn i64(&mut self) -> Result<i64, WireError> {
        let b: [u8; 8] = self.take(8)?.try_into().unwrap_or_default();
        Ok(match self.order {
            ByteOrder::Big => i64::from_be_bytes(b),
            ByteOrder::Little => i64::from_le_bytes(b),
        })
    }

    fn f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.i32()? as u32))
    }

    fn f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_bits(self.i64()? as u64))
    }

    /// Element count prefix for vector shapes.
    fn count(&mut self) -> Result<usize, WireError> {
        let n = self.i32()?;
        if n < 0 {
            return Err(WireError::Corrupt("negative element count"));
        }
        Ok(n as usize)
    }

    /// NUL-terminated string in the configured encoding.
    fn sym(&mut self) -> Result<String, WireError> {
        let rest = &self.buf[self.pos..];
        let nul = memchr(0, rest).ok_or(WireError::Corrupt("unterminated string"))?;
        let raw = &rest[..nul];
        self.pos += nul + 1;
        self.encoding.decode(raw)
    }

    /// Engine error payload: one tag byte, then the message string.
    fn error_text(&mut self) -> Result<String, WireError> {
        let _tag = self.u8()?;
        self.sym()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Cursor value decoding ---------------------------------------

impl Cursor<'_> {
    /// Decodes one tagged value, recursing for compound shapes. The depth
    /// bound turns a pathologically nested frame into a decode error
    /// instead of exhausting the stack.
    fn value(&mut self) -> Result<Value, WireError> {
        if self.depth >= MAX_DEPTH {
            return Err(WireError::Corrupt("payload nesting exceeds depth limit"));
        }
        self.depth += 1;
        let value = self.value_inner();
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self) -> Result<Value, WireError> {
        let raw = self.u8()?;
        let t = raw as i8;

        // Tag bytes above the dict tag (and below the negative atom range)
        // are engine-side errors embedded in an ordinary response frame.
        if raw > tag::DICT as u8 && raw < (-tag::TIME) as u8 {
            return Err(WireError::Remote(self.sym()?));
        }

        match t {
            x if x == -tag::BOOL => Ok(Value::Bool(self.u8()? != 0)),
            x if x == -tag::BYTE => Ok(Value::Byte(self.u8()?)),
            x if x == -tag::SHORT => Ok(Value::Short(self.i16()?)),
            x if x == -tag::INT => Ok(Value::Int(self.i32()?)),
            x if x == -tag::LONG => Ok(Value::Long(self.i64()?)),
            x if x == -tag::REAL => Ok(Value::Real(self.f32()?)),
            x if x == -tag::FLOAT => Ok(Value::Float(self.f64()?)),
            x if x == -tag::CHAR => Ok(Value::Char(self.u8()? as char)),
            x if x == -tag::SYMBOL => Ok(Value::Symbol(self.sym()?)),
            x if x == -tag::TIMESTAMP => Ok(Value::Timestamp(self.i64()?)),
            x if x == -tag::MONTH => Ok(Value::Month(self.i32()?)),
            x if x == -tag::DATE => Ok(Value::Date(self.i32()?)),
            x if x == -tag::DATETIME => Ok(Value::DateTime(self.f64()?)),
            x if x == -tag::TIMESPAN => Ok(Value::Timespan(self.i64()?)),
            x if x == -tag::MINUTE => Ok(Value::Minute(self.i32()?)),
            x if x == -tag::SECOND => Ok(Value::Second(self.i32()?)),
            x if x == -tag::TIME => Ok(Value::Time(self.i32()?)),

            tag::LIST => {
                let n = self.count()?;
                let mut items = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    items.push(self.value()?);
                }
                Ok(Value::List(items))
            }

            tag::BOOL => {
                let n = self.count()?;
                let raw = self.take(n)?;
                Ok(Value::BoolVec(raw.iter().map(|&b| b != 0).collect()))
            }
            tag::BYTE => {
                let n = self.count()?;
                Ok(Value::ByteVec(self.take(n)?.to_vec()))
            }
            tag::SHORT => {
                let n = self.count()?;
                Ok(Value::ShortVec(self.collect(n, Cursor::i16)?))
            }
            tag::INT => Ok(Value::IntVec(self.i32_vec()?)),
            tag::MONTH => Ok(Value::MonthVec(self.i32_vec()?)),
            tag::DATE => Ok(Value::DateVec(self.i32_vec()?)),
            tag::MINUTE => Ok(Value::MinuteVec(self.i32_vec()?)),
            tag::SECOND => Ok(Value::SecondVec(self.i32_vec()?)),
            tag::TIME => Ok(Value::TimeVec(self.i32_vec()?)),
            tag::LONG => Ok(Value::LongVec(self.i64_vec()?)),
            tag::TIMESTAMP => Ok(Value::TimestampVec(self.i64_vec()?)),
            tag::TIMESPAN => Ok(Value::TimespanVec(self.i64_vec()?)),
            tag::REAL => {
                let n = self.count()?;
                Ok(Value::RealVec(self.collect(n, Cursor::f32)?))
            }
            tag::FLOAT => Ok(Value::FloatVec(self.f64_vec()?)),
            tag::DATETIME => Ok(Value::DateTimeVec(self.f64_vec()?)),
            tag::CHAR => {
                let n = self.count()?;
                let raw = self.take(n)?;
                Ok(Value::CharVec(self.encoding.decode(raw)?))
            }
            tag::SYMBOL => {
                let n = self.count()?;
                self.collect(n, Cursor::sym).map(Value::SymbolVec)
            }

            tag::DICT => {
                let keys = self.value()?;
                let values = self.value()?;
                Ok(Value::Dict(Box::new(Dict::new(keys, values))))
            }
            tag::TABLE => {
                let names = match self.value()? {
                    Value::SymbolVec(names) => names,
                    _ => return Err(WireError::Corrupt("table name vector is not symbols")),
                };
                let columns = match self.value()? {
                    Value::List(cols) => cols,
                    _ => return Err(WireError::Corrupt("table columns are not a list")),
                };
                Ok(Value::Table(Box::new(Table::new(names, columns)?)))
            }

            other => Err(WireError::UnsupportedTag(other)),
        }
    }

    fn collect<T>(
        &mut self,
        n: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, WireError>,
    ) -> Result<Vec<T>, WireError> {
        let mut out = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            out.push(read(self)?);
        }
        Ok(out)
    }

    fn i32_vec(&mut self) -> Result<Vec<i32>, WireError> {
        let n = self.count()?;
        self.collect(n, Cursor::i32)
    }

    fn i64_vec(&mut self) -> Result<Vec<i64>, WireError> {
        let n = self.count()?;
        self.collect(n, Cursor::i64)
    }

    fn f64_vec(&mut self) -> Result<Vec<f64>, WireError> {
        let n = self.count()?;
        self.collect(n, Cursor::f64)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
