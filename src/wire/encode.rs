use bytes::{BufMut, Bytes, BytesMut};

use super::value::Value;
use super::{MessageKind, TextEncoding, WireError, HEADER_LEN};

// -----------------------------------------------------------------------------
// ----- encode_frame ----------------------------------------------------------

/// Builds a full frame for `value` with the given message kind. The length
/// prefix covers the header itself.
pub fn encode_frame(
    kind: MessageKind,
    value: &Value,
    encoding: TextEncoding,
) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_u8(1); // little-endian
    buf.put_u8(kind.as_byte());
    buf.put_u8(0); // not compressed
    buf.put_u8(0); // reserved
    buf.put_u32_le(0); // length backfilled below

    encode_value(value, encoding, &mut buf)?;

    let total = buf.len();
    if total > u32::MAX as usize {
        return Err(WireError::Oversized { len: total });
    }
    buf[4..HEADER_LEN].copy_from_slice(&(total as u32).to_le_bytes());

    Ok(buf.freeze())
}

// -----------------------------------------------------------------------------
// ----- encode_value ----------------------------------------------------------

/// Tag byte, then payload. One arm per variant of the closed value model.
pub fn encode_value(
    value: &Value,
    encoding: TextEncoding,
    buf: &mut BytesMut,
) -> Result<(), WireError> {
    buf.put_i8(value.tag());

    match value {
        Value::Bool(v) => buf.put_u8(*v as u8),
        Value::Byte(v) => buf.put_u8(*v),
        Value::Short(v) => buf.put_i16_le(*v),
        Value::Int(v) | Value::Month(v) | Value::Date(v) => buf.put_i32_le(*v),
        Value::Minute(v) | Value::Second(v) | Value::Time(v) => buf.put_i32_le(*v),
        Value::Long(v) | Value::Timestamp(v) | Value::Timespan(v) => buf.put_i64_le(*v),
        Value::Real(v) => buf.put_f32_le(*v),
        Value::Float(v) | Value::DateTime(v) => buf.put_f64_le(*v),
        Value::Char(v) => put_char(*v, encoding, buf)?,
        Value::Symbol(v) => put_sym(v, encoding, buf)?,

        Value::BoolVec(v) => {
            put_count(v.len(), buf)?;
            for b in v {
                buf.put_u8(*b as u8);
            }
        }
        Value::ByteVec(v) => {
            put_count(v.len(), buf)?;
            buf.extend_from_slice(v);
        }
        Value::ShortVec(v) => {
            put_count(v.len(), buf)?;
            for x in v {
                buf.put_i16_le(*x);
            }
        }
        Value::IntVec(v)
        | Value::MonthVec(v)
        | Value::DateVec(v)
        | Value::MinuteVec(v)
        | Value::SecondVec(v)
        | Value::TimeVec(v) => {
            put_count(v.len(), buf)?;
            for x in v {
                buf.put_i32_le(*x);
            }
        }
        Value::LongVec(v) | Value::TimestampVec(v) | Value::TimespanVec(v) => {
            put_count(v.len(), buf)?;
            for x in v {
                buf.put_i64_le(*x);
            }
        }
        Value::RealVec(v) => {
            put_count(v.len(), buf)?;
            for x in v {
                buf.put_f32_le(*x);
            }
        }
        Value::FloatVec(v) | Value::DateTimeVec(v) => {
            put_count(v.len(), buf)?;
            for x in v {
                buf.put_f64_le(*x);
            }
        }
        Value::CharVec(v) => {
            // Char vectors count encoded bytes, not chars, so encode first.
            let mut body = BytesMut::with_capacity(v.len());
            encoding.encode_into(v, &mut body)?;
            put_count(body.len(), buf)?;
            buf.extend_from_slice(&body);
        }
        Value::SymbolVec(v) => {
            put_count(v.len(), buf)?;
            for s in v {
                put_sym(s, encoding, buf)?;
            }
        }

        Value::List(items) => {
            put_count(items.len(), buf)?;
            for item in items {
                encode_value(item, encoding, buf)?;
            }
        }
        Value::Dict(d) => {
            encode_value(&d.keys, encoding, buf)?;
            encode_value(&d.values, encoding, buf)?;
        }
        Value::Table(t) => {
            encode_value(
                &Value::SymbolVec(t.column_names().to_vec()),
                encoding,
                buf,
            )?;
            encode_value(&Value::List(t.columns().to_vec()), encoding, buf)?;
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn put_count(n: usize, buf: &mut BytesMut) -> Result<(), WireError> {
    if n > i32::MAX as usize {
        return Err(WireError::Oversized { len: n });
    }
    buf.put_i32_le(n as i32);
    Ok(())
}

#[inline]
fn put_sym(s: &str, encoding: TextEncoding, buf: &mut BytesMut) -> Result<(), WireError> {
    encoding.encode_into(s, buf)?;
    buf.put_u8(0);
    Ok(())
}

#[inline]
fn put_char(c: char, encoding: TextEncoding, buf: &mut BytesMut) -> Result<(), WireError> {
    // A char atom occupies exactly one byte on the wire.
    let code = c as u32;
    if code > 0xFF {
        return Err(WireError::Unencodable {
            encoding,
            text: c.to_string(),
        });
    }
    buf.put_u8(code as u8);
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
