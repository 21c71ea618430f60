//! Block compression for large frames. The scheme keeps a 256-slot table
//! from a byte-pair hash to a prior offset; a control bitmask, one bit per
//! symbol in 8-bit groups, picks literal copy vs a back-reference of two
//! bytes plus a variable run. A compressed frame carries the compressed
//! total length in its header and the uncompressed total length in the four
//! bytes that follow it.

use super::{ByteOrder, WireError, HEADER_LEN};

// Worst case per 8-symbol group: one flag byte plus eight two-byte refs.
const GROUP_MAX: usize = 17;

// -----------------------------------------------------------------------------
// ----- compress_frame --------------------------------------------------------

/// Compresses a complete little-endian frame (header included). Returns
/// `None` when the result would not fit in half the input, in which case the
/// caller sends the frame uncompressed.
pub fn compress_frame(src: &[u8]) -> Option<Vec<u8>> {
    let t = src.len();
    let e = t / 2;
    if t < HEADER_LEN + 4 || e < 12 + GROUP_MAX {
        return None;
    }

    let mut out = vec![0u8; e];
    out[..4].copy_from_slice(&src[..4]);
    out[2] = 1;
    out[8..12].copy_from_slice(&(t as u32).to_le_bytes());

    let mut table = [0usize; 256];
    let mut flags: u32 = 0;
    let mut bit: u32 = 0;
    // Deferred insertion of the previous literal's pair hash.
    let mut pending_hash = 0usize;
    let mut pending_pos = 0usize;
    let mut hash = 0usize;
    let mut flag_at = 12usize;
    let mut d = 12usize;
    let mut s = HEADER_LEN;

    while s < t {
        if bit == 0 {
            if d + GROUP_MAX > e {
                return None;
            }
            bit = 1;
            out[flag_at] = flags as u8;
            flag_at = d;
            d += 1;
            flags = 0;
        }

        let mut p = 0usize;
        let mut literal = s > t - 3;
        if !literal {
            hash = (src[s] ^ src[s + 1]) as usize;
            p = table[hash];
            literal = p == 0 || src[s] != src[p];
        }
        if pending_pos > 0 {
            table[pending_hash] = pending_pos;
            pending_pos = 0;
        }

        if literal {
            pending_hash = hash;
            pending_pos = s;
            out[d] = src[s];
            d += 1;
            s += 1;
        } else {
            table[hash] = s;
            flags |= bit;
            let mut m = p + 2;
            s += 2;
            let run_start = s;
            let limit = (s + 255).min(t);
            loop {
                if src[m] != src[s] {
                    break;
                }
                s += 1;
                if s >= limit {
                    break;
                }
                m += 1;
            }
            out[d] = hash as u8;
            out[d + 1] = (s - run_start) as u8;
            d += 2;
        }

        bit <<= 1;
        if bit == 256 {
            bit = 0;
        }
    }

    out[flag_at] = flags as u8;
    out[4..8].copy_from_slice(&(d as u32).to_le_bytes());
    out.truncate(d);
    Some(out)
}

// -----------------------------------------------------------------------------
// ----- decompress_payload ----------------------------------------------------

/// Inflates the body of a compressed frame (everything after the 8-byte
/// header) and returns the uncompressed payload. The output must land
/// byte-exact on the declared length or the message is corrupt.
pub fn decompress_payload(body: &[u8], order: ByteOrder) -> Result<Vec<u8>, WireError> {
    if body.len() < 4 {
        return Err(WireError::Truncated { needed: 4 });
    }
    let total = order.read_u32([body[0], body[1], body[2], body[3]]) as usize;
    if total < HEADER_LEN {
        return Err(WireError::Corrupt("uncompressed length shorter than a header"));
    }

    // dst mirrors the full uncompressed frame so back-reference offsets stay
    // absolute; the header region is never read or produced.
    let mut dst = vec![0u8; total];
    let mut table = [0usize; 256];
    let mut d = 4usize;
    let mut s = HEADER_LEN;
    let mut p = HEADER_LEN;
    let mut flags: u32 = 0;
    let mut bit: u32 = 0;

    while s < total {
        if bit == 0 {
            flags = *body.get(d).ok_or(WireError::Truncated { needed: 1 })? as u32;
            d += 1;
            bit = 1;
        }

        let run_len;
        if flags & bit != 0 {
            let slot = *body.get(d).ok_or(WireError::Truncated { needed: 1 })? as usize;
            d += 1;
            let mut r = table[slot];
            if r < HEADER_LEN || r + 1 >= s {
                return Err(WireError::Corrupt("back-reference before written output"));
            }
            if s + 1 >= total {
                return Err(WireError::Corrupt("back-reference overruns declared length"));
            }
            dst[s] = dst[r];
            dst[s + 1] = dst[r + 1];
            s += 2;
            r += 2;
            run_len = *body.get(d).ok_or(WireError::Truncated { needed: 1 })? as usize;
            d += 1;
            if s + run_len > total {
                return Err(WireError::Corrupt("run overruns declared length"));
            }
            // Runs may overlap their source; copy byte by byte.
            for m in 0..run_len {
                dst[s + m] = dst[r + m];
            }
        } else {
            dst[s] = *body.get(d).ok_or(WireError::Truncated { needed: 1 })?;
            d += 1;
            s += 1;
            run_len = 0;
        }

        while p < s - 1 {
            table[(dst[p] ^ dst[p + 1]) as usize] = p;
            p += 1;
        }
        if flags & bit != 0 {
            s += run_len;
            p = s;
        }

        bit <<= 1;
        if bit == 256 {
            bit = 0;
        }
    }

    if s != total {
        return Err(WireError::Corrupt("decompressed output is not byte-exact"));
    }

    dst.drain(..HEADER_LEN);
    Ok(dst)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
