//! Domain name and fixed-width field codec.
//!
//! All cursors are absolute offsets into the original packet so that
//! compression pointers can be resolved against it. Decoded names are
//! dot-joined text without a trailing dot; the root name decodes to `""`.
//!
//! Labels are arbitrary bytes on the wire. Text form escapes them the way
//! zone files do: `\.` and `\\` for a literal dot or backslash inside a
//! label, `\DDD` (three decimal digits) for any byte outside printable
//! ASCII. Decoding followed by encoding reproduces the original bytes.

use crate::error::{DnsError, Result};

pub const MAX_LABEL_LEN: usize = 63;
/// Longest encoded name on the wire, including length bytes and the root.
pub const MAX_ENCODED_NAME: usize = 255;
/// Longest text form of a valid name, with every byte escaped as `\DDD`.
pub const MAX_NAME_TEXT: usize = 4 * MAX_ENCODED_NAME;
/// A valid 255-byte name holds at most 127 labels, so no legitimate name
/// needs more pointer hops than that.
const MAX_POINTER_HOPS: usize = 127;

const POINTER_MASK: u8 = 0xC0;

/// Text being assembled plus the wire length it stands for.
struct NameText {
    text: String,
    wire: usize,
}

/// Decode a possibly compressed name starting at `cursor`, reading labels no
/// further than `end`. Returns the name text and the cursor just past the
/// name as it appears at `cursor` (a pointer consumes two bytes).
pub fn decode_name(packet: &[u8], cursor: usize, end: usize) -> Result<(String, usize)> {
    let end = end.min(packet.len());
    let mut name = NameText {
        text: String::new(),
        wire: 1,
    };
    let next = read_labels(packet, cursor, end, &mut name, 0)?;
    Ok((name.text, next))
}

fn read_labels(
    packet: &[u8],
    mut pos: usize,
    end: usize,
    name: &mut NameText,
    hops: usize,
) -> Result<usize> {
    loop {
        if pos >= end {
            return Err(DnsError::Truncated { offset: pos, need: 1 });
        }
        let len = packet[pos];
        match len & POINTER_MASK {
            0x00 => {
                pos += 1;
                if len == 0 {
                    return Ok(pos);
                }
                let len = len as usize;
                if pos + len > end {
                    return Err(DnsError::Truncated { offset: pos, need: len });
                }
                push_label(name, &packet[pos..pos + len])?;
                pos += len;
            }
            POINTER_MASK => {
                if pos + 2 > end {
                    return Err(DnsError::Truncated { offset: pos, need: 2 });
                }
                let target = (((len & 0x3F) as usize) << 8) | packet[pos + 1] as usize;
                // Targets must point strictly backwards, which rules out loops.
                if target >= pos || target >= packet.len() {
                    return Err(DnsError::InvalidPointer { at: pos, target });
                }
                if hops >= MAX_POINTER_HOPS {
                    return Err(DnsError::MalformedName(pos));
                }
                read_labels(packet, target, packet.len(), name, hops + 1)?;
                return Ok(pos + 2);
            }
            // 0x40 and 0x80 are extended label types, never valid here
            _ => return Err(DnsError::MalformedName(pos)),
        }
    }
}

fn push_label(name: &mut NameText, label: &[u8]) -> Result<()> {
    name.wire += 1 + label.len();
    if name.wire > MAX_ENCODED_NAME {
        return Err(DnsError::NameTooLong);
    }
    if !name.text.is_empty() {
        name.text.push('.');
    }
    for &b in label {
        match b {
            b'.' | b'\\' => {
                name.text.push('\\');
                name.text.push(b as char);
            }
            0x21..=0x7E => name.text.push(b as char),
            _ => {
                name.text.push('\\');
                name.text.push_str(&format!("{:03}", b));
            }
        }
    }
    Ok(())
}

/// Borrow `size` bytes at `cursor`, failing if that would cross `end`.
pub fn decode_fixed(packet: &[u8], size: usize, cursor: usize, end: usize) -> Result<(&[u8], usize)> {
    let end = end.min(packet.len());
    match cursor.checked_add(size) {
        Some(next) if next <= end => Ok((&packet[cursor..next], next)),
        _ => Err(DnsError::Truncated {
            offset: cursor,
            need: size,
        }),
    }
}

pub fn decode_u16(packet: &[u8], cursor: usize, end: usize) -> Result<(u16, usize)> {
    let (bytes, next) = decode_fixed(packet, 2, cursor, end)?;
    Ok((u16::from_be_bytes([bytes[0], bytes[1]]), next))
}

pub fn decode_u32(packet: &[u8], cursor: usize, end: usize) -> Result<(u32, usize)> {
    let (bytes, next) = decode_fixed(packet, 4, cursor, end)?;
    Ok((
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        next,
    ))
}

/// Encode `name` fully expanded. Empty labels (leading, trailing or doubled
/// dots) are skipped, so `""` and `"."` both encode the root.
pub fn encode_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    let start = out.len();
    let result = write_labels(out, name.as_bytes());
    if result.is_err() {
        out.truncate(start);
    } else if out.len() - start > MAX_ENCODED_NAME {
        out.truncate(start);
        return Err(DnsError::NameTooLong);
    }
    result
}

fn write_labels(out: &mut Vec<u8>, text: &[u8]) -> Result<()> {
    let mut label_at = out.len();
    out.push(0);
    let mut i = 0;
    while i < text.len() {
        let b = match text[i] {
            b'.' => {
                close_label(out, label_at)?;
                label_at = out.len();
                out.push(0);
                i += 1;
                continue;
            }
            b'\\' => {
                let (b, used) = unescape(&text[i + 1..]).ok_or(DnsError::MalformedName(i))?;
                i += 1 + used;
                b
            }
            b => {
                i += 1;
                b
            }
        };
        out.push(b);
    }
    close_label(out, label_at)?;
    out.push(0);
    Ok(())
}

/// Patch the length byte at `label_at`, dropping the label if it is empty.
fn close_label(out: &mut Vec<u8>, label_at: usize) -> Result<()> {
    let len = out.len() - label_at - 1;
    if len == 0 {
        out.truncate(label_at);
    } else if len > MAX_LABEL_LEN {
        return Err(DnsError::LabelTooLong(len));
    } else {
        out[label_at] = len as u8;
    }
    Ok(())
}

/// The byte an escape stands for and how many bytes after the backslash it
/// used.
fn unescape(rest: &[u8]) -> Option<(u8, usize)> {
    match rest {
        [d0, d1, d2, ..] if d0.is_ascii_digit() && d1.is_ascii_digit() && d2.is_ascii_digit() => {
            let value =
                (d0 - b'0') as u16 * 100 + (d1 - b'0') as u16 * 10 + (d2 - b'0') as u16;
            u8::try_from(value).ok().map(|b| (b, 3))
        }
        [d, ..] if d.is_ascii_digit() => None,
        [b, ..] => Some((*b, 1)),
        [] => None,
    }
}

/// Whether the byte at `at` is preceded by an odd run of backslashes, i.e.
/// is escaped.
pub fn is_escaped(text: &[u8], at: usize) -> bool {
    text[..at].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

pub fn encode_fixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
}

/// Strip `suffix` (e.g. `.n.yiz.me`) from the end of `name`. The name must
/// be strictly longer than the suffix, the suffix must start on a real
/// label boundary, and comparison ignores ASCII case.
pub fn strip_suffix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() || name.len() <= suffix.len() {
        return None;
    }
    let cut = name.len() - suffix.len();
    if !name.is_char_boundary(cut) || is_escaped(name.as_bytes(), cut) {
        return None;
    }
    let (head, tail) = name.split_at(cut);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

pub fn append_suffix(name: &str, suffix: &str) -> String {
    let mut out = String::with_capacity(name.len() + suffix.len());
    out.push_str(name);
    out.push_str(suffix);
    out
}
