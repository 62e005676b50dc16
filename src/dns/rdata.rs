//! Typed rdata rewriting.
//!
//! Names embedded in rdata are decoded against the original packet and
//! re-encoded without compression, so the rdata length can change. Every
//! shape writes a placeholder length first and patches it afterwards.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::Range;

use super::{
    enums::{DNSResourceType, RecordShape},
    name::{decode_name, encode_fixed, encode_name},
};
use crate::error::{DnsError, Result};

/// What the rewriter did with one record's rdata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordRewrite {
    /// Human readable rdata, for diagnostics.
    pub description: String,
    /// Bare CNAME target captured while tracing, before the suffix was added.
    pub alias: Option<String>,
}

/// Append the rdata length and body for a record of type `rtype` whose rdata
/// occupies `rdata` in `packet`. When `trace_suffix` is set, CNAME targets
/// get that suffix appended and are reported back as aliases.
pub fn rewrite_record(
    rtype: DNSResourceType,
    out: &mut Vec<u8>,
    packet: &[u8],
    rdata: Range<usize>,
    trace_suffix: Option<&str>,
) -> Result<RecordRewrite> {
    if rdata.start > rdata.end || rdata.end > packet.len() {
        return Err(DnsError::Truncated {
            offset: rdata.start,
            need: rdata.end.saturating_sub(rdata.start),
        });
    }

    let start = out.len();
    let result = match rtype.shape() {
        RecordShape::SingleName => rewrite_single_name(rtype, out, packet, rdata, trace_suffix),
        RecordShape::DualName => rewrite_dual_name(out, packet, rdata),
        RecordShape::Opaque => rewrite_opaque(rtype, out, &packet[rdata]),
    };
    if result.is_err() {
        out.truncate(start);
    }
    result
}

fn rewrite_single_name(
    rtype: DNSResourceType,
    out: &mut Vec<u8>,
    packet: &[u8],
    rdata: Range<usize>,
    trace_suffix: Option<&str>,
) -> Result<RecordRewrite> {
    let len_at = reserve_length(out);
    let (mut target, rest) = decode_name(packet, rdata.start, rdata.end)?;

    let mut alias = None;
    if let (DNSResourceType::CNAME, Some(suffix)) = (rtype, trace_suffix) {
        alias = Some(target.clone());
        target.push_str(suffix);
    }

    encode_name(out, &target)?;
    encode_fixed(out, &packet[rest..rdata.end]);
    patch_length(out, len_at)?;

    Ok(RecordRewrite {
        description: target,
        alias,
    })
}

fn rewrite_dual_name(out: &mut Vec<u8>, packet: &[u8], rdata: Range<usize>) -> Result<RecordRewrite> {
    let len_at = reserve_length(out);
    let (mname, cursor) = decode_name(packet, rdata.start, rdata.end)?;
    encode_name(out, &mname)?;
    let (rname, rest) = decode_name(packet, cursor, rdata.end)?;
    encode_name(out, &rname)?;
    // serial, refresh, retry, expire, minimum
    encode_fixed(out, &packet[rest..rdata.end]);
    patch_length(out, len_at)?;

    Ok(RecordRewrite {
        description: format!("{} {}", mname, rname),
        alias: None,
    })
}

fn rewrite_opaque(rtype: DNSResourceType, out: &mut Vec<u8>, rdata: &[u8]) -> Result<RecordRewrite> {
    let len = u16::try_from(rdata.len()).map_err(|_| DnsError::BufferTooSmall {
        need: rdata.len(),
        have: u16::MAX as usize,
    })?;
    encode_fixed(out, &len.to_be_bytes());
    encode_fixed(out, rdata);

    let description = match (rtype, rdata.len()) {
        (DNSResourceType::A, 4) => Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string(),
        (DNSResourceType::AAAA, 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ipv6Addr::from(octets).to_string()
        }
        (_, n) => format!("{} bytes", n),
    };
    Ok(RecordRewrite {
        description,
        alias: None,
    })
}

fn reserve_length(out: &mut Vec<u8>) -> usize {
    let at = out.len();
    out.extend_from_slice(&[0, 0]);
    at
}

fn patch_length(out: &mut [u8], len_at: usize) -> Result<()> {
    let body = out.len() - len_at - 2;
    let len = u16::try_from(body).map_err(|_| DnsError::BufferTooSmall {
        need: body,
        have: u16::MAX as usize,
    })?;
    out[len_at..len_at + 2].copy_from_slice(&len.to_be_bytes());
    Ok(())
}
