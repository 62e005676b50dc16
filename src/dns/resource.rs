use std::ops::Range;

use super::{
    enums::DNSResourceType,
    name::{decode_fixed, decode_name, decode_u16, decode_u32, encode_fixed, encode_name},
};
use crate::error::Result;

/// A resource record whose rdata is left in place inside the packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub name: String,
    pub rtype: DNSResourceType,
    /// Raw class; OPT records carry the UDP payload size here.
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Range<usize>,
}

impl DNSResource {
    pub fn read(packet: &[u8], cursor: usize) -> Result<(Self, usize)> {
        let end = packet.len();
        let (name, cursor) = decode_name(packet, cursor, end)?;
        let (rtype, cursor) = decode_u16(packet, cursor, end)?;
        let (rclass, cursor) = decode_u16(packet, cursor, end)?;
        let (ttl, cursor) = decode_u32(packet, cursor, end)?;
        let (rdlength, cursor) = decode_u16(packet, cursor, end)?;
        let (_, next) = decode_fixed(packet, rdlength as usize, cursor, end)?;
        Ok((
            DNSResource {
                name,
                rtype: rtype.into(),
                rclass,
                ttl,
                rdata: cursor..next,
            },
            next,
        ))
    }

    pub fn rdata<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        &packet[self.rdata.clone()]
    }

    /// Encode owner name, type, class and TTL. The rdata length and body are
    /// written separately by the record rewriter.
    pub fn write_head(&self, out: &mut Vec<u8>, name: &str) -> Result<()> {
        encode_name(out, name)?;
        encode_fixed(out, &u16::from(self.rtype).to_be_bytes());
        encode_fixed(out, &self.rclass.to_be_bytes());
        encode_fixed(out, &self.ttl.to_be_bytes());
        Ok(())
    }
}
