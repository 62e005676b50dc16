use super::{
    enums::DNSResourceType,
    name::{decode_name, decode_u16, encode_fixed, encode_name},
};
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    pub name: String,
    pub qtype: DNSResourceType,
    pub qclass: u16,
}

impl DNSQuestion {
    /// Decode one question entry at `cursor`.
    pub fn read(packet: &[u8], cursor: usize) -> Result<(Self, usize)> {
        let end = packet.len();
        let (name, cursor) = decode_name(packet, cursor, end)?;
        let (qtype, cursor) = decode_u16(packet, cursor, end)?;
        let (qclass, cursor) = decode_u16(packet, cursor, end)?;
        Ok((
            DNSQuestion {
                name,
                qtype: qtype.into(),
                qclass,
            },
            cursor,
        ))
    }

    /// Encode this question under `name`, which replaces the decoded one.
    pub fn write_as(&self, out: &mut Vec<u8>, name: &str) -> Result<()> {
        encode_name(out, name)?;
        encode_fixed(out, &u16::from(self.qtype).to_be_bytes());
        encode_fixed(out, &self.qclass.to_be_bytes());
        Ok(())
    }
}
