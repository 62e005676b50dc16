use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{HEADER_LEN, common::PacketComponent};
use crate::error::{DnsError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DNSHeader {
    /// Decode the fixed 12-byte header at the start of `packet`.
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < HEADER_LEN {
            return Err(DnsError::InvalidHeader);
        }
        let mut reader = BitReader::<_, BigEndian>::new(&packet[..HEADER_LEN]);
        let mut header = DNSHeader::default();
        header.read(&mut reader)?;
        Ok(header)
    }

    /// Append the encoded header to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(out);
        self.write(&mut writer)
    }

    /// Number of resource records following the question section.
    pub fn record_count(&self) -> usize {
        self.ancount as usize + self.nscount as usize + self.arcount as usize
    }

    pub fn is_response(&self) -> bool {
        self.qr
    }
}

impl PacketComponent for DNSHeader {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>) -> Result<()> {
        writer.write_var::<u16>(16, self.id)?;
        writer.write_var::<u8>(1, self.qr as u8)?;
        writer.write_var::<u8>(4, self.opcode)?;
        writer.write_var::<u8>(1, self.aa as u8)?;
        writer.write_var::<u8>(1, self.tc as u8)?;
        writer.write_var::<u8>(1, self.rd as u8)?;
        writer.write_var::<u8>(1, self.ra as u8)?;
        writer.write_var::<u8>(3, self.z)?;
        writer.write_var::<u8>(4, self.rcode)?;
        writer.write_var::<u16>(16, self.qdcount)?;
        writer.write_var::<u16>(16, self.ancount)?;
        writer.write_var::<u16>(16, self.nscount)?;
        writer.write_var::<u16>(16, self.arcount)?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<()> {
        self.id = reader.read_var::<u16>(16)?;
        self.qr = reader.read_var::<u8>(1)? == 1;
        self.opcode = reader.read_var::<u8>(4)?;
        self.aa = reader.read_var::<u8>(1)? == 1;
        self.tc = reader.read_var::<u8>(1)? == 1;
        self.rd = reader.read_var::<u8>(1)? == 1;
        self.ra = reader.read_var::<u8>(1)? == 1;
        self.z = reader.read_var::<u8>(3)?;
        self.rcode = reader.read_var::<u8>(4)?;
        self.qdcount = reader.read_var::<u16>(16)?;
        self.ancount = reader.read_var::<u16>(16)?;
        self.nscount = reader.read_var::<u16>(16)?;
        self.arcount = reader.read_var::<u16>(16)?;
        Ok(())
    }
}
