//! Common test utilities for the relay tests
//!
//! Packets are assembled byte by byte so the codec under test never builds
//! its own inputs.

#![allow(dead_code)] // Not every test file uses every helper

use bifrost::dns::{DNSHeader, DNSQuestion, DNSResource, DNSResourceType, HEADER_LEN};
use bifrost::matcher::Matchers;
use bifrost::{Outbound, Relay, Target};
use std::net::{Ipv4Addr, SocketAddr};

pub const SUFFIX: &str = ".n.yiz.me";

pub fn client_addr() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}

pub fn upstream_addr() -> SocketAddr {
    "198.51.100.53:53".parse().unwrap()
}

/// Uncompressed wire form of `name`.
pub fn wire_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

/// Builds a DNS message section by section.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    id: u16,
    flags: u16,
    counts: [u16; 4],
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn query(id: u16) -> Self {
        Self {
            id,
            flags: 0x0100, // RD
            counts: [0; 4],
            body: Vec::new(),
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            flags: 0x8180, // QR, RD, RA
            counts: [0; 4],
            body: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Current offset of the next byte, for building compression pointers.
    pub fn offset(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    pub fn question(mut self, name: &str, qtype: u16) -> Self {
        self.body.extend_from_slice(&wire_name(name));
        self.body.extend_from_slice(&qtype.to_be_bytes());
        self.body.extend_from_slice(&1u16.to_be_bytes());
        self.counts[0] += 1;
        self
    }

    /// Question with an already-encoded name.
    pub fn question_raw(mut self, name: &[u8], qtype: u16) -> Self {
        self.body.extend_from_slice(name);
        self.body.extend_from_slice(&qtype.to_be_bytes());
        self.body.extend_from_slice(&1u16.to_be_bytes());
        self.counts[0] += 1;
        self
    }

    /// Answer record with an already-encoded owner name.
    pub fn answer_raw(mut self, owner: &[u8], rtype: u16, ttl: u32, rdata: &[u8]) -> Self {
        self.push_record(owner, rtype, 1, ttl, rdata);
        self.counts[1] += 1;
        self
    }

    pub fn answer(self, owner: &str, rtype: u16, ttl: u32, rdata: &[u8]) -> Self {
        let owner = wire_name(owner);
        self.answer_raw(&owner, rtype, ttl, rdata)
    }

    pub fn a(self, owner: &str, addr: Ipv4Addr, ttl: u32) -> Self {
        self.answer(owner, 1, ttl, &addr.octets())
    }

    pub fn cname(self, owner: &str, target: &str, ttl: u32) -> Self {
        self.answer(owner, 5, ttl, &wire_name(target))
    }

    pub fn authority(mut self, owner: &str, rtype: u16, ttl: u32, rdata: &[u8]) -> Self {
        self.push_record(&wire_name(owner), rtype, 1, ttl, rdata);
        self.counts[2] += 1;
        self
    }

    /// EDNS OPT pseudo-record in the additional section.
    pub fn opt(mut self, udp_size: u16) -> Self {
        self.push_record(&[0], 41, udp_size, 0, &[]);
        self.counts[3] += 1;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        for count in self.counts {
            out.extend_from_slice(&count.to_be_bytes());
        }
        out.extend_from_slice(&self.body);
        out
    }

    fn push_record(&mut self, owner: &[u8], rtype: u16, class: u16, ttl: u32, rdata: &[u8]) {
        self.body.extend_from_slice(owner);
        self.body.extend_from_slice(&rtype.to_be_bytes());
        self.body.extend_from_slice(&class.to_be_bytes());
        self.body.extend_from_slice(&ttl.to_be_bytes());
        self.body.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.body.extend_from_slice(rdata);
    }
}

/// A message decoded with the crate's own codec, for assertions.
#[derive(Debug)]
pub struct Decoded {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub records: Vec<DNSResource>,
    pub raw: Vec<u8>,
}

impl Decoded {
    pub fn parse(raw: &[u8]) -> Self {
        let header = DNSHeader::parse(raw).unwrap();
        let mut cursor = HEADER_LEN;
        let mut questions = Vec::new();
        for _ in 0..header.qdcount {
            let (question, next) = DNSQuestion::read(raw, cursor).unwrap();
            questions.push(question);
            cursor = next;
        }
        let mut records = Vec::new();
        for _ in 0..header.record_count() {
            let (record, next) = DNSResource::read(raw, cursor).unwrap();
            records.push(record);
            cursor = next;
        }
        assert_eq!(cursor, raw.len(), "trailing bytes after last record");
        Self {
            header,
            questions,
            records,
            raw: raw.to_vec(),
        }
    }

    pub fn rdata(&self, index: usize) -> &[u8] {
        self.records[index].rdata(&self.raw)
    }

    /// Decode an rdata that is a single domain name.
    pub fn rdata_name(&self, index: usize) -> String {
        let range = self.records[index].rdata.clone();
        bifrost::dns::decode_name(&self.raw, range.start, range.end)
            .unwrap()
            .0
    }

    pub fn record_names(&self) -> Vec<(String, DNSResourceType)> {
        self.records
            .iter()
            .map(|r| (r.name.clone(), r.rtype))
            .collect()
    }
}

pub fn relay_with(matchers: Matchers) -> Relay {
    Relay::new(SUFFIX, matchers)
}

/// Send `query` through the relay and return the single upstream datagram.
pub fn forward(relay: &mut Relay, query: &[u8]) -> Vec<u8> {
    let out = relay.handle_datagram(query, client_addr());
    assert_eq!(out.len(), 1, "expected exactly one upstream datagram");
    assert_eq!(out[0].target, Target::Upstream);
    out[0].payload.to_vec()
}

/// Build the upstream answer to `forwarded` via `build`, which receives the
/// generated identifier.
pub fn answer_to(forwarded: &[u8], build: impl FnOnce(u16) -> MessageBuilder) -> Vec<u8> {
    let id = u16::from_be_bytes([forwarded[0], forwarded[1]]);
    build(id).build()
}

pub fn single_client_delivery(out: &[Outbound]) -> Vec<u8> {
    assert_eq!(out.len(), 1, "expected exactly one client datagram");
    assert_eq!(out[0].target, Target::Client(client_addr()));
    out[0].payload.to_vec()
}
