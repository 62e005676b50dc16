//! Whole-message rewriting in each direction.

use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::dns::{
    DNSHeader, DNSQuestion, DNSResource, DNSResourceType, HEADER_LEN, WORK_BUFFER_SIZE,
    append_suffix, rewrite_record, strip_suffix,
};
use crate::error::{DnsError, Result};
use crate::matcher::Matchers;

/// A client query with the suffix removed, ready for the upstream server.
#[derive(Debug, Clone)]
pub struct ForwardRewrite {
    pub header: DNSHeader,
    pub message: Vec<u8>,
    /// Questions as forwarded, with bare names.
    pub questions: Vec<DNSQuestion>,
    /// Offset of each question's type field inside `message`.
    pub qtype_offsets: Vec<usize>,
    /// The suffix as the client spelled it, when its case differs from the
    /// configured one.
    pub client_suffix: Option<String>,
}

/// One rewritten resource record, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub name: String,
    pub rtype: DNSResourceType,
    pub description: String,
}

/// An upstream response with the suffix restored.
#[derive(Debug, Clone)]
pub struct BackwardRewrite {
    pub header: DNSHeader,
    pub message: Vec<u8>,
    /// Questions as received from upstream, with bare names.
    pub questions: Vec<DNSQuestion>,
    /// Set when an answer was classified as fake.
    pub traced: bool,
    pub has_aaaa: bool,
    pub records: Vec<RecordSummary>,
}

impl BackwardRewrite {
    /// Single AAAA question that came back without any AAAA record.
    pub fn needs_nat64_mapping(&self) -> bool {
        self.questions.len() == 1
            && self.questions[0].qtype == DNSResourceType::AAAA
            && !self.has_aaaa
    }
}

/// Strip `suffix` from every question. Records carried by the query (EDNS
/// OPT and the like) are re-encoded with only their owner name touched.
pub fn rewrite_query(packet: &[u8], suffix: &str) -> Result<ForwardRewrite> {
    let header = DNSHeader::parse(packet)?;
    let mut out = Vec::with_capacity(packet.len());
    let mut forwarded = header.clone();
    forwarded.rd = true;
    forwarded.write_to(&mut out)?;

    let mut cursor = HEADER_LEN;
    let mut questions = Vec::new();
    let mut qtype_offsets = Vec::new();
    let mut client_suffix = None;
    for _ in 0..header.qdcount {
        let (mut question, next) = DNSQuestion::read(packet, cursor)?;
        cursor = next;
        let bare = strip_suffix(&question.name, suffix)
            .ok_or_else(|| DnsError::SuffixMismatch(question.name.clone()))?
            .to_string();
        if questions.is_empty() {
            let tail = &question.name[bare.len()..];
            if tail != suffix {
                client_suffix = Some(tail.to_string());
            }
        }
        trace!(
            "query name: {}, type {}, class {}",
            bare, question.qtype, question.qclass
        );
        question.write_as(&mut out, &bare)?;
        qtype_offsets.push(out.len() - 4);
        question.name = bare;
        questions.push(question);
    }

    for _ in 0..header.record_count() {
        let (record, next) = DNSResource::read(packet, cursor)?;
        cursor = next;
        let owner = strip_suffix(&record.name, suffix).unwrap_or(&record.name);
        record.write_head(&mut out, owner)?;
        rewrite_record(record.rtype, &mut out, packet, record.rdata.clone(), None)?;
    }

    check_work_size(&out)?;
    Ok(ForwardRewrite {
        header,
        message: out,
        questions,
        qtype_offsets,
        client_suffix,
    })
}

/// Restore `suffix` on the questions and on every record owned by a name in
/// the alias chain. When an A record is classified as fake, CNAME targets
/// get the suffix too and join the chain.
pub fn rewrite_response(packet: &[u8], suffix: &str, matchers: &Matchers) -> Result<BackwardRewrite> {
    let header = DNSHeader::parse(packet)?;
    let mut out = Vec::with_capacity(packet.len() * 2);
    header.write_to(&mut out)?;

    let mut cursor = HEADER_LEN;
    let mut aliases: Vec<String> = Vec::new();
    let mut questions = Vec::new();
    let mut local_query = false;
    for _ in 0..header.qdcount {
        let (question, next) = DNSQuestion::read(packet, cursor)?;
        cursor = next;
        local_query |= matchers.local_domain.is_domain_match(&question.name);
        let wrapped = append_suffix(&question.name, suffix);
        trace!(
            "answer for: {}, type {}, class {}",
            wrapped, question.qtype, question.qclass
        );
        question.write_as(&mut out, &wrapped)?;
        aliases.push(question.name.clone());
        questions.push(question);
    }

    let count = header.record_count();
    let traced = !local_query && has_fake_answer(packet, cursor, count, matchers)?;

    let mut records = Vec::new();
    let mut has_aaaa = false;
    for _ in 0..count {
        let (record, next) = DNSResource::read(packet, cursor)?;
        cursor = next;

        let owner = if aliases.iter().any(|a| a.eq_ignore_ascii_case(&record.name)) {
            append_suffix(&record.name, suffix)
        } else {
            record.name.clone()
        };
        record.write_head(&mut out, &owner)?;
        let rewrite = rewrite_record(
            record.rtype,
            &mut out,
            packet,
            record.rdata.clone(),
            traced.then_some(suffix),
        )?;
        debug!("rr {} {} {}", record.rtype, owner, rewrite.description);

        has_aaaa |= record.rtype == DNSResourceType::AAAA;
        if let Some(alias) = rewrite.alias {
            aliases.push(alias);
        }
        records.push(RecordSummary {
            name: owner,
            rtype: record.rtype,
            description: rewrite.description,
        });
    }

    check_work_size(&out)?;
    Ok(BackwardRewrite {
        header,
        message: out,
        questions,
        traced,
        has_aaaa,
        records,
    })
}

/// First pass over the records: does any A record point into the fake
/// stores? Addresses in the local stores never count.
fn has_fake_answer(packet: &[u8], mut cursor: usize, count: usize, matchers: &Matchers) -> Result<bool> {
    for _ in 0..count {
        let (record, next) = DNSResource::read(packet, cursor)?;
        cursor = next;
        if record.rtype != DNSResourceType::A {
            continue;
        }
        let rdata = record.rdata(packet);
        let Ok(octets) = <[u8; 4]>::try_from(rdata) else {
            continue;
        };
        let addr = Ipv4Addr::from(octets);
        if matchers.local_ip.contains(addr) {
            continue;
        }
        if matchers.fake_ip.contains(addr) || matchers.fake_domain.is_domain_match(&record.name) {
            debug!("fake answer {} {}, tracing cname chain", record.name, addr);
            return Ok(true);
        }
    }
    Ok(false)
}

fn check_work_size(out: &[u8]) -> Result<()> {
    if out.len() > WORK_BUFFER_SIZE {
        return Err(DnsError::BufferTooSmall {
            need: out.len(),
            have: WORK_BUFFER_SIZE,
        });
    }
    Ok(())
}
