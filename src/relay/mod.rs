//! The forwarding engine.
//!
//! [`Relay`] turns one inbound datagram into zero or more outbound ones. It
//! does no I/O of its own; the server loop feeds it datagrams from either
//! socket and sends whatever it returns. Queries (QR clear) come from
//! clients and go upstream with the suffix stripped; responses (QR set)
//! come from upstream and go back to the client recorded in the session
//! table with the suffix restored. Anything that fails to decode, lacks the
//! suffix or matches no live session is dropped without a reply.

pub mod nat64;
pub mod rewrite;

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

use crate::dns::{DNSHeader, DNSResourceType, set_message_id};
use crate::error::{DnsError, Result};
use crate::matcher::Matchers;
use crate::session::{SessionFlags, SessionTable};
use nat64::{DualStackMode, Nat64Hook};
use rewrite::{rewrite_query, rewrite_response};

/// Where an outbound datagram goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The configured upstream server, via the upstream socket.
    Upstream,
    /// A client, via the client-facing socket.
    Client(SocketAddr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub target: Target,
    pub payload: Bytes,
}

impl Outbound {
    fn upstream(payload: Vec<u8>) -> Self {
        Self {
            target: Target::Upstream,
            payload: Bytes::from(payload),
        }
    }

    fn client(addr: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            target: Target::Client(addr),
            payload: payload.into(),
        }
    }
}

pub type Outbounds = SmallVec<[Outbound; 2]>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub queries_forwarded: u64,
    pub pair_queries: u64,
    pub responses_delivered: u64,
    pub responses_held: u64,
    pub unexpected: u64,
    pub suffix_mismatch: u64,
    pub malformed: u64,
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forwarded={} paired={} delivered={} held={} unexpected={} suffix_mismatch={} malformed={}",
            self.queries_forwarded,
            self.pair_queries,
            self.responses_delivered,
            self.responses_held,
            self.unexpected,
            self.suffix_mismatch,
            self.malformed
        )
    }
}

struct DualStack {
    mode: DualStackMode,
    hook: Box<dyn Nat64Hook>,
}

pub struct Relay {
    suffix: String,
    matchers: Matchers,
    sessions: SessionTable,
    dual_stack: Option<DualStack>,
    stats: RelayStats,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("suffix", &self.suffix)
            .field("sessions", &self.sessions)
            .field("dual_stack", &self.dual_stack.as_ref().map(|d| d.mode))
            .field("stats", &self.stats)
            .finish()
    }
}

impl Relay {
    /// `suffix` is the literal tail clients append, leading dot included
    /// (e.g. `.n.yiz.me`).
    pub fn new(suffix: impl Into<String>, matchers: Matchers) -> Self {
        Self {
            suffix: suffix.into(),
            matchers,
            sessions: SessionTable::new(),
            dual_stack: None,
            stats: RelayStats::default(),
        }
    }

    pub fn with_sessions(mut self, sessions: SessionTable) -> Self {
        self.sessions = sessions;
        self
    }

    /// Pair single AAAA queries with a sibling A query and deliver answers
    /// according to `mode`.
    pub fn with_dual_stack(mut self, mode: DualStackMode, hook: Box<dyn Nat64Hook>) -> Self {
        self.dual_stack = Some(DualStack { mode, hook });
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Process one datagram, logging and counting anything that gets
    /// dropped.
    pub fn handle_datagram(&mut self, datagram: &[u8], source: SocketAddr) -> Outbounds {
        match self.process(datagram, source) {
            Ok(out) => out,
            Err(DnsError::SessionMiss(id)) => {
                self.stats.unexpected += 1;
                debug!("get unexpected response {:#06x} from {}, dropping", id, source);
                Outbounds::new()
            }
            Err(DnsError::SuffixMismatch(name)) => {
                self.stats.suffix_mismatch += 1;
                debug!(
                    "query for {} from {} lacks suffix {}, dropping",
                    name, source, self.suffix
                );
                Outbounds::new()
            }
            Err(e) => {
                self.stats.malformed += 1;
                debug!("dropping datagram from {}: {}", source, e);
                Outbounds::new()
            }
        }
    }

    /// Process one datagram, returning why it was dropped on failure.
    pub fn process(&mut self, datagram: &[u8], source: SocketAddr) -> Result<Outbounds> {
        let header = DNSHeader::parse(datagram)?;
        if header.is_response() {
            self.process_response(header.id, datagram)
        } else {
            self.process_query(datagram, source)
        }
    }

    fn process_query(&mut self, packet: &[u8], source: SocketAddr) -> Result<Outbounds> {
        let forward = rewrite_query(packet, &self.suffix)?;
        let client_ident = forward.header.id;

        let mut flags = SessionFlags::new(SessionFlags::OUTGOING | SessionFlags::SENDBACK);
        match forward.questions.first().map(|q| q.qtype) {
            Some(DNSResourceType::A) => flags.set(SessionFlags::IPV4),
            Some(DNSResourceType::AAAA) => flags.set(SessionFlags::IPV6),
            _ => {}
        }
        let local = forward
            .questions
            .iter()
            .any(|q| self.matchers.local_domain.is_domain_match(&q.name));
        if local {
            flags.set(SessionFlags::LOCAL);
        }

        let ident = self.sessions.allocate(source, client_ident, flags);
        if let Some(tail) = &forward.client_suffix {
            if let Some(session) = self.sessions.lookup_mut(ident) {
                session.set_client_suffix(tail);
            }
        }
        let mut message = forward.message;
        set_message_id(&mut message, ident);
        debug!(
            "forward query {:#06x} from {} upstream as {:#06x}",
            client_ident, source, ident
        );
        self.stats.queries_forwarded += 1;

        let wants_pair = self.dual_stack.is_some()
            && !local
            && forward.questions.len() == 1
            && forward.questions[0].qtype == DNSResourceType::AAAA;
        if !wants_pair {
            return Ok(smallvec![Outbound::upstream(message)]);
        }

        let mut sibling = message.clone();
        let at = forward.qtype_offsets[0];
        sibling[at..at + 2].copy_from_slice(&u16::from(DNSResourceType::A).to_be_bytes());
        let sibling_ident = self.sessions.allocate(
            source,
            client_ident,
            SessionFlags::new(SessionFlags::CALLPAIR | SessionFlags::OUTGOING | SessionFlags::IPV4),
        );
        set_message_id(&mut sibling, sibling_ident);
        if let Some(s) = self.sessions.lookup_mut(sibling_ident) {
            s.pair = Some(ident);
        }
        if let Some(primary) = self.sessions.lookup_mut(ident) {
            primary.pair = Some(sibling_ident);
            primary.flags.clear(SessionFlags::GOTPAIR);
        }
        debug!("paired A query {:#06x} for {:#06x}", sibling_ident, ident);
        self.stats.pair_queries += 1;

        Ok(smallvec![
            Outbound::upstream(message),
            Outbound::upstream(sibling)
        ])
    }

    fn process_response(&mut self, ident: u16, packet: &[u8]) -> Result<Outbounds> {
        let (flags, pair, client_suffix) = match self.sessions.lookup(ident) {
            Some(session) => (
                session.flags,
                session.pair,
                session.client_suffix().map(str::to_string),
            ),
            None => return Err(DnsError::SessionMiss(ident)),
        };

        let suffix = client_suffix.as_deref().unwrap_or(self.suffix.as_str());
        let rewritten = rewrite_response(packet, suffix, &self.matchers)?;
        trace!(
            "response {:#06x}: {} records, traced={}",
            ident,
            rewritten.records.len(),
            rewritten.traced
        );

        if flags.contains(SessionFlags::CALLPAIR) {
            if let Some(sibling) = self.sessions.lookup_mut(ident) {
                sibling.flags.set(SessionFlags::RECEIVE);
                sibling.flags.clear(SessionFlags::OUTGOING);
            }
            return Ok(self.complete_pair(pair, packet));
        }

        let need_mapping = rewritten.needs_nat64_mapping();
        let sibling_waiting = pair
            .and_then(|p| self.sessions.lookup(p))
            .is_some_and(|s| !s.flags.contains(SessionFlags::RECEIVE));
        let mut message = rewritten.message;

        let Some(session) = self.sessions.lookup_mut(ident) else {
            return Err(DnsError::SessionMiss(ident));
        };
        session.flags.set(SessionFlags::RECEIVE);
        if !session.flags.contains(SessionFlags::SENDBACK) {
            debug!("duplicate response {:#06x}, already delivered", ident);
            return Ok(Outbounds::new());
        }
        set_message_id(&mut message, session.client_ident());
        let client = session.client_addr();

        let mode = match (&self.dual_stack, pair) {
            (Some(dual), Some(_)) => dual.mode,
            _ => {
                session.flags.clear(SessionFlags::SENDBACK);
                self.stats.responses_delivered += 1;
                debug!("send back {:#06x} to client {}", ident, client);
                return Ok(smallvec![Outbound::client(client, message)]);
            }
        };

        let saved = session.flags;
        session.flags = SessionFlags::default();
        let got_pair = saved.contains(SessionFlags::GOTPAIR) || !sibling_waiting;
        let payload: Bytes = if !need_mapping && mode != DualStackMode::Ipv4 {
            message.into()
        } else if got_pair && session.has_pending() {
            debug!("send back {:#06x} from nat64 mapping", ident);
            session.take_pending().unwrap_or_else(|| Bytes::from(message))
        } else if got_pair || (!need_mapping && mode == DualStackMode::Auto) {
            message.into()
        } else {
            debug!("hold response {:#06x} waiting for paired answer", ident);
            session.cache_pending(message.into());
            session.flags = saved;
            self.stats.responses_held += 1;
            return Ok(Outbounds::new());
        };

        self.stats.responses_delivered += 1;
        Ok(smallvec![Outbound::client(client, payload)])
    }

    /// The sibling A query of a paired session has been answered.
    fn complete_pair(&mut self, pair: Option<u16>, raw: &[u8]) -> Outbounds {
        let Some(primary_ident) = pair else {
            return Outbounds::new();
        };
        let Relay {
            sessions,
            dual_stack,
            stats,
            ..
        } = self;
        let Some(primary) = sessions.lookup_mut(primary_ident) else {
            debug!("paired session {:#06x} was evicted", primary_ident);
            return Outbounds::new();
        };
        primary.flags.set(SessionFlags::GOTPAIR);

        let synthesized = dual_stack
            .as_mut()
            .and_then(|dual| dual.hook.synthesize(primary, raw));
        let awaiting_client = primary.flags.contains(SessionFlags::SENDBACK);
        let held = awaiting_client && primary.flags.contains(SessionFlags::RECEIVE);

        match synthesized {
            Some(mut datagram) if awaiting_client => {
                set_message_id(&mut datagram, primary.client_ident());
                if held {
                    primary.take_pending();
                    primary.flags = SessionFlags::default();
                    stats.responses_delivered += 1;
                    debug!("send back nat64 mapping to {}", primary.client_addr());
                    smallvec![Outbound::client(primary.client_addr(), datagram)]
                } else {
                    primary.cache_pending(datagram.into());
                    Outbounds::new()
                }
            }
            None if held => match primary.take_pending() {
                Some(payload) => {
                    primary.flags = SessionFlags::default();
                    stats.responses_delivered += 1;
                    debug!("release held response to {}", primary.client_addr());
                    smallvec![Outbound::client(primary.client_addr(), payload)]
                }
                None => Outbounds::new(),
            },
            _ => Outbounds::new(),
        }
    }
}
