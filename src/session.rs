//! Upstream transaction correlation.
//!
//! A fixed ring of 512 slots. The identifier sent upstream carries its slot
//! index in the low 9 bits, so a response maps back to its slot in O(1).
//! Slots are never freed; they are overwritten when the counter wraps
//! around to them. A flood of queries can therefore evict a session that
//! is still waiting for its answer, in which case the late answer is
//! dropped as unexpected. The random high bits make identifiers hard to
//! guess but do nothing against such a flood.

use std::net::SocketAddr;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

pub const SESSION_SLOTS: usize = 512;
pub const SLOT_MASK: u16 = 0x1FF;

/// Status bits packed into a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags(u8);

impl SessionFlags {
    /// Query was sent to the upstream server.
    pub const OUTGOING: u8 = 0x01;
    /// Answer must be delivered back to the client.
    pub const SENDBACK: u8 = 0x02;
    /// Sibling query issued on behalf of another session.
    pub const CALLPAIR: u8 = 0x04;
    /// Question is under a local domain.
    pub const LOCAL: u8 = 0x08;
    pub const IPV4: u8 = 0x10;
    /// Upstream answered this session.
    pub const RECEIVE: u8 = 0x20;
    pub const IPV6: u8 = 0x40;
    /// The sibling of this session has answered.
    pub const GOTPAIR: u8 = 0x80;

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    #[inline]
    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    #[inline]
    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    generated_ident: u16,
    client_ident: u16,
    client_addr: SocketAddr,
    pub flags: SessionFlags,
    /// Generated identifier of the paired session, if any.
    pub pair: Option<u16>,
    pending: Option<Bytes>,
    client_suffix: Option<Box<str>>,
}

impl Session {
    pub fn generated_ident(&self) -> u16 {
        self.generated_ident
    }

    pub fn client_ident(&self) -> u16 {
        self.client_ident
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn slot(&self) -> usize {
        (self.generated_ident & SLOT_MASK) as usize
    }

    /// Hold a rewritten response until its sibling arrives.
    pub fn cache_pending(&mut self, payload: Bytes) {
        self.pending = Some(payload);
    }

    pub fn take_pending(&mut self) -> Option<Bytes> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Remember the suffix spelling the client used, so answers echo it.
    pub fn set_client_suffix(&mut self, suffix: &str) {
        self.client_suffix = Some(suffix.into());
    }

    pub fn client_suffix(&self) -> Option<&str> {
        self.client_suffix.as_deref()
    }
}

pub struct SessionTable {
    slots: Vec<Option<Session>>,
    next: u16,
    rng: StdRng,
}

impl std::fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTable")
            .field("occupied", &self.occupied())
            .field("next", &(self.next & SLOT_MASK))
            .finish()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic identifiers, for tests and benchmarks.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            slots: vec![None; SESSION_SLOTS],
            next: 0,
            rng,
        }
    }

    /// Claim the next slot for a client query and return the identifier to
    /// use upstream. Whatever occupied the slot is overwritten.
    pub fn allocate(&mut self, client_addr: SocketAddr, client_ident: u16, flags: SessionFlags) -> u16 {
        let index = self.next & SLOT_MASK;
        self.next = self.next.wrapping_add(1);

        let slot = &mut self.slots[index as usize];
        let previous = slot.as_ref().map(|s| s.generated_ident);
        if let Some(old) = slot.as_ref() {
            if old.flags.contains(SessionFlags::OUTGOING)
                && !old.flags.contains(SessionFlags::RECEIVE)
            {
                debug!(
                    "evicting unanswered session {:#06x} for {} from slot {}",
                    old.generated_ident, old.client_addr, index
                );
            }
        }

        // a reused slot never hands out the identifier it just retired
        let generated_ident = loop {
            let ident = (self.rng.random::<u16>() & !SLOT_MASK) | index;
            if Some(ident) != previous {
                break ident;
            }
        };

        *slot = Some(Session {
            generated_ident,
            client_ident,
            client_addr,
            flags,
            pair: None,
            pending: None,
            client_suffix: None,
        });
        trace!(
            "slot {} allocated: {:#06x} -> client {} id {:#06x}",
            index, generated_ident, client_addr, client_ident
        );
        generated_ident
    }

    /// The session currently answering to `ident`, if its slot has not
    /// been reused.
    pub fn lookup(&self, ident: u16) -> Option<&Session> {
        self.slots[(ident & SLOT_MASK) as usize]
            .as_ref()
            .filter(|s| s.generated_ident == ident)
    }

    pub fn lookup_mut(&mut self, ident: u16) -> Option<&mut Session> {
        self.slots[(ident & SLOT_MASK) as usize]
            .as_mut()
            .filter(|s| s.generated_ident == ident)
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
