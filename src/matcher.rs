//! Membership stores used to classify responses.
//!
//! Domain suffixes are packed into a fixed-capacity byte buffer as
//! `(length, reversed bytes)` runs. Each run is the reversed suffix followed
//! by a `.`, so matching a reversed, dot-terminated query name is a plain
//! prefix comparison that only succeeds on a label boundary. Networks are
//! `(network, mask)` pairs tested with `addr & mask == network`. Stores are
//! filled during configuration and only read afterwards.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::dns::name::{MAX_NAME_TEXT, is_escaped};
use crate::error::ConfigError;

pub const DOMAIN_STORE_CAPACITY: usize = 8192;
pub const NETWORK_STORE_CAPACITY: usize = 10240;
pub const IP_STORE_CAPACITY: usize = 1024;

/// A run's length is stored in one byte, boundary dot included.
const MAX_DOMAIN_LEN: usize = 254;

#[derive(Debug, Clone)]
pub struct DomainMatcher {
    name: &'static str,
    packed: Vec<u8>,
    entries: usize,
}

impl DomainMatcher {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            packed: Vec::new(),
            entries: 0,
        }
    }

    /// Register `domain` so that it and every name under it match.
    pub fn add_domain_suffix(&mut self, domain: &str) -> Result<(), ConfigError> {
        let domain = domain.trim().trim_matches('.');
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
            return Err(ConfigError::InvalidDomain(domain.to_string()));
        }

        // reversed bytes plus the boundary dot
        let run = domain.len() + 1;
        if self.packed.len() + 1 + run > DOMAIN_STORE_CAPACITY {
            return Err(ConfigError::CapacityExceeded {
                store: self.name,
                capacity: DOMAIN_STORE_CAPACITY,
            });
        }

        self.packed.push(run as u8);
        self.packed
            .extend(domain.bytes().rev().map(|b| b.to_ascii_lowercase()));
        self.packed.push(b'.');
        self.entries += 1;
        debug!("{} store: added domain suffix {}", self.name, domain);
        Ok(())
    }

    pub fn is_domain_match(&self, name: &str) -> bool {
        let name = match name.strip_suffix('.') {
            Some(head) if !is_escaped(name.as_bytes(), head.len()) => head,
            _ => name,
        };
        if name.is_empty() || name.len() > MAX_NAME_TEXT || self.entries == 0 {
            return false;
        }

        let mut reversed = [0u8; MAX_NAME_TEXT + 1];
        for (slot, b) in reversed.iter_mut().zip(name.bytes().rev()) {
            *slot = b.to_ascii_lowercase();
        }
        reversed[name.len()] = b'.';
        let reversed = &reversed[..=name.len()];

        let mut i = 0;
        while i < self.packed.len() {
            let len = self.packed[i] as usize;
            let entry = &self.packed[i + 1..i + 1 + len];
            // an escaped dot inside a label is not a boundary
            if reversed.starts_with(entry)
                && !name
                    .len()
                    .checked_sub(len)
                    .is_some_and(|at| is_escaped(name.as_bytes(), at))
            {
                return true;
            }
            i += 1 + len;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

#[derive(Debug, Clone)]
pub struct NetworkMatcher {
    name: &'static str,
    networks: Vec<(u32, u32)>,
    ips: Vec<u32>,
}

impl NetworkMatcher {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            networks: Vec::new(),
            ips: Vec::new(),
        }
    }

    pub fn add_network(&mut self, network: Ipv4Addr, mask: Ipv4Addr) -> Result<(), ConfigError> {
        if self.networks.len() >= NETWORK_STORE_CAPACITY {
            return Err(ConfigError::CapacityExceeded {
                store: self.name,
                capacity: NETWORK_STORE_CAPACITY,
            });
        }
        let mask_bits = u32::from(mask);
        let network = u32::from(network);
        if network & mask_bits != network {
            return Err(ConfigError::InvalidNetwork(format!(
                "{}/{} has host bits set",
                Ipv4Addr::from(network),
                mask
            )));
        }
        self.networks.push((network, mask_bits));
        debug!("{} store: added network {}/{}", self.name, Ipv4Addr::from(network), mask);
        Ok(())
    }

    pub fn add_ip(&mut self, addr: Ipv4Addr) -> Result<(), ConfigError> {
        if self.ips.len() >= IP_STORE_CAPACITY {
            return Err(ConfigError::CapacityExceeded {
                store: self.name,
                capacity: IP_STORE_CAPACITY,
            });
        }
        self.ips.push(u32::from(addr));
        debug!("{} store: added address {}", self.name, addr);
        Ok(())
    }

    pub fn is_network_match(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        self.networks
            .iter()
            .any(|&(network, mask)| addr & mask == network)
    }

    pub fn is_ip_match(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        self.ips.contains(&addr)
    }

    /// Network or exact address membership.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.is_network_match(addr) || self.is_ip_match(addr)
    }

    pub fn len(&self) -> usize {
        self.networks.len() + self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The four classification stores the relay consults.
#[derive(Debug, Clone)]
pub struct Matchers {
    pub local_ip: NetworkMatcher,
    pub local_domain: DomainMatcher,
    pub fake_ip: NetworkMatcher,
    pub fake_domain: DomainMatcher,
}

impl Default for Matchers {
    fn default() -> Self {
        Self {
            local_ip: NetworkMatcher::new("local-ip"),
            local_domain: DomainMatcher::new("local-domain"),
            fake_ip: NetworkMatcher::new("fake-ip"),
            fake_domain: DomainMatcher::new("fake-domain"),
        }
    }
}

impl Matchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local_ip(&mut self, addr: Ipv4Addr) -> Result<(), ConfigError> {
        self.local_ip.add_ip(addr)
    }

    pub fn add_local_network(&mut self, network: Ipv4Addr, mask: Ipv4Addr) -> Result<(), ConfigError> {
        self.local_ip.add_network(network, mask)
    }

    pub fn add_local_domain(&mut self, domain: &str) -> Result<(), ConfigError> {
        self.local_domain.add_domain_suffix(domain)
    }

    pub fn add_fake_ip(&mut self, addr: Ipv4Addr) -> Result<(), ConfigError> {
        self.fake_ip.add_ip(addr)
    }

    pub fn add_fake_network(&mut self, network: Ipv4Addr, mask: Ipv4Addr) -> Result<(), ConfigError> {
        self.fake_ip.add_network(network, mask)
    }

    pub fn add_fake_domain(&mut self, domain: &str) -> Result<(), ConfigError> {
        self.fake_domain.add_domain_suffix(domain)
    }
}

/// Parse `a.b.c.d/len`, `a.b.c.d/m.m.m.m` or a bare address (a /32).
pub fn parse_network(text: &str) -> Result<(Ipv4Addr, Ipv4Addr), ConfigError> {
    let invalid = || ConfigError::InvalidNetwork(text.to_string());
    let text = text.trim();
    let (addr, mask) = match text.split_once('/') {
        Some((addr, mask)) => (addr, Some(mask)),
        None => (text, None),
    };
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let mask = match mask {
        None => Ipv4Addr::BROADCAST,
        Some(m) if m.contains('.') => m.parse().map_err(|_| invalid())?,
        Some(m) => {
            let bits: u32 = m.parse().map_err(|_| invalid())?;
            if bits > 32 {
                return Err(invalid());
            }
            Ipv4Addr::from(u32::MAX.checked_shl(32 - bits).unwrap_or(0))
        }
    };
    Ok((addr, mask))
}
