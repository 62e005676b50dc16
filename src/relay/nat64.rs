use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::session::Session;

/// Which address family a dual-stack client should end up with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DualStackMode {
    /// Deliver native AAAA answers as soon as they arrive.
    Auto,
    /// Always wait for the paired A lookup.
    #[default]
    Ipv4,
    /// Prefer native AAAA answers, wait only when there are none.
    Ipv6,
}

impl FromStr for DualStackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DualStackMode::Auto),
            "ipv4" | "ipv4-only" => Ok(DualStackMode::Ipv4),
            "ipv6" | "ipv6-only" => Ok(DualStackMode::Ipv6),
            other => Err(ConfigError::ParseError(format!(
                "Invalid IPv6 mode: {} (expected auto, ipv4 or ipv6)",
                other
            ))),
        }
    }
}

impl fmt::Display for DualStackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DualStackMode::Auto => write!(f, "auto"),
            DualStackMode::Ipv4 => write!(f, "ipv4"),
            DualStackMode::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Builds the answer for a paired AAAA query out of its sibling's A
/// response.
pub trait Nat64Hook: Send {
    /// `paired` is the session of the original AAAA query; `response` is the
    /// raw upstream answer to the sibling A query. A returned datagram is
    /// delivered to the paired client with its transaction id restored.
    fn synthesize(&mut self, paired: &Session, response: &[u8]) -> Option<Vec<u8>>;
}

/// Never synthesizes anything: the paired answer only gates when the held
/// AAAA response is released.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSynthesis;

impl Nat64Hook for NoSynthesis {
    fn synthesize(&mut self, _paired: &Session, _response: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
