use std::fmt;

/// Record types the relay distinguishes. Anything else keeps its raw code.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DNSResourceType {
    #[default]
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    OPT,
    Other(u16),
}

/// How the rdata of a record type is rewritten.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordShape {
    /// One embedded name, then any trailing bytes (CNAME, NS).
    SingleName,
    /// Two embedded names, then fixed-width trailing bytes (SOA).
    DualName,
    /// Copied through untouched.
    Opaque,
}

impl DNSResourceType {
    pub fn shape(self) -> RecordShape {
        match self {
            DNSResourceType::CNAME | DNSResourceType::NS => RecordShape::SingleName,
            DNSResourceType::SOA => RecordShape::DualName,
            _ => RecordShape::Opaque,
        }
    }
}

impl From<u16> for DNSResourceType {
    fn from(value: u16) -> Self {
        match value {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            41 => DNSResourceType::OPT,
            x => DNSResourceType::Other(x),
        }
    }
}

impl From<DNSResourceType> for u16 {
    fn from(value: DNSResourceType) -> Self {
        match value {
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::OPT => 41,
            DNSResourceType::Other(x) => x,
        }
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSResourceType::Other(x) => write!(f, "TYPE{}", x),
            other => write!(f, "{:?}", other),
        }
    }
}
