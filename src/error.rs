use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Message truncated: needed {need} bytes at offset {offset}")]
    Truncated { offset: usize, need: usize },

    #[error("Malformed domain name at offset {0}")]
    MalformedName(usize),

    #[error("Invalid compression pointer to offset {target} at offset {at}")]
    InvalidPointer { at: usize, target: usize },

    #[error("Invalid label length: {0}")]
    LabelTooLong(usize),

    #[error("DNS name too long")]
    NameTooLong,

    #[error("Invalid DNS header")]
    InvalidHeader,

    #[error("Query name {0} does not carry the relay suffix")]
    SuffixMismatch(String),

    #[error("No session for response id {0:#06x}")]
    SessionMiss(u16),

    #[error("Buffer too small: need {need} bytes, have {have} bytes")]
    BufferTooSmall { need: usize, have: usize },
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => DnsError::InvalidHeader,
            _ => DnsError::Io(err.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid upstream server: {0}")]
    InvalidUpstreamServer(String),

    #[error("Invalid relay suffix: {0}")]
    InvalidSuffix(String),

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("{store} store is full ({capacity} max)")]
    CapacityExceeded { store: &'static str, capacity: usize },

    #[error("Failed to read rules file {path}: {reason}")]
    RulesFile { path: String, reason: String },

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, DnsError>;
