pub mod common;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod rdata;
pub mod resource;

pub use enums::DNSResourceType;
pub use header::DNSHeader;
pub use name::{
    append_suffix, decode_fixed, decode_name, encode_fixed, encode_name, strip_suffix,
};
pub use question::DNSQuestion;
pub use rdata::{RecordRewrite, rewrite_record};
pub use resource::DNSResource;

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Receive scratch for one UDP datagram.
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Upper bound on a rewritten message, leaving room for suffix expansion
/// across every record.
pub const WORK_BUFFER_SIZE: usize = 8192;

/// Suffix clients append to names routed through the relay.
pub const DEFAULT_SUFFIX: &str = ".n.yiz.me";

/// Overwrite the transaction id of an encoded message in place.
pub fn set_message_id(message: &mut [u8], id: u16) {
    if message.len() >= 2 {
        message[..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Read the transaction id of an encoded message.
pub fn message_id(message: &[u8]) -> Option<u16> {
    (message.len() >= 2).then(|| u16::from_be_bytes([message[0], message[1]]))
}
