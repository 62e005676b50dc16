pub mod config;
pub mod dns;
pub mod error;
pub mod matcher;
pub mod relay;
pub mod server;
pub mod session;

pub use relay::{Outbound, Relay, Target};
