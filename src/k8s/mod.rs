pub mod client;
pub mod owner;
pub mod peers;
pub mod selector;
pub mod utils;

/// Default user agent, overridable through `PEERWATCH_USER_AGENT`
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
