//! Adapters for the outbound ports that do not need a running node.

pub mod crypto;
pub mod time;

pub use crypto::Secp256k1Crypto;
pub use time::SystemTimeSource;
