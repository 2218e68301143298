//! Kimoto Gravity Well difficulty retargeting for Reddcoin light clients.
//!
//! Given an already assembled, height-ordered run of block headers, the
//! resolvers compute the compact target a compliant node requires for the next
//! block, so a client can check node-reported headers on its own.

pub mod compact;
pub mod error;
pub mod header;
pub mod params;
pub mod retarget;

pub use error::ChainError;
pub use header::BlockHeader;
pub use params::NetworkParams;
pub use retarget::{resolve_many, resolve_one, resolve_one_fast, Retarget};
