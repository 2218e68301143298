use thiserror::Error;

/// Reasons a header sequence cannot be fed to a resolver.
///
/// Insufficient history is not an error; resolvers report it as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("header {index} has height {found}, expected {expected}")]
    NonContiguous {
        index: usize,
        expected: u64,
        found: u64,
    },
    #[error("no history precedes height {height}")]
    MissingHistory { height: u64 },
    #[error("no block can follow height {height}")]
    HeightOverflow { height: u64 },
}
