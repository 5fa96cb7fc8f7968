// Byte chain module

mod chain;
mod segment;

pub use chain::*;
pub use segment::*;

use thiserror::Error;

/// Errors produced by byte chain operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The chain does not contain enough readable bytes / writable space
    #[error("not enough data in the chain")]
    PartialData,

    /// The chain is locked for the attempted operation
    #[error("the chain is locked")]
    Locked,
}
