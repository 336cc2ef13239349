use thiserror::Error;

/// Result type local to mqe-compress.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("compressor already finalized")]
    AlreadyFinalized,

    #[error("corrupt block: stream ended after {decoded} of {expected} samples")]
    Truncated { decoded: usize, expected: usize },

    #[error("corrupt block: {0}")]
    Corrupt(String),
}
