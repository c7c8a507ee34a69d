use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector has zero norm and cannot be normalized")]
    ZeroVector,

    #[error("Index position out of range: {position} (index holds {len} entries)")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
