use thiserror::Error;

/// Errors raised while building or validating blog values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// A required form field was blank after trimming
    #[error("{0}")]
    MissingField(String),

    /// An account address that cannot identify a wallet
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Shared result type
pub type TypesResult<T> = Result<T, TypesError>;
