//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized - run 'sidebet init' first")]
    NotInitialized,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("No published key bundle - run 'sidebet bundle' first")]
    NoBundle,

    #[error("No session with peer: {0}")]
    SessionNotFound(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] sidebet_core::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sidebet_storage::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
