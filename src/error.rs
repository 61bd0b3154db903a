use thiserror::Error;

/// Why a candidate file was refused at the input boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Only PDF files are accepted (got {media_type:?})")]
    WrongType { media_type: String },

    #[error("File is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// Precondition failures on session actions. These never change state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not ready: {0}")]
    NotReady(&'static str),

    #[error("A compression is already in progress")]
    AlreadyInProgress,

    #[error("No async runtime to run the codec on")]
    NoRuntime,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to load PDF: {0}")]
    LoadFailed(String),

    #[error("Codec failure: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
