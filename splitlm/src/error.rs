//! Error types for splitlm

use thiserror::Error;

/// Result type alias using splitlm's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for splitlm operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Asset load error: {0}")]
    Load(String),

    #[error("Symbol {symbol:?} is not in the vocabulary")]
    UnknownSymbol { symbol: String },

    #[error("Token ID {0} is not in the vocabulary")]
    UnknownTokenId(u32),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Pre-tokenizer error: {0}")]
    PreTokenize(String),

    #[error("Connection closed after {received} of {expected} bytes")]
    ConnectionClosed { expected: usize, received: usize },

    #[error("Frame of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], used for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Vocabulary, merge or configuration data could not be loaded.
    Load,
    /// Text could not be encoded (or ids decoded) with the loaded tables.
    Encode,
    /// The connection failed: short read, reset, write failure, bad frame.
    Transport,
    /// The generation capability failed.
    Generation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Encode => "encode",
            Self::Transport => "transport",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) | Self::Json(_) => ErrorKind::Load,
            Self::UnknownSymbol { .. }
            | Self::UnknownTokenId(_)
            | Self::Tokenizer(_)
            | Self::PreTokenize(_) => ErrorKind::Encode,
            Self::ConnectionClosed { .. }
            | Self::FrameTooLarge { .. }
            | Self::Transport(_)
            | Self::Payload(_)
            | Self::Io(_) => ErrorKind::Transport,
            Self::Generation(_) | Self::Other(_) => ErrorKind::Generation,
        }
    }

    /// Whether this error means the peer went away (reset, broken pipe, early close).
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind as Io;
        match self {
            Self::ConnectionClosed { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                Io::BrokenPipe | Io::ConnectionReset | Io::ConnectionAborted | Io::UnexpectedEof
            ),
            _ => false,
        }
    }
}
