use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Block height {0} does not fit in 48 bits")]
    InvalidHeight(u64),

    #[error("Anchor record signing failed: {0}")]
    Signing(String),

    #[error("Entry composition failed: {0}")]
    Composition(String),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Factom server rejected {phase} with status {status}")]
    ServerRejection { phase: &'static str, status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnchorError>;
