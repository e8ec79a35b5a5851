use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain-level invariant violations. Anything that crosses the HTTP boundary gets
/// remapped into `relayer::error::RelayerError` — this type never reaches a client
/// directly.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid universal address: {0}")]
    InvalidAddress(String),

    #[error("invalid chain id: {0}")]
    InvalidChainId(u32),

    #[error("nullifier math error: {0}")]
    Nullifier(String),

    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("decimal parse error: {0}")]
    Decimal(String),

    /// Transport or protocol failure talking to the external RPC+signer service that
    /// actually constructs, signs and broadcasts transactions (spec §1: this system
    /// never does that itself).
    #[error("chain adapter error: {0}")]
    ChainAdapter(String),
}
