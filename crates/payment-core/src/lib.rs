pub mod chain_adapter;
pub mod error;
pub mod models;
pub mod nullifier;
pub mod public_values;
pub mod status;
pub mod universal_address;
pub mod wire;

pub use chain_adapter::{ChainAdapter, ContractCall, SubmittedTx};
pub use error::{CoreError, Result};
pub use universal_address::UniversalAddress;
