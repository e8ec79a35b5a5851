//! `ChainAdapter`: the interface that lets the submission queue and the state machine
//! treat EVM and TRON chains identically (spec §4.3: "so the state machine never
//! branches on chain type").
//!
//! This crate only defines the trait and the request/response shapes. The concrete
//! `evm`/`tron` implementations live in `relayer::submission`, since they own the
//! `reqwest` client that talks to the external RPC+signer collaborator (spec §1: this
//! system delegates nonce management, gas estimation, and signing to that service — it
//! never constructs or signs a transaction itself).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::ChainKind;

/// An ABI-shaped function call to submit. `args` are already in the representation the
/// external RPC+signer service expects (hex strings for bytes, decimal strings for
/// uint256) — `ChainAdapter` implementations do no further encoding, only transport and
/// chain-specific request shaping.
#[derive(Clone, Debug)]
pub struct ContractCall {
    pub contract_address: String,
    pub function_name: String,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug)]
pub struct SubmittedTx {
    pub tx_hash: String,
}

/// One trait object per configured chain (spec §4.3, §5: "no more than one in-flight
/// submission per `(chain_id, contract_function)` key"). Implementations must be
/// `Send + Sync` so they can live behind `Arc<dyn ChainAdapter>` in the submission
/// queue's worker tasks.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn kind(&self) -> ChainKind;

    fn chain_id(&self) -> u32;

    /// Submits `call` through the external RPC+signer service and returns once the
    /// service has accepted and broadcast it — this does NOT wait for confirmation;
    /// confirmation is the polling scheduler's job (spec §4.4).
    async fn send_tx(&self, call: ContractCall) -> Result<SubmittedTx>;

    /// Normalizes a chain-native address string (checksummed hex for EVM, base58check
    /// for TRON) into this chain's 32-byte universal form.
    fn normalize_address(&self, native: &str) -> Result<[u8; 32]>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    #[async_trait]
    impl ChainAdapter for NullAdapter {
        fn kind(&self) -> ChainKind {
            ChainKind::Evm
        }
        fn chain_id(&self) -> u32 {
            60
        }
        async fn send_tx(&self, _call: ContractCall) -> Result<SubmittedTx> {
            Ok(SubmittedTx {
                tx_hash: "0xdead".into(),
            })
        }
        fn normalize_address(&self, _native: &str) -> Result<[u8; 32]> {
            Ok([0u8; 32])
        }
    }

    #[tokio::test]
    async fn trait_object_is_callable() {
        let adapter: std::sync::Arc<dyn ChainAdapter> = std::sync::Arc::new(NullAdapter);
        let call = ContractCall {
            contract_address: "0x0".into(),
            function_name: "submitCommitment".into(),
            args: vec![],
        };
        let tx = adapter.send_tx(call).await.unwrap();
        assert_eq!(tx.tx_hash, "0xdead");
    }
}
