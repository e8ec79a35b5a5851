//! TRON chain adapter (spec §4.3). Same delegation model as `EvmAdapter`: `send_tx`
//! only shapes and forwards the request to the external RPC+signer service.

use async_trait::async_trait;
use payment_core::error::{CoreError, Result};
use payment_core::models::ChainKind;
use payment_core::{ChainAdapter, ContractCall, SubmittedTx};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gas_hints;

const RPC_SIGNER_TIMEOUT: Duration = Duration::from_secs(30);

/// TRON base58check address version byte (mainnet).
const TRON_ADDRESS_VERSION: u8 = 0x41;

#[derive(Serialize)]
struct SendTxRequest<'a> {
    contract_address: &'a str,
    function_name: &'a str,
    args: &'a [serde_json::Value],
    fee_limit_sun: u64,
}

#[derive(Deserialize)]
struct SendTxResponse {
    tx_hash: String,
}

pub struct TronAdapter {
    chain_id: u32,
    rpc_signer_url: String,
    client: reqwest::Client,
}

impl TronAdapter {
    pub fn new(chain_id: u32, rpc_signer_url: String) -> Self {
        Self {
            chain_id,
            rpc_signer_url,
            client: reqwest::Client::builder()
                .timeout(RPC_SIGNER_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        }
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn kind(&self) -> ChainKind {
        ChainKind::Tron
    }

    fn chain_id(&self) -> u32 {
        self.chain_id
    }

    async fn send_tx(&self, call: ContractCall) -> Result<SubmittedTx> {
        let fee_limit_sun = match call.function_name.as_str() {
            "submitCommitment" => gas_hints::DEPOSIT_TRON_FEE_LIMIT_SUN,
            "executeWithdraw" => gas_hints::WITHDRAW_EXECUTE_TRON_FEE_LIMIT_SUN,
            other => {
                return Err(CoreError::ChainAdapter(format!(
                    "no gas hint configured for contract function {other}"
                )))
            }
        };

        let request = SendTxRequest {
            contract_address: &call.contract_address,
            function_name: &call.function_name,
            args: &call.args,
            fee_limit_sun,
        };

        let response = self
            .client
            .post(format!("{}/send", self.rpc_signer_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::ChainAdapter(format!("rpc/signer unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::ChainAdapter(format!(
                "rpc/signer returned {status}: {body}"
            )));
        }

        let parsed: SendTxResponse = response
            .json()
            .await
            .map_err(|e| CoreError::ChainAdapter(format!("rpc/signer response undecodable: {e}")))?;

        Ok(SubmittedTx {
            tx_hash: parsed.tx_hash,
        })
    }

    /// TRON addresses are base58check with a leading `0x41` version byte over a 20-byte
    /// payload. Case is significant (spec §3) — unlike EVM, this never lower-cases the
    /// input before decoding.
    fn normalize_address(&self, native: &str) -> Result<[u8; 32]> {
        let decoded = bs58::decode(native)
            .with_check(Some(TRON_ADDRESS_VERSION))
            .into_vec()
            .map_err(|e| CoreError::InvalidAddress(format!("invalid TRON base58check address: {e}")))?;

        // `with_check` strips the checksum but keeps the version byte as decoded[0].
        if decoded.len() != 21 || decoded[0] != TRON_ADDRESS_VERSION {
            return Err(CoreError::InvalidAddress(format!(
                "TRON address has unexpected payload length {}",
                decoded.len()
            )));
        }

        payment_core::UniversalAddress::from_native_bytes(self.chain_id, &decoded[1..]).map(|ua| ua.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_base58() {
        let adapter = TronAdapter::new(195, "http://localhost:9200".into());
        assert!(adapter.normalize_address("not-a-tron-address").is_err());
    }
}
