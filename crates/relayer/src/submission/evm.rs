//! EVM chain adapter (spec §4.3, §1 Non-goals: "this system does not construct, sign,
//! or broadcast transactions itself"). `send_tx` is a thin HTTP client for an external
//! RPC+signer service that owns nonce management, gas estimation, and the key.

use async_trait::async_trait;
use payment_core::error::{CoreError, Result};
use payment_core::models::ChainKind;
use payment_core::{ChainAdapter, ContractCall, SubmittedTx, UniversalAddress};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gas_hints;

const RPC_SIGNER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendTxRequest<'a> {
    contract_address: &'a str,
    function_name: &'a str,
    args: &'a [serde_json::Value],
    gas_limit: u64,
}

#[derive(Deserialize)]
struct SendTxResponse {
    tx_hash: String,
}

pub struct EvmAdapter {
    chain_id: u32,
    rpc_signer_url: String,
    client: reqwest::Client,
}

impl EvmAdapter {
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
impl ChainAdapter for EvmAdapter {
    fn kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn chain_id(&self) -> u32 {
        self.chain_id
    }

    async fn send_tx(&self, call: ContractCall) -> Result<SubmittedTx> {
        let gas_limit = match call.function_name.as_str() {
            "submitCommitment" => gas_hints::DEPOSIT_EVM_GAS,
            "executeWithdraw" => gas_hints::WITHDRAW_EXECUTE_EVM_GAS,
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
            gas_limit,
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

    /// EVM addresses are 20 bytes; comparison is case-insensitive (spec §3), so this
    /// only validates length and hex-decodes — it does not verify an EIP-55 checksum.
    fn normalize_address(&self, native: &str) -> Result<[u8; 32]> {
        let lower = native.to_ascii_lowercase();
        Ok(UniversalAddress::from_hex(self.chain_id, &lower)?.data)
    }
}
