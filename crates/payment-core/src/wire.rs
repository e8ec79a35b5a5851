//! Wire shapes for the two HTTP collaborators named in spec §6: the ZKVM proving
//! service and the blockchain event scanner. These are plain serde DTOs; the HTTP
//! clients that use them live in `relayer::proof_pipeline` / `relayer::polling`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize)]
pub struct ZkvmAllocationInput {
    pub seq: u8,
    /// Hex-encoded 32-byte amount.
    pub amount: String,
}

#[derive(Clone, Serialize)]
pub struct ZkvmSignature {
    pub chain_id: u32,
    /// Hex-encoded signature bytes.
    pub signature_data: String,
    pub public_key: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct ZkvmOwnerAddress {
    pub chain_id: u32,
    /// Hex-encoded 32-byte universal address.
    pub address: String,
}

/// Request envelope sent to the ZKVM for a commitment proof (spec §4.2, §6).
#[derive(Clone, Serialize)]
pub struct ZkvmBuildCommitmentRequest {
    pub allocations: Vec<ZkvmAllocationInput>,
    /// Hex-encoded 32-byte deposit id.
    pub deposit_id: String,
    pub signature: ZkvmSignature,
    pub owner_address: ZkvmOwnerAddress,
    pub token_key: String,
    pub chain_name: Option<String>,
    pub lang: u8,
}

#[derive(Clone, Deserialize)]
pub struct ZkvmBuildCommitmentResponse {
    pub success: bool,
    pub commitment: Option<String>,
    pub proof_data: Option<String>,
    pub public_values: Option<String>,
    pub total_amount: Option<String>,
    pub allocations_count: Option<u32>,
    pub error_message: Option<String>,
}

/// Decoded form of the `public_values` blob (spec §6, bit-exact SOL-ABI-style layout).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicValues {
    pub commitment: [u8; 32],
    /// 20-byte EVM address (right-padded to 32B on the wire) or native 32-byte form.
    pub owner: [u8; 32],
    pub total_amount: u128,
    pub deposit_id: u64,
    pub coin_type: u32,
    pub token_symbol: String,
    pub token_decimals: u8,
}

#[derive(Clone, Deserialize)]
pub struct ScannerTxEvent {
    pub name: String,
    pub data: serde_json::Value,
}

/// `GET /tx/{chain_id}/{tx_hash}` response (spec §6).
#[derive(Clone, Deserialize)]
pub struct ScannerTxResponse {
    pub confirmed: bool,
    pub block: u64,
    pub events: Vec<ScannerTxEvent>,
}

/// One already-confirmed on-chain deposit reported by the scanner (spec §6 `GET
/// /events/...`). `gross_amount`/`fee_amount` are the contract's own bookkeeping —
/// this coordinator never computes a fee itself, only shadows what the scanner saw.
#[derive(Clone, Deserialize)]
pub struct ScannerDepositEvent {
    pub local_deposit_id: u64,
    /// Native-format owner address string (checksummed/lower hex for EVM, base58check
    /// for TRON).
    pub owner_address: String,
    pub token_symbol: String,
    pub token_contract_address: String,
    pub gross_amount: rust_decimal::Decimal,
    pub fee_amount: rust_decimal::Decimal,
    pub tx_hash: String,
}

/// `GET /events/{chain_id}?since_block=...` response, used by the admin-triggered
/// deposit sync (spec §6 "used by admin adapter sync").
#[derive(Clone, Deserialize)]
pub struct ScannerEventsResponse {
    pub deposits: Vec<ScannerDepositEvent>,
    pub last_block: u64,
}
