//! Core entities (spec §3). These are plain data — persistence mapping and
//! transition logic live in the `relayer` crate, which owns the database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{
    AllocationStatus, CheckbookStatus, IntentType, WithdrawExecuteStatus, WithdrawHookStatus,
    WithdrawPayoutStatus, WithdrawRequestStatus,
};
use crate::universal_address::UniversalAddress;

/// The off-chain shadow of a single on-chain deposit slot. Keyed by
/// `(chain_id, local_deposit_id)`; `id` is the secondary opaque unique key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkbook {
    pub id: Uuid,
    pub chain_id: u32,
    pub local_deposit_id: u64,
    pub owner: UniversalAddress,
    pub token_symbol: String,
    pub token_contract_address: String,
    pub gross_amount: Decimal,
    pub fee_amount: Decimal,
    pub allocatable_amount: Decimal,
    pub commitment: Option<[u8; 32]>,
    pub proof_blob: Option<Vec<u8>>,
    pub public_values: Option<Vec<u8>>,
    pub deposit_tx_hash: Option<String>,
    pub commitment_tx_hash: Option<String>,
    pub status: CheckbookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One of up to 256 sub-denominations inside a Checkbook ("Check").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Uuid,
    pub checkbook_id: Uuid,
    pub seq: u8,
    pub amount: Decimal,
    pub recipient: UniversalAddress,
    pub nullifier: Option<[u8; 32]>,
    pub status: AllocationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum number of Allocations a single Checkbook may hold (spec §4.1: `|amounts| <= 256`,
/// and `seq` is a single byte).
pub const MAX_ALLOCATIONS_PER_CHECKBOOK: usize = 256;

/// A user's intent to spend one or more Allocations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub id: Uuid,
    pub owner: UniversalAddress,
    pub chain_id: u32,
    pub amount: Decimal,
    pub beneficiary: UniversalAddress,
    pub intent_type: IntentType,
    pub token_symbol: String,
    pub asset_id: Option<String>,
    pub signature: Vec<u8>,
    pub payload_blob: Option<Vec<u8>>,
    pub status: WithdrawRequestStatus,
    pub execute_status: WithdrawExecuteStatus,
    pub payout_status: WithdrawPayoutStatus,
    pub hook_status: WithdrawHookStatus,
    pub execute_tx_hash: Option<String>,
    pub payout_tx_hash: Option<String>,
    pub timeout_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Many-to-many join: which Allocations a WithdrawRequest references (spec §3
/// "Holds references to Allocations (by id)").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawRequestAllocation {
    pub withdraw_request_id: Uuid,
    pub allocation_id: Uuid,
}

/// Opaque background job driving an entity forward from on-chain evidence (spec §4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingTask {
    pub id: Uuid,
    pub entity_type: PollingEntityType,
    pub entity_id: Uuid,
    pub task_type: PollingTaskType,
    pub chain_id: u32,
    pub tx_hash: String,
    pub target_status: String,
    pub retries_done: u32,
    pub max_retries: u32,
    pub interval_seconds: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollingTask {
    pub const DEFAULT_INTERVAL_SECONDS: u32 = 10;
    /// ~30 minutes at the default 10s interval (spec §4.4).
    pub const DEFAULT_MAX_RETRIES: u32 = 180;

    pub fn is_exhausted(&self) -> bool {
        self.retries_done >= self.max_retries
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingEntityType {
    Checkbook,
    WithdrawRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingTaskType {
    /// Waiting for the commitment tx to confirm on-chain.
    CommitmentConfirmation,
    /// Waiting for a withdraw's `execute` tx to confirm and emit the expected event.
    WithdrawExecuteConfirmation,
    /// Waiting for a withdraw's payout tx to confirm.
    WithdrawPayoutConfirmation,
    /// Waiting for a withdraw's post-payout hook tx to confirm (asset-token intents only).
    WithdrawHookConfirmation,
}

/// Per-chain configuration (spec §3 ChainConfig). Provisioned from a file at startup —
/// there is no admin CRUD for this in scope (spec §1 Non-goals).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// SLIP-44 coin type — the id namespace used throughout this system.
    pub slip44_id: u32,
    /// The chain's own native chain id (e.g. BSC's EVM chain id 56 for SLIP-44 714).
    pub native_id: u64,
    pub treasury_address: String,
    pub intent_manager_address: String,
    pub rpc_url: String,
    pub scanner_enabled: bool,
    pub last_synced_block: u64,
    pub kind: ChainKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Evm,
    Tron,
}
