//! Chain submission queue (spec §4.3): serializes broadcasts per `(chain_id,
//! contract_function)` so nonces never collide at the external signer service (P8).

pub mod evm;
pub mod tron;

use std::collections::HashMap;
use std::sync::Arc;

use payment_core::models::ChainConfig;
use payment_core::status::CheckbookStatus;
use payment_core::{ChainAdapter, ContractCall, UniversalAddress};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::checkbooks::update_checkbook_commitment_tx_hash;
use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::polling::PollingSchedulerHandle;
use crate::push::{EntityKind, Hub, PushEvent};

pub use evm::EvmAdapter;
pub use tron::TronAdapter;

/// Gas hints (spec §4.3) for the two contract functions this layer ever submits.
/// EVM units are gas; TRON units are SUN-denominated `fee_limit`. Estimations
/// exceeding these get a 10% buffer bump by the external RPC+signer service — this
/// layer only forwards the hint.
pub mod gas_hints {
    pub const DEPOSIT_EVM_GAS: u64 = 600_000;
    pub const DEPOSIT_TRON_FEE_LIMIT_SUN: u64 = 100 * 1_000_000;
    pub const WITHDRAW_EXECUTE_EVM_GAS: u64 = 300_000;
    pub const WITHDRAW_EXECUTE_TRON_FEE_LIMIT_SUN: u64 = 200 * 1_000_000;
}

pub struct SubmitCommitmentJob {
    pub checkbook_id: Uuid,
    pub chain_id: u32,
    pub owner: UniversalAddress,
    pub commitment: [u8; 32],
    pub proof_blob: Vec<u8>,
    pub public_values: Vec<u8>,
}

pub struct SubmitWithdrawExecuteJob {
    pub withdraw_request_id: Uuid,
    pub chain_id: u32,
    pub owner: UniversalAddress,
    pub payload_blob: Vec<u8>,
}

enum Job {
    Commitment(SubmitCommitmentJob),
    WithdrawExecute(SubmitWithdrawExecuteJob),
}

/// One queue per `(chain_id, contract_function)` key (spec §4.3, §5). Cloning this
/// handle is cheap; every clone shares the same per-key `mpsc::Sender` map.
#[derive(Clone)]
pub struct SubmissionHandle {
    queues: Arc<HashMap<(u32, &'static str), mpsc::Sender<Job>>>,
}

impl SubmissionHandle {
    pub async fn submit_commitment(
        &self,
        job: SubmitCommitmentJob,
    ) -> std::result::Result<(), mpsc::error::SendError<()>> {
        let key = (job.chain_id, "submitCommitment");
        match self.queues.get(&key) {
            Some(tx) => tx
                .send(Job::Commitment(job))
                .await
                .map_err(|_| mpsc::error::SendError(())),
            None => {
                error!(chain_id = job.chain_id, "no submission queue configured for chain");
                Err(mpsc::error::SendError(()))
            }
        }
    }

    pub async fn submit_withdraw_execute(
        &self,
        job: SubmitWithdrawExecuteJob,
    ) -> std::result::Result<(), mpsc::error::SendError<()>> {
        let key = (job.chain_id, "executeWithdraw");
        match self.queues.get(&key) {
            Some(tx) => tx
                .send(Job::WithdrawExecute(job))
                .await
                .map_err(|_| mpsc::error::SendError(())),
            None => {
                error!(chain_id = job.chain_id, "no submission queue configured for chain");
                Err(mpsc::error::SendError(()))
            }
        }
    }
}

pub struct SubmissionQueue;

impl SubmissionQueue {
    /// Builds one consumer task per `(chain, function)` key from the configured chains
    /// (spec §4.3). `adapters` maps `chain_id` to its `ChainAdapter` — EVM or TRON,
    /// behind the trait object so workers never branch on chain kind (spec §9).
    pub fn spawn(
        chains: &[ChainConfig],
        adapters: HashMap<u32, Arc<dyn ChainAdapter>>,
        db: Database,
        hub: Hub,
        polling: PollingSchedulerHandle,
    ) -> SubmissionHandle {
        let mut queues = HashMap::new();
        let functions: [&'static str; 2] = ["submitCommitment", "executeWithdraw"];

        for chain in chains {
            let Some(adapter) = adapters.get(&chain.slip44_id).cloned() else {
                warn!(chain_id = chain.slip44_id, "no chain adapter registered, skipping submission queue");
                continue;
            };
            for function in functions {
                let (tx, rx) = mpsc::channel::<Job>(256);
                queues.insert((chain.slip44_id, function), tx);
                spawn_worker(chain.clone(), function, adapter.clone(), rx, db.clone(), hub.clone(), polling.clone());
            }
        }

        SubmissionHandle {
            queues: Arc::new(queues),
        }
    }
}

fn spawn_worker(
    chain: ChainConfig,
    function: &'static str,
    adapter: Arc<dyn ChainAdapter>,
    mut rx: mpsc::Receiver<Job>,
    db: Database,
    hub: Hub,
    polling: PollingSchedulerHandle,
) {
    tokio::spawn(async move {
        // Single consumer per key: this loop is the serialization point (spec §4.3,
        // §5, P8 — "no two broadcasts originate concurrently from the submission
        // layer" for the same (chain, function) key).
        while let Some(job) = rx.recv().await {
            match job {
                Job::Commitment(job) => {
                    if let Err(e) =
                        handle_commitment_job(&chain, &*adapter, job, &db, &hub, &polling).await
                    {
                        warn!(chain_id = chain.slip44_id, function, error = %e, "submission job failed");
                    }
                }
                Job::WithdrawExecute(job) => {
                    if let Err(e) =
                        handle_withdraw_execute_job(&chain, &*adapter, job, &db, &hub, &polling).await
                    {
                        warn!(chain_id = chain.slip44_id, function, error = %e, "submission job failed");
                    }
                }
            }
        }
        info!(chain_id = chain.slip44_id, function, "submission queue drained, worker exiting");
    });
}

async fn handle_commitment_job(
    chain: &ChainConfig,
    adapter: &dyn ChainAdapter,
    job: SubmitCommitmentJob,
    db: &Database,
    hub: &Hub,
    polling: &PollingSchedulerHandle,
) -> Result<()> {
    let call = ContractCall {
        contract_address: chain.intent_manager_address.clone(),
        function_name: "submitCommitment".into(),
        args: vec![
            json!(hex::encode(job.commitment)),
            json!(hex::encode(&job.proof_blob)),
            json!(hex::encode(&job.public_values)),
        ],
    };

    let send_result = adapter.send_tx(call).await;
    let tx = match send_result {
        Ok(tx) => tx,
        Err(e) => {
            return fail_commitment(db, hub, job.checkbook_id, job.owner, format!("broadcast failed: {e}")).await;
        }
    };

    let mut dbtx = db.pool().begin().await?;
    update_checkbook_commitment_tx_hash(
        &mut dbtx,
        job.checkbook_id,
        &tx.tx_hash,
        CheckbookStatus::CommitmentPending,
    )
    .await?;
    dbtx.commit().await?;

    hub.broadcast(PushEvent {
        entity_kind: EntityKind::Checkbooks,
        entity_id: job.checkbook_id.to_string(),
        owner: job.owner,
        status: CheckbookStatus::CommitmentPending.to_string(),
        asset_id: None,
    })
    .await;

    polling
        .register_commitment_confirmation(job.checkbook_id, chain.slip44_id, tx.tx_hash)
        .await
}

async fn fail_commitment(
    db: &Database,
    hub: &Hub,
    checkbook_id: Uuid,
    owner: UniversalAddress,
    message: String,
) -> Result<()> {
    error!(checkbook_id = %checkbook_id, error = %message, "commitment submission failed before broadcast");
    let mut tx = db.pool().begin().await?;
    crate::db::checkbooks::update_checkbook_status(&mut tx, checkbook_id, CheckbookStatus::SubmissionFailed)
        .await?;
    tx.commit().await?;

    hub.broadcast(PushEvent {
        entity_kind: EntityKind::Checkbooks,
        entity_id: checkbook_id.to_string(),
        owner,
        status: CheckbookStatus::SubmissionFailed.to_string(),
        asset_id: None,
    })
    .await;

    Err(RelayerError::SubmissionFailed(message))
}

async fn handle_withdraw_execute_job(
    chain: &ChainConfig,
    adapter: &dyn ChainAdapter,
    job: SubmitWithdrawExecuteJob,
    db: &Database,
    hub: &Hub,
    polling: &PollingSchedulerHandle,
) -> Result<()> {
    use payment_core::status::{WithdrawExecuteStatus, WithdrawRequestStatus};

    let call = ContractCall {
        contract_address: chain.intent_manager_address.clone(),
        function_name: "executeWithdraw".into(),
        args: vec![json!(hex::encode(&job.payload_blob))],
    };

    let tx = match adapter.send_tx(call).await {
        Ok(tx) => tx,
        Err(e) => {
            error!(withdraw_request_id = %job.withdraw_request_id, error = %e, "withdraw execute broadcast failed");
            let mut dbtx = db.pool().begin().await?;
            crate::db::withdraw_requests::update_withdraw_status(
                &mut dbtx,
                job.withdraw_request_id,
                WithdrawRequestStatus::Failed,
            )
            .await?;
            dbtx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: job.withdraw_request_id.to_string(),
                owner: job.owner,
                status: WithdrawRequestStatus::Failed.to_string(),
                asset_id: None,
            })
            .await;
            return Err(RelayerError::SubmissionFailed(format!("broadcast failed: {e}")));
        }
    };

    let mut dbtx = db.pool().begin().await?;
    crate::db::withdraw_requests::update_withdraw_execute(
        &mut dbtx,
        job.withdraw_request_id,
        WithdrawExecuteStatus::Submitted,
        Some(&tx.tx_hash),
    )
    .await?;
    crate::db::withdraw_requests::update_withdraw_status(
        &mut dbtx,
        job.withdraw_request_id,
        WithdrawRequestStatus::Executing,
    )
    .await?;
    dbtx.commit().await?;

    hub.broadcast(PushEvent {
        entity_kind: EntityKind::Withdraws,
        entity_id: job.withdraw_request_id.to_string(),
        owner: job.owner,
        status: WithdrawRequestStatus::Executing.to_string(),
        asset_id: None,
    })
    .await;

    polling
        .register_withdraw_execute_confirmation(job.withdraw_request_id, chain.slip44_id, tx.tx_hash)
        .await
}
