//! Proof pipeline (spec §4.2): turns a `SubmitCommitment` call into a ZKVM HTTP round
//! trip, then hands the result to the lifecycle state machine and the submission queue.
//!
//! A single `mpsc` queue is drained by one dispatcher task; each job is processed on
//! its own spawned task bounded by a `Semaphore` sized to `PROOF_WORKER_COUNT` (spec
//! §5: "N ZKVM proof workers, typically 4-8"). This is equivalent to N dedicated
//! consumer tasks for a fan-out worker pool and is simpler to wire against a single
//! bounded channel — see `SPEC_FULL.md` §4.2 for why this divergence from a literal
//! "N tasks" reading is permitted.

use std::sync::Arc;
use std::time::Duration;

use payment_core::models::Checkbook;
use payment_core::status::CheckbookStatus;
use payment_core::wire::{
    ZkvmAllocationInput, ZkvmBuildCommitmentRequest, ZkvmBuildCommitmentResponse, ZkvmOwnerAddress,
    ZkvmSignature,
};
use payment_core::{nullifier, public_values};
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::allocations::update_allocation_nullifier;
use crate::db::checkbooks::{fetch_checkbook_for_update, update_checkbook_commitment, update_checkbook_status};
use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::push::{EntityKind, Hub, PushEvent};
use crate::submission::{SubmissionHandle, SubmitCommitmentJob};

/// Per-call ZKVM timeout (spec §5: "ZKVM calls time out at ~5 min").
const ZKVM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct ProofJob {
    pub checkbook_id: Uuid,
    pub signature: Vec<u8>,
    /// Opaque blob the caller signed; re-sent to the ZKVM as part of the intent (the
    /// ZKVM interprets the bytes, this service treats it as opaque).
    pub intent_payload: Vec<u8>,
}

#[derive(Clone)]
pub struct ProofPipelineHandle {
    tx: mpsc::Sender<ProofJob>,
}

impl ProofPipelineHandle {
    pub async fn enqueue(&self, job: ProofJob) -> std::result::Result<(), mpsc::error::SendError<ProofJob>> {
        self.tx.send(job).await
    }
}

pub struct ProofPipeline;

impl ProofPipeline {
    /// Spawns the dispatcher task and returns a cloneable handle to enqueue jobs.
    pub fn spawn(
        worker_count: usize,
        zkvm_base_url: String,
        db: Database,
        hub: Hub,
        submission: SubmissionHandle,
    ) -> ProofPipelineHandle {
        let (tx, rx) = mpsc::channel(1024);
        let rx = Arc::new(Mutex::new(rx));
        let permits = Arc::new(Semaphore::new(worker_count.max(1)));
        let client = Arc::new(
            reqwest::Client::builder()
                .timeout(ZKVM_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        );
        let base_url = Arc::new(zkvm_base_url);

        tokio::spawn(async move {
            loop {
                let job = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(job) = job else {
                    info!("proof pipeline queue closed, dispatcher exiting");
                    break;
                };

                let permit = permits.clone().acquire_owned().await.expect("semaphore open");
                let db = db.clone();
                let hub = hub.clone();
                let submission = submission.clone();
                let client = client.clone();
                let base_url = base_url.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = process_job(job, &db, &hub, &submission, &client, &base_url).await {
                        warn!(error = %e, "proof pipeline job failed");
                    }
                });
            }
        });

        ProofPipelineHandle { tx }
    }
}

async fn process_job(
    job: ProofJob,
    db: &Database,
    hub: &Hub,
    submission: &SubmissionHandle,
    client: &reqwest::Client,
    base_url: &str,
) -> Result<()> {
    let checkbook = db
        .fetch_checkbook(job.checkbook_id)
        .await?
        .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;
    let allocations = db.list_allocations_for_checkbook(job.checkbook_id).await?;

    let request = build_zkvm_request(&checkbook, &job, &allocations)?;

    let response = match client
        .post(format!("{base_url}/buildcommitment"))
        .json(&request)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            return fail_proof(db, hub, job.checkbook_id, format!("zkvm unreachable: {e}")).await;
        }
    };

    let parsed: ZkvmBuildCommitmentResponse = match response.json().await {
        Ok(p) => p,
        Err(e) => {
            return fail_proof(db, hub, job.checkbook_id, format!("zkvm response undecodable: {e}")).await;
        }
    };

    if !parsed.success {
        let message = parsed.error_message.unwrap_or_else(|| "zkvm reported failure".into());
        return fail_proof(db, hub, job.checkbook_id, message).await;
    }

    let (commitment_hex, proof_hex, public_values_hex) = match (
        parsed.commitment,
        parsed.proof_data,
        parsed.public_values,
    ) {
        (Some(c), Some(p), Some(v)) => (c, p, v),
        _ => {
            return fail_proof(
                db,
                hub,
                job.checkbook_id,
                "zkvm success response missing commitment/proof/public_values".into(),
            )
            .await;
        }
    };

    let proof_bytes = match hex::decode(proof_hex.trim_start_matches("0x")) {
        Ok(b) => b,
        Err(e) => return fail_proof(db, hub, job.checkbook_id, format!("invalid proof_data hex: {e}")).await,
    };
    let public_values_bytes = match hex::decode(public_values_hex.trim_start_matches("0x")) {
        Ok(b) => b,
        Err(e) => return fail_proof(db, hub, job.checkbook_id, format!("invalid public_values hex: {e}")).await,
    };

    let parsed_values = match public_values::parse_public_values(&public_values_bytes) {
        Ok(v) => v,
        Err(e) => return fail_proof(db, hub, job.checkbook_id, format!("public_values parse error: {e}")).await,
    };

    // §4.2 "handler ignores a request-supplied commitment and uses only the
    // ZKVM-produced one" — normative per spec §9 Open Questions. `commitment_hex` and
    // `parsed_values.commitment` should agree; if they don't, the parsed value from
    // `public_values` wins since that's the bit-exact, verifiable source.
    let commitment = parsed_values.commitment;
    if hex::decode(commitment_hex.trim_start_matches("0x")).ok().as_deref() != Some(commitment.as_slice()) {
        warn!(
            checkbook_id = %job.checkbook_id,
            "zkvm top-level `commitment` field disagrees with public_values; using public_values"
        );
    }

    // Commitment-change rule (spec §4.2): recompute nullifiers for every allocation
    // against the fresh commitment, overwriting any stale ones from a prior attempt.
    let mut tx = db.pool().begin().await?;
    update_checkbook_commitment(
        &mut tx,
        job.checkbook_id,
        &commitment,
        &proof_bytes,
        &public_values_bytes,
        CheckbookStatus::SubmittingCommitment,
    )
    .await?;

    for allocation in &allocations {
        let amount_u128 = allocation
            .amount
            .to_u128()
            .ok_or_else(|| RelayerError::Internal(format!("allocation {} amount out of u128 range", allocation.id)))?;
        let nullifier = nullifier::derive_nullifier(&commitment, allocation.seq, amount_u128);
        update_allocation_nullifier(&mut tx, allocation.id, &nullifier).await?;
    }
    tx.commit().await?;

    hub.broadcast(PushEvent {
        entity_kind: EntityKind::Checkbooks,
        entity_id: job.checkbook_id.to_string(),
        owner: checkbook.owner.clone(),
        status: CheckbookStatus::SubmittingCommitment.to_string(),
        asset_id: None,
    })
    .await;

    info!(checkbook_id = %job.checkbook_id, "proof pipeline succeeded, handing off to submission");

    submission
        .submit_commitment(SubmitCommitmentJob {
            checkbook_id: job.checkbook_id,
            chain_id: checkbook.chain_id,
            owner: checkbook.owner,
            commitment,
            proof_blob: proof_bytes,
            public_values: public_values_bytes,
        })
        .await
        .map_err(|_| RelayerError::Internal("submission queue closed".into()))?;

    Ok(())
}

fn build_zkvm_request(
    checkbook: &Checkbook,
    job: &ProofJob,
    allocations: &[payment_core::models::Allocation],
) -> Result<ZkvmBuildCommitmentRequest> {
    let allocations_for_zkvm = allocations
        .iter()
        .map(|a| {
            let amount_u128 = a
                .amount
                .to_u128()
                .ok_or_else(|| RelayerError::Internal(format!("allocation {} amount out of u128 range", a.id)))?;
            Ok(ZkvmAllocationInput {
                seq: a.seq,
                amount: hex::encode(nullifier::amount_to_be32(amount_u128)),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ZkvmBuildCommitmentRequest {
        allocations: allocations_for_zkvm,
        deposit_id: hex::encode(nullifier::deposit_id_to_be32(checkbook.local_deposit_id)),
        signature: ZkvmSignature {
            chain_id: checkbook.chain_id,
            signature_data: hex::encode(&job.signature),
            public_key: None,
        },
        owner_address: ZkvmOwnerAddress {
            chain_id: checkbook.chain_id,
            address: checkbook.owner.to_hex(),
        },
        token_key: checkbook.token_symbol.clone(),
        chain_name: None,
        lang: 0,
    })
}

async fn fail_proof(db: &Database, hub: &Hub, checkbook_id: Uuid, message: String) -> Result<()> {
    error!(checkbook_id = %checkbook_id, error = %message, "proof pipeline failed");
    let mut tx = db.pool().begin().await?;
    let checkbook = fetch_checkbook_for_update(&mut tx, checkbook_id)
        .await?
        .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;
    update_checkbook_status(&mut tx, checkbook_id, CheckbookStatus::ProofFailed).await?;
    tx.commit().await?;

    hub.broadcast(PushEvent {
        entity_kind: EntityKind::Checkbooks,
        entity_id: checkbook_id.to_string(),
        owner: checkbook.owner,
        status: CheckbookStatus::ProofFailed.to_string(),
        asset_id: None,
    })
    .await;

    Err(RelayerError::ProofFailed(message))
}
