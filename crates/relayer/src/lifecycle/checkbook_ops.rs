use chrono::Utc;
use payment_core::models::{Allocation, Checkbook, MAX_ALLOCATIONS_PER_CHECKBOOK};
use payment_core::status::{AllocationStatus, CheckbookStatus};
use payment_core::UniversalAddress;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::allocations::{delete_allocations_for_checkbook, insert_allocation};
use crate::db::checkbooks::{fetch_checkbook_for_update, update_checkbook_status};
use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::proof_pipeline::{ProofJob, ProofPipelineHandle};
use crate::push::{EntityKind, Hub, PushEvent};

/// Bundles the lifecycle operations over Checkbook/Allocation, mirroring the teacher's
/// pattern of a service struct wrapping its dependencies (see `withdrawal.rs`'s
/// `WithdrawalService`, generalized here to the Checkbook side of this system).
#[derive(Clone)]
pub struct CheckbookOps {
    pub db: Database,
    pub hub: Hub,
    pub proof_pipeline: ProofPipelineHandle,
}

impl CheckbookOps {
    /// `CreateAllocations` (spec §4.1). Deletes any existing Allocations for retry
    /// idempotence (R2), then inserts the fresh set and transitions to `signaturing`.
    pub async fn create_allocations(
        &self,
        checkbook_id: Uuid,
        caller: &UniversalAddress,
        amounts: Vec<(UniversalAddress, Decimal)>,
    ) -> Result<Checkbook> {
        if amounts.len() > MAX_ALLOCATIONS_PER_CHECKBOOK {
            return Err(RelayerError::InvalidRequest(format!(
                "at most {MAX_ALLOCATIONS_PER_CHECKBOOK} allocations per checkbook, got {}",
                amounts.len()
            )));
        }
        if amounts.is_empty() {
            return Err(RelayerError::InvalidRequest(
                "at least one allocation amount is required".into(),
            ));
        }

        let mut tx = self.db.pool().begin().await?;
        let checkbook = fetch_checkbook_for_update(&mut tx, checkbook_id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;

        // I5: owner address comparison uses UniversalAddress, never header params.
        if checkbook.owner != *caller {
            return Err(RelayerError::NotFound("checkbook not found".into()));
        }

        if !checkbook.status.allows_create_allocations() {
            return Err(RelayerError::InvalidStatus(format!(
                "cannot create allocations from status {}",
                checkbook.status
            )));
        }

        delete_allocations_for_checkbook(&mut tx, checkbook_id).await?;

        let now = Utc::now();
        for (seq, (recipient, amount)) in amounts.into_iter().enumerate() {
            let allocation = Allocation {
                id: Uuid::new_v4(),
                checkbook_id,
                seq: seq as u8,
                amount,
                recipient,
                nullifier: None,
                status: AllocationStatus::Idle,
                created_at: now,
                updated_at: now,
            };
            insert_allocation(&mut tx, &allocation).await?;
        }

        update_checkbook_status(&mut tx, checkbook_id, CheckbookStatus::Signaturing).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: checkbook_id.to_string(),
                owner: checkbook.owner,
                status: CheckbookStatus::Signaturing.to_string(),
                asset_id: None,
            })
            .await;

        let mut updated = checkbook;
        updated.status = CheckbookStatus::Signaturing;
        Ok(updated)
    }

    /// `SubmitCommitment` (spec §4.1). Rejects `AlreadyInProgress` if the pipeline is
    /// already running for this checkbook; otherwise hands off to the proof pipeline
    /// (§4.2) and transitions to `generating_proof`.
    pub async fn submit_commitment(
        &self,
        checkbook_id: Uuid,
        caller: &UniversalAddress,
        signature: Vec<u8>,
        intent_payload: Vec<u8>,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let checkbook = fetch_checkbook_for_update(&mut tx, checkbook_id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;

        if checkbook.owner != *caller {
            return Err(RelayerError::NotFound("checkbook not found".into()));
        }

        if checkbook.status.is_in_progress() {
            return Err(RelayerError::AlreadyInProgress(format!(
                "commitment pipeline already running ({})",
                checkbook.status
            )));
        }
        if !checkbook.status.allows_submit_commitment() {
            return Err(RelayerError::InvalidStatus(format!(
                "cannot submit commitment from status {}",
                checkbook.status
            )));
        }

        update_checkbook_status(&mut tx, checkbook_id, CheckbookStatus::GeneratingProof).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: checkbook_id.to_string(),
                owner: checkbook.owner.clone(),
                status: CheckbookStatus::GeneratingProof.to_string(),
                asset_id: None,
            })
            .await;

        self.proof_pipeline
            .enqueue(ProofJob {
                checkbook_id,
                signature,
                intent_payload,
            })
            .await
            .map_err(|_| RelayerError::Internal("proof pipeline queue closed".into()))?;

        Ok(())
    }

    /// `DeleteCheckbook` (spec §4.1): only when every Allocation is `used` or the
    /// Checkbook is already `deleted`. Completed Allocations do not revert.
    pub async fn delete_checkbook(&self, checkbook_id: Uuid, caller: &UniversalAddress) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let checkbook = fetch_checkbook_for_update(&mut tx, checkbook_id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("checkbook not found".into()))?;

        if checkbook.owner != *caller {
            return Err(RelayerError::NotFound("checkbook not found".into()));
        }

        if checkbook.status != CheckbookStatus::Deleted {
            let allocations = crate::db::allocations::fetch_allocations_for_update(
                &mut tx,
                &allocation_ids_for(&self.db, checkbook_id).await?,
            )
            .await?;
            if allocations
                .iter()
                .any(|a| a.status != AllocationStatus::Used)
            {
                return Err(RelayerError::InvalidStatus(
                    "all allocations must be used before deleting a checkbook".into(),
                ));
            }
        }

        update_checkbook_status(&mut tx, checkbook_id, CheckbookStatus::Deleted).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: checkbook_id.to_string(),
                owner: checkbook.owner,
                status: CheckbookStatus::Deleted.to_string(),
                asset_id: None,
            })
            .await;

        Ok(())
    }
}

async fn allocation_ids_for(db: &Database, checkbook_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(db
        .list_allocations_for_checkbook(checkbook_id)
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect())
}
