//! `CreateWithdrawRequest` / `CancelWithdrawRequest` (spec §4.1). The lock-then-check
//! dance here is I4 and P6 made concrete: every referenced Allocation must be observed
//! `idle` under `FOR UPDATE` before any of them flips to `pending`, and the whole
//! operation commits or fails atomically.

use chrono::{Duration as ChronoDuration, Utc};
use payment_core::models::WithdrawRequest;
use payment_core::status::{AllocationStatus, WithdrawExecuteStatus, WithdrawHookStatus, WithdrawPayoutStatus, WithdrawRequestStatus};
use payment_core::UniversalAddress;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::allocations::{fetch_allocations_for_update, update_allocation_status};
use crate::db::withdraw_requests::{
    fetch_withdraw_request_for_update, update_withdraw_hook, update_withdraw_payload_blob,
    update_withdraw_payout, update_withdraw_status,
};
use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::polling::PollingSchedulerHandle;
use crate::push::{EntityKind, Hub, PushEvent};
use crate::submission::{SubmissionHandle, SubmitWithdrawExecuteJob};

#[derive(Clone)]
pub struct WithdrawOps {
    pub db: Database,
    pub hub: Hub,
    pub submission: SubmissionHandle,
    pub polling: PollingSchedulerHandle,
    pub withdraw_timeout_seconds: i64,
}

/// Everything `CreateWithdrawRequest` needs beyond the allocation id list (spec §3
/// WithdrawRequest fields, minus the ones derived server-side).
pub struct NewWithdrawIntent {
    pub chain_id: u32,
    pub beneficiary: UniversalAddress,
    pub intent_type: payment_core::status::IntentType,
    pub token_symbol: String,
    pub asset_id: Option<String>,
    pub signature: Vec<u8>,
    pub payload_blob: Option<Vec<u8>>,
}

impl WithdrawOps {
    /// `CreateWithdrawRequest` (spec §4.1, I4, P6, scenario 3 "double-spend attempt").
    /// All-or-nothing: every referenced Allocation must be `idle` and owned by `caller`
    /// at lock time, and the summed amount must match the intent, or the whole call
    /// fails `AllocationUnavailable` (returned here as `InvalidStatus`/`Validation`)
    /// without mutating anything.
    pub async fn create_withdraw_request(
        &self,
        caller: &UniversalAddress,
        allocation_ids: Vec<Uuid>,
        amount: Decimal,
        intent: NewWithdrawIntent,
    ) -> Result<WithdrawRequest> {
        if allocation_ids.is_empty() {
            return Err(RelayerError::InvalidRequest(
                "at least one allocation is required".into(),
            ));
        }

        let mut tx = self.db.pool().begin().await?;

        // Row-level lock on every referenced Allocation, in a stable order (sorted by
        // id) so two concurrent overlapping requests can't deadlock each other.
        let mut sorted_ids = allocation_ids.clone();
        sorted_ids.sort();
        let allocations = fetch_allocations_for_update(&mut tx, &sorted_ids).await?;

        if allocations.len() != allocation_ids.len() {
            return Err(RelayerError::NotFound(
                "one or more allocations not found".into(),
            ));
        }

        for allocation in &allocations {
            if allocation.recipient != *caller {
                // Merged with NotFound at the boundary (spec §7) to avoid enumeration.
                return Err(RelayerError::NotFound("allocation not found".into()));
            }
            if allocation.status != AllocationStatus::Idle {
                return Err(RelayerError::Conflict(format!(
                    "allocation {} is not idle (status {})",
                    allocation.id, allocation.status
                )));
            }
        }

        let summed: Decimal = allocations.iter().map(|a| a.amount).sum();
        if summed != amount {
            return Err(RelayerError::InvalidRequest(format!(
                "intent amount {amount} does not match summed allocation amount {summed}"
            )));
        }

        for allocation in &allocations {
            update_allocation_status(&mut tx, allocation.id, AllocationStatus::Pending).await?;
        }

        let now = Utc::now();
        let request = WithdrawRequest {
            id: Uuid::new_v4(),
            owner: caller.clone(),
            chain_id: intent.chain_id,
            amount,
            beneficiary: intent.beneficiary,
            intent_type: intent.intent_type,
            token_symbol: intent.token_symbol,
            asset_id: intent.asset_id,
            signature: intent.signature,
            payload_blob: intent.payload_blob,
            status: WithdrawRequestStatus::Pending,
            execute_status: WithdrawExecuteStatus::Pending,
            payout_status: WithdrawPayoutStatus::NotStarted,
            hook_status: WithdrawHookStatus::None,
            execute_tx_hash: None,
            payout_tx_hash: None,
            timeout_deadline: now + ChronoDuration::seconds(self.withdraw_timeout_seconds),
            created_at: now,
            updated_at: now,
        };

        crate::db::withdraw_requests::insert_withdraw_request_tx(&mut tx, &request, &allocation_ids)
            .await?;

        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: request.id.to_string(),
                owner: request.owner.clone(),
                status: request.status.to_string(),
                asset_id: request.asset_id.clone(),
            })
            .await;

        Ok(request)
    }

    /// `CancelWithdrawRequest` (spec §4.1, P6): allowed only while the on-chain execute
    /// has not succeeded. Reverts every referenced Allocation to `idle` exactly once —
    /// re-running this on an already-cancelled request is a no-op (idempotent), since
    /// the status guard below rejects anything not `pending`/`executing`.
    pub async fn cancel_withdraw_request(
        &self,
        id: Uuid,
        caller: &UniversalAddress,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }

        if !request.status.allows_cancel() {
            return Err(RelayerError::InvalidStatus(format!(
                "cannot cancel withdraw request in status {}",
                request.status
            )));
        }
        if request.execute_status == WithdrawExecuteStatus::Verified {
            return Err(RelayerError::InvalidStatus(
                "execute already succeeded on-chain, cancel is no longer possible".into(),
            ));
        }

        let allocation_ids = crate::db::withdraw_requests::allocation_ids_for_withdraw_request_tx(
            &mut tx, id,
        )
        .await?;
        let mut sorted_ids = allocation_ids.clone();
        sorted_ids.sort();
        let allocations = fetch_allocations_for_update(&mut tx, &sorted_ids).await?;
        for allocation in &allocations {
            if allocation.status == AllocationStatus::Pending {
                update_allocation_status(&mut tx, allocation.id, AllocationStatus::Idle).await?;
            }
        }

        update_withdraw_status(&mut tx, id, WithdrawRequestStatus::Cancelled).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::Cancelled.to_string(),
                asset_id: request.asset_id,
            })
            .await;

        Ok(())
    }

    /// `claim-timeout` (spec §6, scenario 6): allowed once the execute confirmation
    /// poller has marked `execute_status = timed_out`. No Allocation is marked `used`;
    /// allocations revert to `idle` exactly like a cancel.
    pub async fn claim_timeout(&self, id: Uuid, caller: &UniversalAddress) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }
        if request.execute_status != WithdrawExecuteStatus::TimedOut {
            return Err(RelayerError::InvalidStatus(
                "withdraw request has not timed out".into(),
            ));
        }

        let allocation_ids = crate::db::withdraw_requests::allocation_ids_for_withdraw_request_tx(
            &mut tx, id,
        )
        .await?;
        let mut sorted_ids = allocation_ids.clone();
        sorted_ids.sort();
        let allocations = fetch_allocations_for_update(&mut tx, &sorted_ids).await?;
        for allocation in &allocations {
            if allocation.status == AllocationStatus::Pending {
                update_allocation_status(&mut tx, allocation.id, AllocationStatus::Idle).await?;
            }
        }

        update_withdraw_status(&mut tx, id, WithdrawRequestStatus::TimedOut).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::TimedOut.to_string(),
                asset_id: request.asset_id,
            })
            .await;

        Ok(())
    }

    /// Stores the signed `executeWithdraw` calldata ahead of broadcast (spec §6
    /// `POST /withdrawals/:id/proof`). No status transition — the payload is just
    /// staged until `execute_withdraw` enqueues it.
    pub async fn submit_withdraw_proof(
        &self,
        id: Uuid,
        caller: &UniversalAddress,
        payload_blob: Vec<u8>,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }
        if request.status != WithdrawRequestStatus::Pending {
            return Err(RelayerError::InvalidStatus(format!(
                "cannot submit a proof from status {}",
                request.status
            )));
        }

        update_withdraw_payload_blob(&mut tx, id, &payload_blob).await?;
        tx.commit().await?;
        Ok(())
    }

    /// `execute` (spec §4.1/§4.3): hands the staged payload to the submission queue.
    /// Transitions to `executing` eagerly, mirroring `CheckbookOps::submit_commitment`'s
    /// guard against a second concurrent call re-enqueueing the same broadcast.
    pub async fn execute_withdraw(&self, id: Uuid, caller: &UniversalAddress) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }
        if request.status == WithdrawRequestStatus::Executing {
            return Err(RelayerError::AlreadyInProgress(
                "withdraw execute already in flight".into(),
            ));
        }
        if request.status != WithdrawRequestStatus::Pending {
            return Err(RelayerError::InvalidStatus(format!(
                "cannot execute withdraw request from status {}",
                request.status
            )));
        }
        let payload_blob = request.payload_blob.clone().ok_or_else(|| {
            RelayerError::InvalidRequest("no proof payload submitted for this withdrawal".into())
        })?;

        update_withdraw_status(&mut tx, id, WithdrawRequestStatus::Executing).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: id.to_string(),
                owner: request.owner.clone(),
                status: WithdrawRequestStatus::Executing.to_string(),
                asset_id: request.asset_id.clone(),
            })
            .await;

        self.submission
            .submit_withdraw_execute(SubmitWithdrawExecuteJob {
                withdraw_request_id: id,
                chain_id: request.chain_id,
                owner: request.owner,
                payload_blob,
            })
            .await
            .map_err(|_| RelayerError::Internal("submission queue closed".into()))?;

        Ok(())
    }

    /// `retry-payout` (spec §6, scenario 5): re-registers the payout poll after a
    /// payout poll exhausted its retries or observed an event mismatch. Reuses the
    /// execute tx hash, since execute and payout are emitted by the same on-chain
    /// transaction (spec §4.3).
    pub async fn retry_payout(&self, id: Uuid, caller: &UniversalAddress) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }
        if request.payout_status != payment_core::status::WithdrawPayoutStatus::Failed {
            return Err(RelayerError::InvalidStatus(
                "payout has not failed, nothing to retry".into(),
            ));
        }
        let tx_hash = request.execute_tx_hash.clone().ok_or_else(|| {
            RelayerError::Internal("payout failed but no execute tx hash was recorded".into())
        })?;

        update_withdraw_payout(&mut tx, id, payment_core::status::WithdrawPayoutStatus::Pending, None)
            .await?;
        tx.commit().await?;

        self.polling
            .register_withdraw_payout_confirmation(id, request.chain_id, tx_hash)
            .await?;
        Ok(())
    }

    /// `retry-hook` (spec §6, scenario 5): re-registers the hook poll after it
    /// exhausted retries or observed an event mismatch, moving the request out of
    /// `completed_with_hook_failed` back to `executing` while the hook is retried.
    pub async fn retry_hook(&self, id: Uuid, caller: &UniversalAddress) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        let request = fetch_withdraw_request_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RelayerError::NotFound("withdraw request not found".into()))?;

        if request.owner != *caller {
            return Err(RelayerError::NotFound("withdraw request not found".into()));
        }
        if request.hook_status != payment_core::status::WithdrawHookStatus::Failed {
            return Err(RelayerError::InvalidStatus(
                "hook has not failed, nothing to retry".into(),
            ));
        }
        let tx_hash = request.execute_tx_hash.clone().ok_or_else(|| {
            RelayerError::Internal("hook failed but no execute tx hash was recorded".into())
        })?;

        update_withdraw_hook(&mut tx, id, payment_core::status::WithdrawHookStatus::Pending).await?;
        update_withdraw_status(&mut tx, id, WithdrawRequestStatus::Executing).await?;
        tx.commit().await?;

        self.hub
            .broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: id.to_string(),
                owner: request.owner.clone(),
                status: WithdrawRequestStatus::Executing.to_string(),
                asset_id: request.asset_id.clone(),
            })
            .await;

        self.polling
            .register_withdraw_hook_confirmation(id, request.chain_id, tx_hash)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summed_amount_mismatch_is_a_validation_error_shape() {
        // Documents the contract checked above: the comparison is exact Decimal
        // equality, not an epsilon compare, since amounts are decimal strings end to
        // end (spec §3).
        let a = Decimal::new(500, 1); // 50.0
        let b = Decimal::new(5000, 2); // 50.00
        assert_eq!(a, b);
    }
}
