//! Polling & reconciliation scheduler (spec §4.4): a single `tokio::time::interval`
//! loop round-robining over tasks loaded from `polling_tasks` at startup, plus any
//! registered afterwards, so a restart resumes mid-flight polling (spec: "tasks persist
//! across restarts"). §9 explicitly prefers this over a timer-wheel "at the expected
//! task counts (hundreds, not millions)".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payment_core::models::{PollingEntityType, PollingTask, PollingTaskType};
use payment_core::status::{
    AllocationStatus, CheckbookStatus, IntentType, WithdrawExecuteStatus, WithdrawHookStatus,
    WithdrawPayoutStatus, WithdrawRequestStatus,
};
use payment_core::wire::ScannerTxResponse;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::allocations::{fetch_allocations_for_update, update_allocation_status};
use crate::db::checkbooks::{fetch_checkbook_for_update, update_checkbook_status};
use crate::db::polling_tasks::{delete_polling_task, increment_polling_retry, insert_polling_task};
use crate::db::withdraw_requests::{
    allocation_ids_for_withdraw_request_tx, fetch_withdraw_request_for_update,
    update_withdraw_execute, update_withdraw_hook, update_withdraw_payout, update_withdraw_status,
};
use crate::db::Database;
use crate::error::Result;
use crate::push::{EntityKind, Hub, PushEvent};

/// Tick cadence of the scheduler loop itself; individual tasks are only actually
/// polled once `interval_seconds` has elapsed since their last attempt (spec §4.4
/// default 10s), so this can run tighter without over-polling the scanner.
const SCHEDULER_TICK: Duration = Duration::from_secs(3);

/// Chain RPC/scanner call timeout (spec §5).
const SCANNER_TIMEOUT: Duration = Duration::from_secs(30);

enum Registration {
    Task(PollingTask),
}

#[derive(Clone)]
pub struct PollingSchedulerHandle {
    tx: mpsc::Sender<Registration>,
    /// Interval stamped onto every newly registered task (spec §6 `POLL_INTERVAL_SECONDS`
    /// env var; defaults to `PollingTask::DEFAULT_INTERVAL_SECONDS` when unset).
    interval_seconds: u32,
}

impl PollingSchedulerHandle {
    pub async fn register_commitment_confirmation(
        &self,
        checkbook_id: Uuid,
        chain_id: u32,
        tx_hash: String,
    ) -> Result<()> {
        let now = Utc::now();
        let task = PollingTask {
            id: Uuid::new_v4(),
            entity_type: PollingEntityType::Checkbook,
            entity_id: checkbook_id,
            task_type: PollingTaskType::CommitmentConfirmation,
            chain_id,
            tx_hash,
            target_status: CheckbookStatus::WithCheckbook.to_string(),
            retries_done: 0,
            max_retries: PollingTask::DEFAULT_MAX_RETRIES,
            interval_seconds: self.interval_seconds,
            created_at: now,
            updated_at: now,
        };
        self.tx
            .send(Registration::Task(task))
            .await
            .map_err(|_| crate::error::RelayerError::Internal("polling scheduler channel closed".into()))
    }

    pub async fn register_withdraw_execute_confirmation(
        &self,
        withdraw_request_id: Uuid,
        chain_id: u32,
        tx_hash: String,
    ) -> Result<()> {
        let now = Utc::now();
        let task = PollingTask {
            id: Uuid::new_v4(),
            entity_type: PollingEntityType::WithdrawRequest,
            entity_id: withdraw_request_id,
            task_type: PollingTaskType::WithdrawExecuteConfirmation,
            chain_id,
            tx_hash,
            target_status: WithdrawExecuteStatus::Verified.to_string(),
            retries_done: 0,
            max_retries: PollingTask::DEFAULT_MAX_RETRIES,
            interval_seconds: self.interval_seconds,
            created_at: now,
            updated_at: now,
        };
        self.tx
            .send(Registration::Task(task))
            .await
            .map_err(|_| crate::error::RelayerError::Internal("polling scheduler channel closed".into()))
    }

    pub async fn register_withdraw_payout_confirmation(
        &self,
        withdraw_request_id: Uuid,
        chain_id: u32,
        tx_hash: String,
    ) -> Result<()> {
        let now = Utc::now();
        let task = PollingTask {
            id: Uuid::new_v4(),
            entity_type: PollingEntityType::WithdrawRequest,
            entity_id: withdraw_request_id,
            task_type: PollingTaskType::WithdrawPayoutConfirmation,
            chain_id,
            tx_hash,
            target_status: "success".to_string(),
            retries_done: 0,
            max_retries: PollingTask::DEFAULT_MAX_RETRIES,
            interval_seconds: self.interval_seconds,
            created_at: now,
            updated_at: now,
        };
        self.tx
            .send(Registration::Task(task))
            .await
            .map_err(|_| crate::error::RelayerError::Internal("polling scheduler channel closed".into()))
    }

    /// Only registered for `asset_token` intents (spec §3 `completed_with_hook_failed`
    /// implies a hook step exists for some intents but not others).
    pub async fn register_withdraw_hook_confirmation(
        &self,
        withdraw_request_id: Uuid,
        chain_id: u32,
        tx_hash: String,
    ) -> Result<()> {
        let now = Utc::now();
        let task = PollingTask {
            id: Uuid::new_v4(),
            entity_type: PollingEntityType::WithdrawRequest,
            entity_id: withdraw_request_id,
            task_type: PollingTaskType::WithdrawHookConfirmation,
            chain_id,
            tx_hash,
            target_status: "success".to_string(),
            retries_done: 0,
            max_retries: PollingTask::DEFAULT_MAX_RETRIES,
            interval_seconds: self.interval_seconds,
            created_at: now,
            updated_at: now,
        };
        self.tx
            .send(Registration::Task(task))
            .await
            .map_err(|_| crate::error::RelayerError::Internal("polling scheduler channel closed".into()))
    }
}

pub struct PollingScheduler;

impl PollingScheduler {
    pub async fn spawn(
        db: Database,
        hub: Hub,
        scanner_url: String,
        poll_interval_seconds: u64,
    ) -> Result<PollingSchedulerHandle> {
        let existing = db.list_polling_tasks().await?;
        let (tx, mut rx) = mpsc::channel::<Registration>(256);
        let handle = PollingSchedulerHandle {
            tx: tx.clone(),
            interval_seconds: poll_interval_seconds.clamp(1, u32::MAX as u64) as u32,
        };
        let tasks = Arc::new(Mutex::new(existing));
        let client = Arc::new(
            reqwest::Client::builder()
                .timeout(SCANNER_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        );

        {
            let tasks = tasks.clone();
            let db = db.clone();
            tokio::spawn(async move {
                while let Some(Registration::Task(task)) = rx.recv().await {
                    match db.pool().begin().await {
                        Ok(mut dbtx) => {
                            if let Err(e) = insert_polling_task(&mut dbtx, &task).await {
                                error!(task_id = %task.id, error = %e, "failed to persist polling task");
                                continue;
                            }
                            if let Err(e) = dbtx.commit().await {
                                error!(task_id = %task.id, error = %e, "failed to commit polling task insert");
                                continue;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "failed to open transaction for polling task insert");
                            continue;
                        }
                    }
                    tasks.lock().await.push(task);
                }
            });
        }

        {
            let tasks = tasks.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SCHEDULER_TICK);
                loop {
                    ticker.tick().await;
                    let due: Vec<PollingTask> = {
                        let guard = tasks.lock().await;
                        guard
                            .iter()
                            .filter(|t| {
                                let elapsed = Utc::now().signed_duration_since(t.updated_at);
                                elapsed.num_seconds() >= t.interval_seconds as i64
                            })
                            .cloned()
                            .collect()
                    };

                    for task in due {
                        let db = db.clone();
                        let hub = hub.clone();
                        let handle = handle.clone();
                        let client = client.clone();
                        let scanner_url = scanner_url.clone();
                        let tasks = tasks.clone();
                        tokio::spawn(async move {
                            match poll_once(&db, &hub, &handle, &client, &scanner_url, &task).await {
                                Ok(Outcome::Done) => {
                                    let mut guard = tasks.lock().await;
                                    guard.retain(|t| t.id != task.id);
                                }
                                Ok(Outcome::Retry) => {
                                    if let Err(e) = increment_polling_retry(db.pool(), task.id).await {
                                        error!(task_id = %task.id, error = %e, "failed to persist retry increment");
                                    }
                                    let mut guard = tasks.lock().await;
                                    if let Some(t) = guard.iter_mut().find(|t| t.id == task.id) {
                                        t.retries_done += 1;
                                        t.updated_at = Utc::now();
                                    }
                                }
                                Err(e) => {
                                    warn!(task_id = %task.id, error = %e, "polling task errored, will retry next tick");
                                }
                            }
                        });
                    }
                }
            });
        }

        Ok(handle)
    }
}

enum Outcome {
    Done,
    Retry,
}

async fn poll_once(
    db: &Database,
    hub: &Hub,
    polling: &PollingSchedulerHandle,
    client: &reqwest::Client,
    scanner_url: &str,
    task: &PollingTask,
) -> Result<Outcome> {
    let url = format!("{scanner_url}/tx/{}/{}", task.chain_id, task.tx_hash);
    let response = client.get(&url).send().await;
    let scanner_response: ScannerTxResponse = match response {
        Ok(resp) => match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "scanner response undecodable, retrying");
                return finish_or_retry(db, hub, task).await;
            }
        },
        Err(e) => {
            debug!(task_id = %task.id, error = %e, "scanner unreachable, retrying");
            return finish_or_retry(db, hub, task).await;
        }
    };

    if !scanner_response.confirmed {
        return finish_or_retry(db, hub, task).await;
    }

    let expected_event = match task.task_type {
        PollingTaskType::CommitmentConfirmation => "CommitmentSubmitted",
        PollingTaskType::WithdrawExecuteConfirmation => "WithdrawExecuted",
        PollingTaskType::WithdrawPayoutConfirmation => "PayoutSent",
        PollingTaskType::WithdrawHookConfirmation => "HookExecuted",
    };
    let event_matches = scanner_response
        .events
        .iter()
        .any(|e| e.name == expected_event);

    if event_matches {
        advance_entity(db, hub, polling, task).await?;
        delete_polling_task(db.pool(), task.id).await?;
        Ok(Outcome::Done)
    } else {
        mark_event_mismatch(db, hub, task).await?;
        delete_polling_task(db.pool(), task.id).await?;
        Ok(Outcome::Done)
    }
}

async fn finish_or_retry(db: &Database, hub: &Hub, task: &PollingTask) -> Result<Outcome> {
    if task.is_exhausted() {
        mark_timed_out(db, hub, task).await?;
        delete_polling_task(db.pool(), task.id).await?;
        Ok(Outcome::Done)
    } else {
        Ok(Outcome::Retry)
    }
}

/// Step 2 of spec §4.4: confirmed with expected event -> advance entity, delete task,
/// emit push.
async fn advance_entity(
    db: &Database,
    hub: &Hub,
    polling: &PollingSchedulerHandle,
    task: &PollingTask,
) -> Result<()> {
    match task.task_type {
        PollingTaskType::CommitmentConfirmation => {
            let mut tx = db.pool().begin().await?;
            let checkbook = fetch_checkbook_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("checkbook not found".into()))?;
            update_checkbook_status(&mut tx, task.entity_id, CheckbookStatus::WithCheckbook).await?;
            tx.commit().await?;

            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: task.entity_id.to_string(),
                owner: checkbook.owner,
                status: CheckbookStatus::WithCheckbook.to_string(),
                asset_id: None,
            })
            .await;
            info!(checkbook_id = %task.entity_id, "commitment confirmed on-chain");
        }
        PollingTaskType::WithdrawExecuteConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_execute(&mut tx, task.entity_id, WithdrawExecuteStatus::Verified, None).await?;

            let allocation_ids = allocation_ids_for_withdraw_request_tx(&mut tx, task.entity_id).await?;
            let mut sorted_ids = allocation_ids.clone();
            sorted_ids.sort();
            let allocations = fetch_allocations_for_update(&mut tx, &sorted_ids).await?;
            for allocation in &allocations {
                if allocation.status == AllocationStatus::Pending {
                    update_allocation_status(&mut tx, allocation.id, AllocationStatus::Used).await?;
                }
            }
            // Execute and payout are emitted by the same on-chain transaction
            // (spec §4.3), so the payout poll reuses the execute task's tx_hash.
            update_withdraw_payout(&mut tx, task.entity_id, WithdrawPayoutStatus::Pending, None).await?;
            tx.commit().await?;

            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner.clone(),
                status: WithdrawExecuteStatus::Verified.to_string(),
                asset_id: request.asset_id.clone(),
            })
            .await;
            info!(withdraw_request_id = %task.entity_id, "withdraw execute confirmed, allocations marked used (P5)");

            polling
                .register_withdraw_payout_confirmation(task.entity_id, task.chain_id, task.tx_hash.clone())
                .await?;
        }
        PollingTaskType::WithdrawPayoutConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_payout(&mut tx, task.entity_id, WithdrawPayoutStatus::Success, None).await?;

            let needs_hook = request.intent_type == IntentType::AssetToken;
            let final_status = if needs_hook {
                update_withdraw_hook(&mut tx, task.entity_id, WithdrawHookStatus::Pending).await?;
                request.status
            } else {
                update_withdraw_status(&mut tx, task.entity_id, WithdrawRequestStatus::Completed).await?;
                WithdrawRequestStatus::Completed
            };
            tx.commit().await?;

            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner.clone(),
                status: final_status.to_string(),
                asset_id: request.asset_id.clone(),
            })
            .await;
            info!(withdraw_request_id = %task.entity_id, "withdraw payout confirmed");

            if needs_hook {
                polling
                    .register_withdraw_hook_confirmation(task.entity_id, task.chain_id, task.tx_hash.clone())
                    .await?;
            }
        }
        PollingTaskType::WithdrawHookConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_hook(&mut tx, task.entity_id, WithdrawHookStatus::Success).await?;
            update_withdraw_status(&mut tx, task.entity_id, WithdrawRequestStatus::Completed).await?;
            tx.commit().await?;

            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::Completed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
            info!(withdraw_request_id = %task.entity_id, "withdraw hook confirmed");
        }
    }
    Ok(())
}

/// Step 3 of spec §4.4: confirmed but event mismatch -> mark entity failure.
async fn mark_event_mismatch(db: &Database, hub: &Hub, task: &PollingTask) -> Result<()> {
    match task.task_type {
        PollingTaskType::CommitmentConfirmation => {
            let mut tx = db.pool().begin().await?;
            let checkbook = fetch_checkbook_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("checkbook not found".into()))?;
            update_checkbook_status(&mut tx, task.entity_id, CheckbookStatus::SubmissionFailed).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: task.entity_id.to_string(),
                owner: checkbook.owner,
                status: CheckbookStatus::SubmissionFailed.to_string(),
                asset_id: None,
            })
            .await;
        }
        PollingTaskType::WithdrawExecuteConfirmation => {
            // verify_failed (spec §4.4, §7, §8 scenario 4): terminal, no retry, only
            // Cancel is allowed from here on.
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_execute(&mut tx, task.entity_id, WithdrawExecuteStatus::VerifyFailed, None).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawExecuteStatus::VerifyFailed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
            warn!(withdraw_request_id = %task.entity_id, "withdraw execute event mismatch, marked verify_failed");
        }
        PollingTaskType::WithdrawPayoutConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_payout(&mut tx, task.entity_id, WithdrawPayoutStatus::Failed, None).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawPayoutStatus::Failed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
        }
        PollingTaskType::WithdrawHookConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_hook(&mut tx, task.entity_id, WithdrawHookStatus::Failed).await?;
            update_withdraw_status(&mut tx, task.entity_id, WithdrawRequestStatus::CompletedWithHookFailed).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::CompletedWithHookFailed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
            warn!(withdraw_request_id = %task.entity_id, "withdraw hook event mismatch, marked completed_with_hook_failed");
        }
    }
    Ok(())
}

/// Step 5 of spec §4.4: exhausted -> `timed_out` (withdraws) or `submission_failed`
/// (commits).
async fn mark_timed_out(db: &Database, hub: &Hub, task: &PollingTask) -> Result<()> {
    match task.task_type {
        PollingTaskType::CommitmentConfirmation => {
            let mut tx = db.pool().begin().await?;
            let checkbook = fetch_checkbook_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("checkbook not found".into()))?;
            update_checkbook_status(&mut tx, task.entity_id, CheckbookStatus::SubmissionFailed).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Checkbooks,
                entity_id: task.entity_id.to_string(),
                owner: checkbook.owner,
                status: CheckbookStatus::SubmissionFailed.to_string(),
                asset_id: None,
            })
            .await;
        }
        PollingTaskType::WithdrawExecuteConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_execute(&mut tx, task.entity_id, WithdrawExecuteStatus::TimedOut, None).await?;
            update_withdraw_status(&mut tx, task.entity_id, WithdrawRequestStatus::TimedOut).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::TimedOut.to_string(),
                asset_id: request.asset_id,
            })
            .await;
            warn!(withdraw_request_id = %task.entity_id, "withdraw execute confirmation exhausted retries, timed_out");
        }
        PollingTaskType::WithdrawPayoutConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_payout(&mut tx, task.entity_id, WithdrawPayoutStatus::Failed, None).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawPayoutStatus::Failed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
        }
        PollingTaskType::WithdrawHookConfirmation => {
            let mut tx = db.pool().begin().await?;
            let request = fetch_withdraw_request_for_update(&mut tx, task.entity_id)
                .await?
                .ok_or_else(|| crate::error::RelayerError::NotFound("withdraw request not found".into()))?;
            update_withdraw_hook(&mut tx, task.entity_id, WithdrawHookStatus::Failed).await?;
            update_withdraw_status(&mut tx, task.entity_id, WithdrawRequestStatus::CompletedWithHookFailed).await?;
            tx.commit().await?;
            hub.broadcast(PushEvent {
                entity_kind: EntityKind::Withdraws,
                entity_id: task.entity_id.to_string(),
                owner: request.owner,
                status: WithdrawRequestStatus::CompletedWithHookFailed.to_string(),
                asset_id: request.asset_id,
            })
            .await;
            warn!(withdraw_request_id = %task.entity_id, "withdraw hook confirmation exhausted retries, completed_with_hook_failed");
        }
    }
    Ok(())
}
