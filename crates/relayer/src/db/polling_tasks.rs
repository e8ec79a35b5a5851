use chrono::{DateTime, Utc};
use payment_core::models::{PollingEntityType, PollingTask, PollingTaskType};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::Database;

struct PollingTaskRow {
    id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    task_type: String,
    chain_id: i32,
    tx_hash: String,
    target_status: String,
    retries_done: i32,
    max_retries: i32,
    interval_seconds: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PollingTaskRow {
    fn into_model(self) -> Result<PollingTask, sqlx::Error> {
        let entity_type = match self.entity_type.as_str() {
            "checkbook" => PollingEntityType::Checkbook,
            "withdraw_request" => PollingEntityType::WithdrawRequest,
            other => {
                return Err(sqlx::Error::Decode(
                    format!("unknown polling entity_type: {other}").into(),
                ))
            }
        };
        let task_type = match self.task_type.as_str() {
            "commitment_confirmation" => PollingTaskType::CommitmentConfirmation,
            "withdraw_execute_confirmation" => PollingTaskType::WithdrawExecuteConfirmation,
            "withdraw_payout_confirmation" => PollingTaskType::WithdrawPayoutConfirmation,
            "withdraw_hook_confirmation" => PollingTaskType::WithdrawHookConfirmation,
            other => {
                return Err(sqlx::Error::Decode(
                    format!("unknown polling task_type: {other}").into(),
                ))
            }
        };
        Ok(PollingTask {
            id: self.id,
            entity_type,
            entity_id: self.entity_id,
            task_type,
            chain_id: self.chain_id as u32,
            tx_hash: self.tx_hash,
            target_status: self.target_status,
            retries_done: self.retries_done as u32,
            max_retries: self.max_retries as u32,
            interval_seconds: self.interval_seconds as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn entity_type_str(t: PollingEntityType) -> &'static str {
    match t {
        PollingEntityType::Checkbook => "checkbook",
        PollingEntityType::WithdrawRequest => "withdraw_request",
    }
}

fn task_type_str(t: PollingTaskType) -> &'static str {
    match t {
        PollingTaskType::CommitmentConfirmation => "commitment_confirmation",
        PollingTaskType::WithdrawExecuteConfirmation => "withdraw_execute_confirmation",
        PollingTaskType::WithdrawPayoutConfirmation => "withdraw_payout_confirmation",
        PollingTaskType::WithdrawHookConfirmation => "withdraw_hook_confirmation",
    }
}

impl Database {
    /// Loads every outstanding task at startup so the scheduler resumes mid-flight
    /// polling after a restart (spec §4.4 "tasks persist across restarts").
    pub async fn list_polling_tasks(&self) -> Result<Vec<PollingTask>, sqlx::Error> {
        let rows = sqlx::query_as!(
            PollingTaskRow,
            r#"SELECT id, entity_type, entity_id, task_type, chain_id, tx_hash,
                      target_status, retries_done, max_retries, interval_seconds,
                      created_at, updated_at
               FROM polling_tasks ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PollingTaskRow::into_model).collect()
    }
}

pub async fn insert_polling_task(
    tx: &mut Transaction<'_, Postgres>,
    task: &PollingTask,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO polling_tasks (
            id, entity_type, entity_id, task_type, chain_id, tx_hash, target_status,
            retries_done, max_retries, interval_seconds, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        "#,
        task.id,
        entity_type_str(task.entity_type),
        task.entity_id,
        task_type_str(task.task_type),
        task.chain_id as i32,
        task.tx_hash,
        task.target_status,
        task.retries_done as i32,
        task.max_retries as i32,
        task.interval_seconds as i32,
        task.created_at,
        task.updated_at,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn delete_polling_task(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query!("DELETE FROM polling_tasks WHERE id = $1", id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_polling_retry(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE polling_tasks SET retries_done = retries_done + 1, updated_at = now() WHERE id = $1",
        id,
    )
    .execute(pool)
    .await?;
    Ok(())
}
