use chrono::{DateTime, Utc};
use payment_core::models::WithdrawRequest;
use payment_core::status::{
    IntentType, WithdrawExecuteStatus, WithdrawHookStatus, WithdrawPayoutStatus,
    WithdrawRequestStatus,
};
use payment_core::UniversalAddress;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use super::Database;

struct WithdrawRequestRow {
    id: Uuid,
    owner_chain_id: i32,
    owner_data: Vec<u8>,
    chain_id: i32,
    amount: Decimal,
    beneficiary_chain_id: i32,
    beneficiary_data: Vec<u8>,
    intent_type: String,
    token_symbol: String,
    asset_id: Option<String>,
    signature: Vec<u8>,
    payload_blob: Option<Vec<u8>>,
    status: String,
    execute_status: String,
    payout_status: String,
    hook_status: String,
    execute_tx_hash: Option<String>,
    payout_tx_hash: Option<String>,
    timeout_deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WithdrawRequestRow {
    fn into_model(self) -> Result<WithdrawRequest, sqlx::Error> {
        let mut owner_bytes = [0u8; 32];
        owner_bytes.copy_from_slice(&self.owner_data);
        let mut beneficiary_bytes = [0u8; 32];
        beneficiary_bytes.copy_from_slice(&self.beneficiary_data);
        let intent_type = match self.intent_type.as_str() {
            "raw_token" => IntentType::RawToken,
            "asset_token" => IntentType::AssetToken,
            other => {
                return Err(sqlx::Error::Decode(
                    format!("unknown intent_type: {other}").into(),
                ))
            }
        };
        Ok(WithdrawRequest {
            id: self.id,
            owner: UniversalAddress {
                chain_id: self.owner_chain_id as u32,
                data: owner_bytes,
            },
            chain_id: self.chain_id as u32,
            amount: self.amount,
            beneficiary: UniversalAddress {
                chain_id: self.beneficiary_chain_id as u32,
                data: beneficiary_bytes,
            },
            intent_type,
            token_symbol: self.token_symbol,
            asset_id: self.asset_id,
            signature: self.signature,
            payload_blob: self.payload_blob,
            status: WithdrawRequestStatus::from_str(&self.status)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            execute_status: WithdrawExecuteStatus::from_str(&self.execute_status)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            payout_status: WithdrawPayoutStatus::from_str(&self.payout_status)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            hook_status: WithdrawHookStatus::from_str(&self.hook_status)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            execute_tx_hash: self.execute_tx_hash,
            payout_tx_hash: self.payout_tx_hash,
            timeout_deadline: self.timeout_deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Database {
    pub async fn insert_withdraw_request(
        &self,
        req: &WithdrawRequest,
        allocation_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query!(
            r#"
            INSERT INTO withdraw_requests (
                id, owner_chain_id, owner_data, chain_id, amount, beneficiary_chain_id,
                beneficiary_data, intent_type, token_symbol, asset_id, signature,
                payload_blob, status, execute_status, payout_status, hook_status,
                execute_tx_hash, payout_tx_hash, timeout_deadline, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)
            "#,
            req.id,
            req.owner.chain_id as i32,
            req.owner.data.as_slice(),
            req.chain_id as i32,
            req.amount,
            req.beneficiary.chain_id as i32,
            req.beneficiary.data.as_slice(),
            req.intent_type.to_string(),
            req.token_symbol,
            req.asset_id,
            req.signature,
            req.payload_blob,
            req.status.as_str(),
            req.execute_status.as_str(),
            req.payout_status.as_str(),
            req.hook_status.as_str(),
            req.execute_tx_hash,
            req.payout_tx_hash,
            req.timeout_deadline,
            req.created_at,
            req.updated_at,
        )
        .execute(&mut *tx)
        .await?;

        for allocation_id in allocation_ids {
            sqlx::query!(
                "INSERT INTO withdraw_request_allocations (withdraw_request_id, allocation_id) VALUES ($1, $2)",
                req.id,
                allocation_id,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn fetch_withdraw_request(
        &self,
        id: Uuid,
    ) -> Result<Option<WithdrawRequest>, sqlx::Error> {
        let row = sqlx::query_as!(
            WithdrawRequestRow,
            r#"SELECT id, owner_chain_id, owner_data, chain_id, amount, beneficiary_chain_id,
                      beneficiary_data, intent_type, token_symbol, asset_id, signature,
                      payload_blob, status, execute_status, payout_status, hook_status,
                      execute_tx_hash, payout_tx_hash, timeout_deadline, created_at, updated_at
               FROM withdraw_requests WHERE id = $1"#,
            id,
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(WithdrawRequestRow::into_model).transpose()
    }

    pub async fn list_withdraw_requests_by_owner(
        &self,
        owner: &UniversalAddress,
    ) -> Result<Vec<WithdrawRequest>, sqlx::Error> {
        let rows = sqlx::query_as!(
            WithdrawRequestRow,
            r#"SELECT id, owner_chain_id, owner_data, chain_id, amount, beneficiary_chain_id,
                      beneficiary_data, intent_type, token_symbol, asset_id, signature,
                      payload_blob, status, execute_status, payout_status, hook_status,
                      execute_tx_hash, payout_tx_hash, timeout_deadline, created_at, updated_at
               FROM withdraw_requests WHERE owner_chain_id = $1 AND owner_data = $2
               ORDER BY created_at DESC"#,
            owner.chain_id as i32,
            owner.data.as_slice(),
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(WithdrawRequestRow::into_model)
            .collect()
    }

    pub async fn allocation_ids_for_withdraw_request(
        &self,
        id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows = sqlx::query!(
            "SELECT allocation_id FROM withdraw_request_allocations WHERE withdraw_request_id = $1",
            id,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.allocation_id).collect())
    }
}

/// Transaction-scoped variant of `insert_withdraw_request`, used by
/// `WithdrawOps::create_withdraw_request` so the insert commits atomically with the
/// Allocation status flips in the same transaction (spec §4.1 "the whole operation is
/// all-or-nothing").
pub async fn insert_withdraw_request_tx(
    tx: &mut Transaction<'_, Postgres>,
    req: &WithdrawRequest,
    allocation_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO withdraw_requests (
            id, owner_chain_id, owner_data, chain_id, amount, beneficiary_chain_id,
            beneficiary_data, intent_type, token_symbol, asset_id, signature,
            payload_blob, status, execute_status, payout_status, hook_status,
            execute_tx_hash, payout_tx_hash, timeout_deadline, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)
        "#,
        req.id,
        req.owner.chain_id as i32,
        req.owner.data.as_slice(),
        req.chain_id as i32,
        req.amount,
        req.beneficiary.chain_id as i32,
        req.beneficiary.data.as_slice(),
        req.intent_type.to_string(),
        req.token_symbol,
        req.asset_id,
        req.signature,
        req.payload_blob,
        req.status.as_str(),
        req.execute_status.as_str(),
        req.payout_status.as_str(),
        req.hook_status.as_str(),
        req.execute_tx_hash,
        req.payout_tx_hash,
        req.timeout_deadline,
        req.created_at,
        req.updated_at,
    )
    .execute(&mut **tx)
    .await?;

    for allocation_id in allocation_ids {
        sqlx::query!(
            "INSERT INTO withdraw_request_allocations (withdraw_request_id, allocation_id) VALUES ($1, $2)",
            req.id,
            allocation_id,
        )
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Transaction-scoped variant of `allocation_ids_for_withdraw_request`, for use inside
/// `CancelWithdrawRequest`/`claim-timeout` where the caller already holds an open `tx`.
pub async fn allocation_ids_for_withdraw_request_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query!(
        "SELECT allocation_id FROM withdraw_request_allocations WHERE withdraw_request_id = $1",
        id,
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(|r| r.allocation_id).collect())
}

pub async fn fetch_withdraw_request_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<WithdrawRequest>, sqlx::Error> {
    let row = sqlx::query_as!(
        WithdrawRequestRow,
        r#"SELECT id, owner_chain_id, owner_data, chain_id, amount, beneficiary_chain_id,
                  beneficiary_data, intent_type, token_symbol, asset_id, signature,
                  payload_blob, status, execute_status, payout_status, hook_status,
                  execute_tx_hash, payout_tx_hash, timeout_deadline, created_at, updated_at
           FROM withdraw_requests WHERE id = $1 FOR UPDATE"#,
        id,
    )
    .fetch_optional(&mut **tx)
    .await?;
    row.map(WithdrawRequestRow::into_model).transpose()
}

pub async fn update_withdraw_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: WithdrawRequestStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE withdraw_requests SET status = $1, updated_at = now() WHERE id = $2",
        status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_withdraw_execute(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    execute_status: WithdrawExecuteStatus,
    execute_tx_hash: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE withdraw_requests
           SET execute_status = $1, execute_tx_hash = COALESCE($2, execute_tx_hash), updated_at = now()
           WHERE id = $3"#,
        execute_status.as_str(),
        execute_tx_hash,
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_withdraw_payout(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    payout_status: WithdrawPayoutStatus,
    payout_tx_hash: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE withdraw_requests
           SET payout_status = $1, payout_tx_hash = COALESCE($2, payout_tx_hash), updated_at = now()
           WHERE id = $3"#,
        payout_status.as_str(),
        payout_tx_hash,
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_withdraw_payload_blob(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    payload_blob: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE withdraw_requests SET payload_blob = $1, updated_at = now() WHERE id = $2",
        payload_blob,
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_withdraw_hook(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    hook_status: WithdrawHookStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE withdraw_requests SET hook_status = $1, updated_at = now() WHERE id = $2",
        hook_status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
