use chrono::{DateTime, Utc};
use payment_core::models::Checkbook;
use payment_core::status::CheckbookStatus;
use payment_core::UniversalAddress;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use super::Database;

struct CheckbookRow {
    id: Uuid,
    chain_id: i32,
    local_deposit_id: i64,
    owner_chain_id: i32,
    owner_data: Vec<u8>,
    token_symbol: String,
    token_contract_address: String,
    gross_amount: Decimal,
    fee_amount: Decimal,
    allocatable_amount: Decimal,
    commitment: Option<Vec<u8>>,
    proof_blob: Option<Vec<u8>>,
    public_values: Option<Vec<u8>>,
    deposit_tx_hash: Option<String>,
    commitment_tx_hash: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CheckbookRow {
    fn into_model(self) -> Result<Checkbook, sqlx::Error> {
        let status = CheckbookStatus::from_str(&self.status)
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let mut owner_bytes = [0u8; 32];
        owner_bytes.copy_from_slice(&self.owner_data);
        let owner = UniversalAddress {
            chain_id: self.owner_chain_id as u32,
            data: owner_bytes,
        };
        Ok(Checkbook {
            id: self.id,
            chain_id: self.chain_id as u32,
            local_deposit_id: self.local_deposit_id as u64,
            owner,
            token_symbol: self.token_symbol,
            token_contract_address: self.token_contract_address,
            gross_amount: self.gross_amount,
            fee_amount: self.fee_amount,
            allocatable_amount: self.allocatable_amount,
            commitment: self.commitment.map(|v| {
                let mut out = [0u8; 32];
                out.copy_from_slice(&v);
                out
            }),
            proof_blob: self.proof_blob,
            public_values: self.public_values,
            deposit_tx_hash: self.deposit_tx_hash,
            commitment_tx_hash: self.commitment_tx_hash,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Database {
    pub async fn insert_checkbook(&self, checkbook: &Checkbook) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            INSERT INTO checkbooks (
                id, chain_id, local_deposit_id, owner_chain_id, owner_data, token_symbol,
                token_contract_address, gross_amount, fee_amount, allocatable_amount,
                commitment, proof_blob, public_values, deposit_tx_hash, commitment_tx_hash,
                status, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            "#,
            checkbook.id,
            checkbook.chain_id as i32,
            checkbook.local_deposit_id as i64,
            checkbook.owner.chain_id as i32,
            checkbook.owner.data.as_slice(),
            checkbook.token_symbol,
            checkbook.token_contract_address,
            checkbook.gross_amount,
            checkbook.fee_amount,
            checkbook.allocatable_amount,
            checkbook.commitment.as_ref().map(|c| c.as_slice()),
            checkbook.proof_blob.as_deref(),
            checkbook.public_values.as_deref(),
            checkbook.deposit_tx_hash,
            checkbook.commitment_tx_hash,
            checkbook.status.as_str(),
            checkbook.created_at,
            checkbook.updated_at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_checkbook(&self, id: Uuid) -> Result<Option<Checkbook>, sqlx::Error> {
        let row = sqlx::query_as!(
            CheckbookRow,
            r#"SELECT id, chain_id, local_deposit_id, owner_chain_id, owner_data,
                      token_symbol, token_contract_address, gross_amount, fee_amount,
                      allocatable_amount, commitment, proof_blob, public_values,
                      deposit_tx_hash, commitment_tx_hash, status, created_at, updated_at
               FROM checkbooks WHERE id = $1"#,
            id
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(CheckbookRow::into_model).transpose()
    }

    pub async fn fetch_checkbook_by_deposit(
        &self,
        chain_id: u32,
        local_deposit_id: u64,
    ) -> Result<Option<Checkbook>, sqlx::Error> {
        let row = sqlx::query_as!(
            CheckbookRow,
            r#"SELECT id, chain_id, local_deposit_id, owner_chain_id, owner_data,
                      token_symbol, token_contract_address, gross_amount, fee_amount,
                      allocatable_amount, commitment, proof_blob, public_values,
                      deposit_tx_hash, commitment_tx_hash, status, created_at, updated_at
               FROM checkbooks WHERE chain_id = $1 AND local_deposit_id = $2"#,
            chain_id as i32,
            local_deposit_id as i64,
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(CheckbookRow::into_model).transpose()
    }

    pub async fn list_checkbooks_by_owner(
        &self,
        owner: &UniversalAddress,
    ) -> Result<Vec<Checkbook>, sqlx::Error> {
        let rows = sqlx::query_as!(
            CheckbookRow,
            r#"SELECT id, chain_id, local_deposit_id, owner_chain_id, owner_data,
                      token_symbol, token_contract_address, gross_amount, fee_amount,
                      allocatable_amount, commitment, proof_blob, public_values,
                      deposit_tx_hash, commitment_tx_hash, status, created_at, updated_at
               FROM checkbooks WHERE owner_chain_id = $1 AND owner_data = $2
               ORDER BY created_at DESC"#,
            owner.chain_id as i32,
            owner.data.as_slice(),
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CheckbookRow::into_model).collect()
    }
}

/// Fetches a Checkbook row `FOR UPDATE` inside an open transaction — the row-level lock
/// that serializes per-Checkbook state transitions (spec §5 "Ordering guarantees").
pub async fn fetch_checkbook_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Checkbook>, sqlx::Error> {
    let row = sqlx::query_as!(
        CheckbookRow,
        r#"SELECT id, chain_id, local_deposit_id, owner_chain_id, owner_data,
                  token_symbol, token_contract_address, gross_amount, fee_amount,
                  allocatable_amount, commitment, proof_blob, public_values,
                  deposit_tx_hash, commitment_tx_hash, status, created_at, updated_at
           FROM checkbooks WHERE id = $1 FOR UPDATE"#,
        id
    )
    .fetch_optional(&mut **tx)
    .await?;
    row.map(CheckbookRow::into_model).transpose()
}

pub async fn update_checkbook_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: CheckbookStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE checkbooks SET status = $1, updated_at = now() WHERE id = $2",
        status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_checkbook_commitment(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    commitment: &[u8; 32],
    proof_blob: &[u8],
    public_values: &[u8],
    status: CheckbookStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE checkbooks
           SET commitment = $1, proof_blob = $2, public_values = $3, status = $4, updated_at = now()
           WHERE id = $5"#,
        commitment.as_slice(),
        proof_blob,
        public_values,
        status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_checkbook_commitment_tx_hash(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    tx_hash: &str,
    status: CheckbookStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE checkbooks SET commitment_tx_hash = $1, status = $2, updated_at = now() WHERE id = $3",
        tx_hash,
        status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
