use chrono::{DateTime, Utc};
use payment_core::models::Allocation;
use payment_core::status::AllocationStatus;
use payment_core::UniversalAddress;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use super::Database;

struct AllocationRow {
    id: Uuid,
    checkbook_id: Uuid,
    seq: i16,
    amount: Decimal,
    recipient_chain_id: i32,
    recipient_data: Vec<u8>,
    nullifier: Option<Vec<u8>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AllocationRow {
    fn into_model(self) -> Result<Allocation, sqlx::Error> {
        let status =
            AllocationStatus::from_str(&self.status).map_err(|e| sqlx::Error::Decode(e.into()))?;
        let mut recipient_bytes = [0u8; 32];
        recipient_bytes.copy_from_slice(&self.recipient_data);
        Ok(Allocation {
            id: self.id,
            checkbook_id: self.checkbook_id,
            seq: self.seq as u8,
            amount: self.amount,
            recipient: UniversalAddress {
                chain_id: self.recipient_chain_id as u32,
                data: recipient_bytes,
            },
            nullifier: self.nullifier.map(|v| {
                let mut out = [0u8; 32];
                out.copy_from_slice(&v);
                out
            }),
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Database {
    pub async fn list_allocations_for_checkbook(
        &self,
        checkbook_id: Uuid,
    ) -> Result<Vec<Allocation>, sqlx::Error> {
        let rows = sqlx::query_as!(
            AllocationRow,
            r#"SELECT id, checkbook_id, seq, amount, recipient_chain_id, recipient_data,
                      nullifier, status, created_at, updated_at
               FROM allocations WHERE checkbook_id = $1 ORDER BY seq ASC"#,
            checkbook_id,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AllocationRow::into_model).collect()
    }

    pub async fn list_allocations_by_owner(
        &self,
        owner: &UniversalAddress,
    ) -> Result<Vec<Allocation>, sqlx::Error> {
        let rows = sqlx::query_as!(
            AllocationRow,
            r#"SELECT a.id, a.checkbook_id, a.seq, a.amount, a.recipient_chain_id,
                      a.recipient_data, a.nullifier, a.status, a.created_at, a.updated_at
               FROM allocations a
               JOIN checkbooks c ON c.id = a.checkbook_id
               WHERE c.owner_chain_id = $1 AND c.owner_data = $2
               ORDER BY a.created_at DESC"#,
            owner.chain_id as i32,
            owner.data.as_slice(),
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AllocationRow::into_model).collect()
    }
}

/// `CreateAllocations` retry idempotence (spec §4.1/R2): delete any existing Allocations
/// for the Checkbook before inserting the fresh set, inside the caller's transaction.
pub async fn delete_allocations_for_checkbook(
    tx: &mut Transaction<'_, Postgres>,
    checkbook_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query!("DELETE FROM allocations WHERE checkbook_id = $1", checkbook_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn insert_allocation(
    tx: &mut Transaction<'_, Postgres>,
    allocation: &Allocation,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO allocations (
            id, checkbook_id, seq, amount, recipient_chain_id, recipient_data, nullifier,
            status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        "#,
        allocation.id,
        allocation.checkbook_id,
        allocation.seq as i16,
        allocation.amount,
        allocation.recipient.chain_id as i32,
        allocation.recipient.data.as_slice(),
        allocation.nullifier.as_ref().map(|n| n.as_slice()),
        allocation.status.as_str(),
        allocation.created_at,
        allocation.updated_at,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn fetch_allocations_for_update(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<Vec<Allocation>, sqlx::Error> {
    let rows = sqlx::query_as!(
        AllocationRow,
        r#"SELECT id, checkbook_id, seq, amount, recipient_chain_id, recipient_data,
                  nullifier, status, created_at, updated_at
           FROM allocations WHERE id = ANY($1) FOR UPDATE"#,
        ids,
    )
    .fetch_all(&mut **tx)
    .await?;
    rows.into_iter().map(AllocationRow::into_model).collect()
}

pub async fn update_allocation_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: AllocationStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE allocations SET status = $1, updated_at = now() WHERE id = $2",
        status.as_str(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_allocation_nullifier(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    nullifier: &[u8; 32],
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE allocations SET nullifier = $1, updated_at = now() WHERE id = $2",
        nullifier.as_slice(),
        id,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
