//! Admin-triggered deposit sync (spec §6: "`GET /events/...` used by admin adapter
//! sync"). This is the only place a Checkbook ever comes into existence: on-chain
//! contracts hold user deposits directly, so this service's job is to reconcile its
//! off-chain shadow with deposit events the scanner has already confirmed, not to
//! construct or broadcast anything itself (spec §1 Non-goals).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payment_core::models::{ChainConfig, Checkbook};
use payment_core::status::CheckbookStatus;
use payment_core::wire::ScannerEventsResponse;
use payment_core::{ChainAdapter, UniversalAddress};
use serde::Serialize;
use sqlx::error::DatabaseError;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{RelayerError, Result};
use crate::push::{EntityKind, Hub, PushEvent};

const SCANNER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct DepositSyncSummary {
    pub created: usize,
    pub skipped: usize,
    pub last_block: u64,
}

/// One clone per `AppState`; cursors are shared across clones via the inner `Arc`.
#[derive(Clone)]
pub struct DepositSyncOps {
    db: Database,
    hub: Hub,
    adapters: HashMap<u32, Arc<dyn ChainAdapter>>,
    scanner_url: String,
    /// High-water mark per chain, seeded from `ChainConfig::last_synced_block` at
    /// startup. There is no admin CRUD for `ChainConfig` (spec §1 Non-goals), so this
    /// lives in memory only — a restart re-scans from the configured floor, which is
    /// idempotent: existing `(chain_id, local_deposit_id)` rows are skipped rather
    /// than duplicated (unique index, spec §6 "Persisted state").
    cursors: Arc<Mutex<HashMap<u32, u64>>>,
    client: reqwest::Client,
}

impl DepositSyncOps {
    pub fn new(
        db: Database,
        hub: Hub,
        adapters: HashMap<u32, Arc<dyn ChainAdapter>>,
        scanner_url: String,
        chains: &[ChainConfig],
    ) -> Self {
        let cursors = chains
            .iter()
            .map(|c| (c.slip44_id, c.last_synced_block))
            .collect();
        Self {
            db,
            hub,
            adapters,
            scanner_url,
            cursors: Arc::new(Mutex::new(cursors)),
            client: reqwest::Client::builder()
                .timeout(SCANNER_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        }
    }

    /// Pulls every deposit the scanner has observed on `chain_id` since the last sync
    /// and creates a Checkbook for each one not already known. Scanner events are
    /// already-confirmed on-chain facts, so new Checkbooks start directly in
    /// `ready_for_commitment` — there is no further polling task to wait on.
    pub async fn sync_deposits(&self, chain_id: u32) -> Result<DepositSyncSummary> {
        let adapter = self
            .adapters
            .get(&chain_id)
            .ok_or_else(|| RelayerError::InvalidRequest(format!("unconfigured chain_id {chain_id}")))?;

        let since_block = *self.cursors.lock().await.get(&chain_id).unwrap_or(&0);

        let url = format!("{}/events/{chain_id}?since_block={since_block}", self.scanner_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayerError::Scanner(format!("scanner unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(RelayerError::Scanner(format!("scanner returned {}", response.status())));
        }
        let body: ScannerEventsResponse = response
            .json()
            .await
            .map_err(|e| RelayerError::Scanner(format!("scanner response undecodable: {e}")))?;

        let mut created = 0usize;
        let mut skipped = 0usize;
        for deposit in body.deposits {
            if self
                .db
                .fetch_checkbook_by_deposit(chain_id, deposit.local_deposit_id)
                .await?
                .is_some()
            {
                skipped += 1;
                continue;
            }

            let owner = UniversalAddress {
                chain_id,
                data: adapter.normalize_address(&deposit.owner_address)?,
            };
            let allocatable_amount = deposit.gross_amount - deposit.fee_amount;
            let now = Utc::now();
            let checkbook = Checkbook {
                id: Uuid::new_v4(),
                chain_id,
                local_deposit_id: deposit.local_deposit_id,
                owner: owner.clone(),
                token_symbol: deposit.token_symbol,
                token_contract_address: deposit.token_contract_address,
                gross_amount: deposit.gross_amount,
                fee_amount: deposit.fee_amount,
                allocatable_amount,
                commitment: None,
                proof_blob: None,
                public_values: None,
                deposit_tx_hash: Some(deposit.tx_hash),
                commitment_tx_hash: None,
                status: CheckbookStatus::ReadyForCommitment,
                created_at: now,
                updated_at: now,
            };

            if let Err(e) = self.db.insert_checkbook(&checkbook).await {
                // Two concurrent syncs racing on the same deposit: the unique index on
                // (chain_id, local_deposit_id) makes the loser's insert a conflict, not
                // a real failure.
                if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                    skipped += 1;
                    continue;
                }
                return Err(e.into());
            }

            self.hub
                .broadcast(PushEvent {
                    entity_kind: EntityKind::Checkbooks,
                    entity_id: checkbook.id.to_string(),
                    owner,
                    status: CheckbookStatus::ReadyForCommitment.to_string(),
                    asset_id: None,
                })
                .await;
            created += 1;
            info!(
                chain_id,
                local_deposit_id = deposit.local_deposit_id,
                "checkbook created from scanner deposit event"
            );
        }

        self.cursors.lock().await.insert(chain_id, body.last_block);

        Ok(DepositSyncSummary {
            created,
            skipped,
            last_block: body.last_block,
        })
    }
}
