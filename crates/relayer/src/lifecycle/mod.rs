//! Lifecycle state machine (spec §4.1): the single authoritative source of truth for
//! Checkbook/Allocation/WithdrawRequest status transitions. Every operation here opens
//! its own transaction, takes the row-level lock it needs, and emits its push
//! notification only after `tx.commit().await?` returns `Ok` (spec §4.1, P7).

pub mod checkbook_ops;
pub mod db_types;
pub mod deposit_sync;
pub mod withdraw_ops;

pub use checkbook_ops::*;
pub use deposit_sync::*;
pub use withdraw_ops::*;
