//! Status enums for the lifecycle state machine (spec §3 "Lifecycles", §9 "closed sum
//! types... exhaustiveness checks at the transition function").
//!
//! These derive `sqlx::Type` in the `relayer` crate via a newtype wrapper rather than
//! here, so `payment-core` stays free of a `sqlx` dependency; see
//! `relayer::lifecycle::db_types` for the `FromStr`/`Display` + `sqlx::Type` glue.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckbookStatus {
    Unsigned,
    ReadyForCommitment,
    Signaturing,
    GeneratingProof,
    SubmittingCommitment,
    CommitmentPending,
    WithCheckbook,
    Deleted,
    ProofFailed,
    SubmissionFailed,
}

impl CheckbookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned",
            Self::ReadyForCommitment => "ready_for_commitment",
            Self::Signaturing => "signaturing",
            Self::GeneratingProof => "generating_proof",
            Self::SubmittingCommitment => "submitting_commitment",
            Self::CommitmentPending => "commitment_pending",
            Self::WithCheckbook => "with_checkbook",
            Self::Deleted => "deleted",
            Self::ProofFailed => "proof_failed",
            Self::SubmissionFailed => "submission_failed",
        }
    }

    /// Statuses from which `CreateAllocations` is allowed (spec §4.1).
    pub fn allows_create_allocations(&self) -> bool {
        matches!(
            self,
            Self::ReadyForCommitment | Self::ProofFailed | Self::SubmissionFailed
        )
    }

    /// Statuses from which `SubmitCommitment` is allowed.
    pub fn allows_submit_commitment(&self) -> bool {
        matches!(self, Self::Signaturing | Self::ProofFailed | Self::SubmissionFailed)
    }

    /// Statuses that mean "a commitment pipeline run is already underway" (spec
    /// §4.1 `AlreadyInProgress`).
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::GeneratingProof | Self::SubmittingCommitment | Self::CommitmentPending
        )
    }
}

impl fmt::Display for CheckbookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckbookStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unsigned" => Self::Unsigned,
            "ready_for_commitment" => Self::ReadyForCommitment,
            "signaturing" => Self::Signaturing,
            "generating_proof" => Self::GeneratingProof,
            "submitting_commitment" => Self::SubmittingCommitment,
            "commitment_pending" => Self::CommitmentPending,
            "with_checkbook" => Self::WithCheckbook,
            "deleted" => Self::Deleted,
            "proof_failed" => Self::ProofFailed,
            "submission_failed" => Self::SubmissionFailed,
            other => return Err(format!("unknown checkbook status: {other}")),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Idle,
    Pending,
    Used,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Used => "used",
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AllocationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "idle" => Self::Idle,
            "pending" => Self::Pending,
            "used" => Self::Used,
            other => return Err(format!("unknown allocation status: {other}")),
        })
    }
}

/// Top-level WithdrawRequest status (spec §3 Lifecycles): a coarse status used for
/// indexing and the `cancel` precondition, independent of the finer-grained
/// execute/payout/hook sub-statuses below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawRequestStatus {
    Pending,
    Executing,
    Completed,
    CompletedWithHookFailed,
    Failed,
    Cancelled,
    TimedOut,
}

impl WithdrawRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::CompletedWithHookFailed => "completed_with_hook_failed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// spec §4.1 `CancelWithdrawRequest`: allowed only while execute has not succeeded.
    pub fn allows_cancel(&self) -> bool {
        matches!(self, Self::Pending | Self::Executing)
    }
}

impl fmt::Display for WithdrawRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WithdrawRequestStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "executing" => Self::Executing,
            "completed" => Self::Completed,
            "completed_with_hook_failed" => Self::CompletedWithHookFailed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "timed_out" => Self::TimedOut,
            other => return Err(format!("unknown withdraw request status: {other}")),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawExecuteStatus {
    Pending,
    Submitted,
    Verified,
    VerifyFailed,
    TimedOut,
}

impl WithdrawExecuteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::VerifyFailed => "verify_failed",
            Self::TimedOut => "timed_out",
        }
    }

    /// §7: retry is allowed for submission/proof failures but never for verify_failed.
    pub fn allows_retry(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for WithdrawExecuteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WithdrawExecuteStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "submitted" => Self::Submitted,
            "verified" => Self::Verified,
            "verify_failed" => Self::VerifyFailed,
            "timed_out" => Self::TimedOut,
            other => return Err(format!("unknown execute status: {other}")),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawPayoutStatus {
    NotStarted,
    Pending,
    Success,
    Failed,
}

impl WithdrawPayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WithdrawPayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WithdrawPayoutStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "not_started" => Self::NotStarted,
            "pending" => Self::Pending,
            "success" => Self::Success,
            "failed" => Self::Failed,
            other => return Err(format!("unknown payout status: {other}")),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawHookStatus {
    None,
    Pending,
    Success,
    Failed,
}

impl WithdrawHookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WithdrawHookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WithdrawHookStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => Self::None,
            "pending" => Self::Pending,
            "success" => Self::Success,
            "failed" => Self::Failed,
            other => return Err(format!("unknown hook status: {other}")),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    RawToken,
    AssetToken,
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawToken => write!(f, "raw_token"),
            Self::AssetToken => write!(f, "asset_token"),
        }
    }
}
