//! `sqlx::Type` glue for the status enums in `payment_core::status`.
//!
//! `payment-core` stays free of a `sqlx` dependency (it has no I/O at all), so the
//! `FromStr`/`Display` impls it defines are reused here to implement `sqlx::Type` /
//! `sqlx::Decode` / `sqlx::Encode` against a Postgres `TEXT` column. This is the "closed
//! sum types, not stringly typed outside the persistence boundary" rule made concrete:
//! every other layer of this service passes the real enum, never a `String`.

use std::str::FromStr;

use payment_core::status::{
    AllocationStatus, CheckbookStatus, WithdrawExecuteStatus, WithdrawHookStatus,
    WithdrawPayoutStatus, WithdrawRequestStatus,
};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};

macro_rules! text_enum_sqlx_type {
    ($ty:ty) => {
        impl Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <String as Type<Postgres>>::type_info()
            }
        }

        impl<'q> Encode<'q, Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut PgArgumentBuffer,
            ) -> Result<IsNull, BoxDynError> {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <&str as Decode<Postgres>>::decode(value)?;
                Ok(<$ty>::from_str(s)?)
            }
        }
    };
}

text_enum_sqlx_type!(CheckbookStatus);
text_enum_sqlx_type!(AllocationStatus);
text_enum_sqlx_type!(WithdrawRequestStatus);
text_enum_sqlx_type!(WithdrawExecuteStatus);
text_enum_sqlx_type!(WithdrawPayoutStatus);
text_enum_sqlx_type!(WithdrawHookStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_checkbook_status_round_trips_through_as_str() {
        let variants = [
            CheckbookStatus::Unsigned,
            CheckbookStatus::ReadyForCommitment,
            CheckbookStatus::Signaturing,
            CheckbookStatus::GeneratingProof,
            CheckbookStatus::SubmittingCommitment,
            CheckbookStatus::CommitmentPending,
            CheckbookStatus::WithCheckbook,
            CheckbookStatus::Deleted,
            CheckbookStatus::ProofFailed,
            CheckbookStatus::SubmissionFailed,
        ];
        for v in variants {
            let s = v.as_str();
            assert_eq!(CheckbookStatus::from_str(s).unwrap(), v);
        }
    }
}
