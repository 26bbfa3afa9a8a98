// ledger/src/transaction.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cents, Currency, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    InitialDeposit,
    Transfer,
    Exchange,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialDeposit => "initial_deposit",
            Self::Transfer => "transfer",
            Self::Exchange => "exchange",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "initial_deposit" => Ok(Self::InitialDeposit),
            "transfer" => Ok(Self::Transfer),
            "exchange" => Ok(Self::Exchange),
            other => Err(Error::Validation(format!(
                "unknown transaction type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The externally-meaningful event grouping one or more ledger entries.
/// For exchanges, `currency` and `amount_cents` describe the source side;
/// the destination side is recoverable from the paired entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub from_user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<Uuid>,
    pub currency: Currency,
    pub amount_cents: Cents,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        from_user_id: Uuid,
        to_user_id: Option<Uuid>,
        currency: Currency,
        amount_cents: Cents,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            from_user_id,
            to_user_id,
            currency,
            amount_cents,
            description,
            created_at: Utc::now(),
        }
    }
}
