// ledger/src/entry.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cents, Currency};

/// A signed minor-unit movement on exactly one account, attributable to
/// exactly one transaction. `currency` always equals the owning account's
/// currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub currency: Currency,
    pub amount_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        transaction_id: Uuid,
        account_id: Uuid,
        currency: Currency,
        amount_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            transaction_id,
            account_id,
            currency,
            amount_cents,
            created_at: Utc::now(),
        }
    }
}
