// ledger/src/account.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cents, Currency};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance_cents: Cents,
    pub allow_negative: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: Uuid, currency: Currency, balance_cents: Cents) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            currency,
            balance_cents,
            allow_negative: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A system account that may run a negative balance, such as the FX
    /// accounts that source and sink exchanged units.
    pub fn new_system(user_id: Uuid, currency: Currency) -> Self {
        Self {
            allow_negative: true,
            ..Self::new(user_id, currency, 0)
        }
    }
}
