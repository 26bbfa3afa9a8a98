// ledger/src/reconcile.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Cents, Currency, Engine, Error, Store};

/// One account's reconciliation verdict: the stored balance against the
/// sum of its ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAudit {
    pub account_id: Uuid,
    pub currency: Currency,
    pub balance_cents: Cents,
    pub ledger_sum_cents: Cents,
    pub difference_cents: Cents,
    pub is_balanced: bool,
}

impl<S: Store> Engine<S> {
    /// Audit every account of a user. Read-only: no write scope, no row
    /// locks. A correct engine always yields `is_balanced` on every
    /// account; any mismatch is logged at warn.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<Vec<AccountAudit>, Error> {
        let accounts = self.store.accounts_of(user_id).await?;
        let mut results = Vec::with_capacity(accounts.len());

        for account in accounts {
            let ledger_sum_cents = self.store.ledger_sum(account.id).await?;
            let difference_cents = account.balance_cents - ledger_sum_cents;
            let is_balanced = difference_cents == 0;

            if !is_balanced {
                tracing::warn!(
                    account_id = %account.id,
                    currency = %account.currency,
                    balance_cents = account.balance_cents,
                    ledger_sum_cents,
                    difference_cents,
                    "balance mismatch detected",
                );
            }

            results.push(AccountAudit {
                account_id: account.id,
                currency: account.currency,
                balance_cents: account.balance_cents,
                ledger_sum_cents,
                difference_cents,
                is_balanced,
            });
        }

        tracing::info!(
            user_id = %user_id,
            accounts_checked = results.len(),
            "balance reconciliation completed",
        );
        Ok(results)
    }
}
