// ledger/src/adapters/memory.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Account, Cents, Currency, Error, LedgerEntry, Operation, Plan, Store, Transaction,
    TransactionKind, User,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    entries: Vec<LedgerEntry>,
}

/// In-process store used by the test suite.
///
/// `execute` holds the mutex for the ENTIRE plan; this is the memory
/// adapter's equivalent of BEGIN/SELECT FOR UPDATE/COMMIT. No other task
/// can interleave while it runs, and nothing mutates until the whole plan
/// has been validated.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_id(&self, id: Uuid) -> Result<User, Error> {
        let inner = self.inner.lock().unwrap();
        inner.users.get(&id).cloned().ok_or(Error::UserNotFound)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(Error::UserNotFound)
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Account, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or(Error::AccountNotFound)
    }

    async fn account_for(&self, user_id: Uuid, currency: Currency) -> Result<Account, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .values()
            .find(|a| a.user_id == user_id && a.currency == currency)
            .cloned()
            .ok_or(Error::AccountNotFound)
    }

    async fn accounts_of(&self, user_id: Uuid) -> Result<Vec<Account>, Error> {
        let inner = self.inner.lock().unwrap();
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.currency.code());
        Ok(accounts)
    }

    async fn ledger_sum(&self, account_id: Uuid) -> Result<Cents, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount_cents)
            .sum())
    }

    async fn entries_of(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn transactions_for(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Transaction>, i64), Error> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.from_user_id == user_id || t.to_user_id == Some(user_id))
            .filter(|t| kind.map_or(true, |k| t.kind == k))
            .cloned()
            .collect();

        // Newest first; uuid-v7 ids break created_at ties in insert order.
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as i64;
        let offset = (page.saturating_sub(1) as usize) * limit as usize;
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok((rows, total))
    }

    async fn execute(&self, plan: &Plan) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();

        // Validate everything before touching state, so a failed plan
        // leaves no partial writes behind.
        for lock in plan.lock_order() {
            let account = inner
                .accounts
                .get(&lock.account_id)
                .ok_or(Error::AccountNotFound)?;
            // Checked while holding the mutex: the real double-spend guard
            if !account.allow_negative && account.balance_cents < lock.required_cents {
                return Err(Error::InsufficientFunds);
            }
        }

        for op in plan.operations() {
            match op {
                Operation::InsertUser(user) => {
                    if inner.users.values().any(|u| u.email == user.email) {
                        return Err(Error::UniqueViolation(format!(
                            "users.email: {}",
                            user.email
                        )));
                    }
                }
                Operation::InsertAccount(account) => {
                    if inner
                        .accounts
                        .values()
                        .any(|a| a.user_id == account.user_id && a.currency == account.currency)
                    {
                        return Err(Error::UniqueViolation(format!(
                            "accounts(user_id, currency): {} {}",
                            account.user_id, account.currency
                        )));
                    }
                }
                Operation::ApplyDelta { account_id, .. } => {
                    if !inner.accounts.contains_key(account_id) {
                        return Err(Error::AccountNotFound);
                    }
                }
                Operation::InsertTransaction(_) | Operation::InsertEntry(_) => {}
            }
        }

        for op in plan.operations() {
            match op {
                Operation::InsertUser(user) => {
                    inner.users.insert(user.id, user.clone());
                }
                Operation::InsertAccount(account) => {
                    inner.accounts.insert(account.id, account.clone());
                }
                Operation::InsertTransaction(transaction) => {
                    inner.transactions.push(transaction.clone());
                }
                Operation::InsertEntry(entry) => {
                    inner.entries.push(entry.clone());
                }
                Operation::ApplyDelta {
                    account_id,
                    amount_cents,
                } => {
                    let account = inner
                        .accounts
                        .get_mut(account_id)
                        .expect("validated above");
                    account.balance_cents += amount_cents;
                    account.updated_at = chrono::Utc::now();
                }
            }
        }

        Ok(())
    }
}
