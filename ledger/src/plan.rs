// ledger/src/plan.rs
use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{Account, Cents, LedgerEntry, Transaction, User};

/// One step of a balance-changing scope. Inserts carry fully-formed rows
/// (ids and timestamps are assigned by the engine), so the same plan runs
/// unchanged against any adapter.
#[derive(Debug, Clone)]
pub enum Operation {
    InsertUser(User),
    InsertAccount(Account),
    InsertTransaction(Transaction),
    InsertEntry(LedgerEntry),
    ApplyDelta { account_id: Uuid, amount_cents: Cents },
}

/// An account row the adapter must lock before any write, and the debit
/// total that must be covered unless the account allows negative balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequirement {
    pub account_id: Uuid,
    pub required_cents: Cents,
}

/// The unit of atomic execution: an ordered list of operations plus the
/// lock set derived from its balance deltas.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Every account touched by a delta, in ascending id order, with the
    /// sum of its debits as the balance requirement. Ascending id is the
    /// canonical lock order that makes concurrent scopes deadlock-free.
    pub fn lock_order(&self) -> Vec<LockRequirement> {
        let mut required: BTreeMap<Uuid, Cents> = BTreeMap::new();

        for op in &self.operations {
            if let Operation::ApplyDelta {
                account_id,
                amount_cents,
            } = op
            {
                let slot = required.entry(*account_id).or_insert(0);
                if *amount_cents < 0 {
                    *slot += -amount_cents;
                }
            }
        }

        required
            .into_iter()
            .map(|(account_id, required_cents)| LockRequirement {
                account_id,
                required_cents,
            })
            .collect()
    }
}
