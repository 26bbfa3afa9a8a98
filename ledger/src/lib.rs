pub mod account;
pub mod adapters;
pub mod config;
pub mod currency;
pub mod engine;
pub mod entry;
pub mod error;
pub mod plan;
pub mod rate;
pub mod reconcile;
pub mod transaction;
pub mod user;

pub use account::Account;
pub use config::EngineConfig;
pub use currency::{Cents, Currency};
pub use engine::Engine;
pub use entry::LedgerEntry;
pub use error::Error;
pub use plan::{LockRequirement, Operation, Plan};
pub use rate::{Conversion, ExchangeRate, RateTable};
pub use reconcile::AccountAudit;
pub use transaction::{Transaction, TransactionKind};
pub use user::{NewUser, User};

use async_trait::async_trait;
use uuid::Uuid;

/// Durable relational state behind the engine.
///
/// Lookups run unscoped (no isolation beyond a single statement). All
/// balance-changing work goes through [`Store::execute`], which owns
/// BEGIN/COMMIT/ROLLBACK: it locks the plan's account rows in the order
/// [`Plan::lock_order`] dictates, verifies debit coverage under those
/// locks, applies the operations, and commits, or rolls the whole scope
/// back on any failure.
#[async_trait]
pub trait Store: Send + Sync {
    async fn user_by_id(&self, id: Uuid) -> Result<User, Error>;

    async fn user_by_email(&self, email: &str) -> Result<User, Error>;

    async fn account_by_id(&self, id: Uuid) -> Result<Account, Error>;

    /// The single `(user, currency)` account; at most one exists.
    async fn account_for(&self, user_id: Uuid, currency: Currency) -> Result<Account, Error>;

    /// All of a user's accounts, ordered by currency code.
    async fn accounts_of(&self, user_id: Uuid) -> Result<Vec<Account>, Error>;

    /// Sum of every ledger entry on the account. Zero for an account with
    /// no entries.
    async fn ledger_sum(&self, account_id: Uuid) -> Result<Cents, Error>;

    /// A transaction's ledger entries in insertion order. This is how an
    /// exchange's destination side is recovered.
    async fn entries_of(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>, Error>;

    /// Transactions where the user is sender or recipient, newest first,
    /// plus the total count under the same predicate.
    async fn transactions_for(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Transaction>, i64), Error>;

    /// Atomically execute a balance-changing plan.
    async fn execute(&self, plan: &Plan) -> Result<(), Error>;
}
