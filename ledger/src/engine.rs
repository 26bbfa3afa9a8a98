// ledger/src/engine.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use uuid::Uuid;

use crate::config::{EngineConfig, FX_PASSWORD_SENTINEL, FX_USER_EMAIL, FX_USER_ID, MAX_LIMIT};
use crate::{
    Account, Cents, Currency, Error, LedgerEntry, NewUser, Operation, Plan, RateTable, Store,
    Transaction, TransactionKind, User,
};

const MAX_EXECUTE_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// The transactional accounting engine.
///
/// Every balance-changing operation is expressed as a [`Plan`]: one
/// transaction row, its signed ledger entries, and the matching balance
/// deltas, executed atomically by the store under row locks taken in
/// ascending account-id order. Serialization and connection failures are
/// retried with exponential backoff before degrading to `Conflict`.
pub struct Engine<S> {
    pub(crate) store: Arc<S>,
    config: EngineConfig,
    rates: RateTable,
}

impl<S: Store> Engine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig, rates: RateTable) -> Self {
        Self {
            store,
            config,
            rates,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a user with their two accounts and, for each positive seed
    /// amount, an initial-deposit transaction backed by a single crediting
    /// ledger entry. Everything commits or nothing does.
    pub async fn register(&self, new_user: NewUser) -> Result<User, Error> {
        if new_user.email.is_empty() || !new_user.email.contains('@') {
            return Err(Error::Validation("email must be a valid address".into()));
        }
        if new_user.first_name.is_empty() {
            return Err(Error::Validation("first name is required".into()));
        }
        if new_user.last_name.is_empty() {
            return Err(Error::Validation("last name is required".into()));
        }
        if self.config.initial_balance_usd_cents < 0 || self.config.initial_balance_eur_cents < 0 {
            return Err(Error::Validation("seed balances must be non-negative".into()));
        }

        // Fast fail on a known email; the unique index is the real guard.
        match self.store.user_by_email(&new_user.email).await {
            Ok(_) => {
                tracing::warn!(email = %new_user.email, "registration failed, user exists");
                return Err(Error::UserExists);
            }
            Err(Error::UserNotFound) => {}
            Err(err) => return Err(err),
        }

        let user = User::new(
            &new_user.email,
            &new_user.first_name,
            &new_user.last_name,
            &new_user.password_hash,
        );
        let usd = Account::new(user.id, Currency::Usd, self.config.initial_balance_usd_cents);
        let eur = Account::new(user.id, Currency::Eur, self.config.initial_balance_eur_cents);

        let mut plan = Plan::new();
        plan.add(Operation::InsertUser(user.clone()));
        plan.add(Operation::InsertAccount(usd.clone()));
        plan.add(Operation::InsertAccount(eur.clone()));

        for account in [&usd, &eur] {
            if account.balance_cents > 0 {
                let deposit = Transaction::new(
                    TransactionKind::InitialDeposit,
                    user.id,
                    None,
                    account.currency,
                    account.balance_cents,
                    "Initial deposit".to_string(),
                );
                let entry = LedgerEntry::new(
                    deposit.id,
                    account.id,
                    account.currency,
                    account.balance_cents,
                );
                plan.add(Operation::InsertTransaction(deposit));
                plan.add(Operation::InsertEntry(entry));
            }
        }

        match self.execute_with_retry(&plan).await {
            Ok(()) => {}
            // Lost the race to the unique email index.
            Err(Error::UniqueViolation(_)) => return Err(Error::UserExists),
            Err(err) => return Err(err),
        }

        counter!("bank.registrations.total").increment(1);
        tracing::info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Move `amount_cents` of `currency` from the caller to another user.
    /// The recipient identifier resolves by email when it contains `@`,
    /// otherwise by id.
    pub async fn transfer(
        &self,
        from_user_id: Uuid,
        recipient: &str,
        currency: Currency,
        amount_cents: Cents,
    ) -> Result<Transaction, Error> {
        if amount_cents <= 0 {
            return Err(Error::InvalidAmount);
        }

        let to_user = if recipient.contains('@') {
            self.store.user_by_email(recipient).await?
        } else {
            let id = Uuid::parse_str(recipient).map_err(|_| Error::UserNotFound)?;
            self.store.user_by_id(id).await?
        };

        if to_user.id == from_user_id {
            return Err(Error::CannotTransferToSelf);
        }

        let from_account = self.store.account_for(from_user_id, currency).await?;
        let to_account = self.store.account_for(to_user.id, currency).await?;

        // Advisory pre-flight; the real guard is the locked re-read
        // inside execute.
        if from_account.balance_cents < amount_cents {
            tracing::warn!(
                user_id = %from_user_id,
                available = from_account.balance_cents,
                required = amount_cents,
                "insufficient funds",
            );
            return Err(Error::InsufficientFunds);
        }

        let transaction = Transaction::new(
            TransactionKind::Transfer,
            from_user_id,
            Some(to_user.id),
            currency,
            amount_cents,
            format!("Transfer to {} {}", to_user.first_name, to_user.last_name),
        );

        let mut plan = Plan::new();
        plan.add(Operation::InsertTransaction(transaction.clone()));
        plan.add(Operation::InsertEntry(LedgerEntry::new(
            transaction.id,
            from_account.id,
            currency,
            -amount_cents,
        )));
        plan.add(Operation::InsertEntry(LedgerEntry::new(
            transaction.id,
            to_account.id,
            currency,
            amount_cents,
        )));
        plan.add(Operation::ApplyDelta {
            account_id: from_account.id,
            amount_cents: -amount_cents,
        });
        plan.add(Operation::ApplyDelta {
            account_id: to_account.id,
            amount_cents,
        });

        self.execute_with_retry(&plan).await?;

        self.record_committed(&transaction);
        tracing::info!(
            transaction_id = %transaction.id,
            from = %from_user_id,
            to = %to_user.id,
            currency = %currency,
            amount_cents,
            "transfer completed",
        );
        Ok(transaction)
    }

    /// Exchange between the caller's own accounts through the two FX
    /// system accounts, so both currencies balance independently and no
    /// units are minted. Four entries under one transaction:
    /// user-from −f, FX-from +f, FX-to −t, user-to +t.
    pub async fn exchange(
        &self,
        user_id: Uuid,
        from_currency: Currency,
        amount_cents: Cents,
    ) -> Result<Transaction, Error> {
        if amount_cents <= 0 || amount_cents < self.config.min_exchange_amount_cents {
            return Err(Error::InvalidAmount);
        }

        let to_currency = from_currency.other();
        let rate = self.rates.rate(from_currency);
        let conversion = rate.convert(amount_cents)?;

        if conversion.residual > 0 {
            let residual = format!("{}/{}", conversion.residual, rate.denominator);
            tracing::debug!(
                from_amount = amount_cents,
                from_currency = %from_currency,
                to_amount = conversion.to_amount_cents,
                to_currency = %to_currency,
                residual = %residual,
                "exchange residual retained by FX accounts",
            );
        }

        let from_account = self.store.account_for(user_id, from_currency).await?;
        let to_account = self.store.account_for(user_id, to_currency).await?;
        let fx_from = self.store.account_for(FX_USER_ID, from_currency).await?;
        let fx_to = self.store.account_for(FX_USER_ID, to_currency).await?;

        // Advisory pre-flight; the real guard is the locked re-read
        // inside execute.
        if from_account.balance_cents < amount_cents {
            tracing::warn!(
                user_id = %user_id,
                available = from_account.balance_cents,
                required = amount_cents,
                "insufficient funds for exchange",
            );
            return Err(Error::InsufficientFunds);
        }

        let transaction = Transaction::new(
            TransactionKind::Exchange,
            user_id,
            None,
            from_currency,
            amount_cents,
            format!(
                "Exchange {} cents {} to {} cents {} (rate: {}/{})",
                amount_cents,
                from_currency,
                conversion.to_amount_cents,
                to_currency,
                rate.numerator,
                rate.denominator,
            ),
        );

        let mut plan = Plan::new();
        plan.add(Operation::InsertTransaction(transaction.clone()));
        for (account, ccy, delta) in [
            (&from_account, from_currency, -amount_cents),
            (&fx_from, from_currency, amount_cents),
            (&fx_to, to_currency, -conversion.to_amount_cents),
            (&to_account, to_currency, conversion.to_amount_cents),
        ] {
            plan.add(Operation::InsertEntry(LedgerEntry::new(
                transaction.id,
                account.id,
                ccy,
                delta,
            )));
            plan.add(Operation::ApplyDelta {
                account_id: account.id,
                amount_cents: delta,
            });
        }

        self.execute_with_retry(&plan).await?;

        self.record_committed(&transaction);
        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %user_id,
            from = %from_currency,
            to = %to_currency,
            from_amount = amount_cents,
            to_amount = conversion.to_amount_cents,
            "exchange completed",
        );
        Ok(transaction)
    }

    /// Paginated listing of the user's transactions, newest first, with
    /// the total count under the same predicate.
    pub async fn transactions(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Transaction>, i64), Error> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_LIMIT);
        self.store
            .transactions_for(user_id, kind, page, limit)
            .await
    }

    pub async fn user_by_id(&self, id: Uuid) -> Result<User, Error> {
        self.store.user_by_id(id).await
    }

    pub async fn user_by_email(&self, email: &str) -> Result<User, Error> {
        self.store.user_by_email(email).await
    }

    pub async fn accounts(&self, user_id: Uuid) -> Result<Vec<Account>, Error> {
        self.store.accounts_of(user_id).await
    }

    /// An account by id, visible only to its owner.
    pub async fn account_balance(&self, user_id: Uuid, account_id: Uuid) -> Result<Account, Error> {
        let account = self.store.account_by_id(account_id).await?;
        if account.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                account_id = %account_id,
                "unauthorized account access",
            );
            return Err(Error::AccountNotFound);
        }
        Ok(account)
    }

    /// Provision the FX user and its two negative-permitted accounts.
    /// Re-running is a no-op; a racing bootstrap loses quietly to the
    /// unique indexes.
    pub async fn bootstrap_fx_accounts(&self) -> Result<(), Error> {
        match self.store.user_by_id(FX_USER_ID).await {
            Ok(_) => {}
            Err(Error::UserNotFound) => {
                let mut fx_user = User::new(FX_USER_EMAIL, "FX", "System", FX_PASSWORD_SENTINEL);
                fx_user.id = FX_USER_ID;

                let mut plan = Plan::new();
                plan.add(Operation::InsertUser(fx_user));
                match self.store.execute(&plan).await {
                    Ok(()) => tracing::info!(user_id = %FX_USER_ID, "FX user provisioned"),
                    Err(Error::UniqueViolation(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }

        for currency in Currency::ALL {
            match self.store.account_for(FX_USER_ID, currency).await {
                Ok(_) => {}
                Err(Error::AccountNotFound) => {
                    let mut plan = Plan::new();
                    plan.add(Operation::InsertAccount(Account::new_system(
                        FX_USER_ID, currency,
                    )));
                    match self.store.execute(&plan).await {
                        Ok(()) => {
                            tracing::info!(currency = %currency, "FX account provisioned")
                        }
                        Err(Error::UniqueViolation(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    async fn execute_with_retry(&self, plan: &Plan) -> Result<(), Error> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            match self.store.execute(plan).await {
                Err(err) if err.is_retryable() => {
                    if attempt >= MAX_EXECUTE_ATTEMPTS {
                        tracing::error!(
                            attempts = attempt,
                            error = %err,
                            "retryable store failure, retries exhausted",
                        );
                        counter!("bank.transactions.total", "status" => "conflict").increment(1);
                        return Err(Error::Conflict);
                    }
                    tracing::warn!(attempt, error = %err, "retryable store failure, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    counter!("bank.transactions.total", "status" => "failed").increment(1);
                    return Err(err);
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    fn record_committed(&self, transaction: &Transaction) {
        counter!(
            "bank.transactions.total",
            "status" => "success",
            "kind" => transaction.kind.as_str()
        )
        .increment(1);
        histogram!(
            "bank.transaction.amount",
            "currency" => transaction.currency.code()
        )
        .record(transaction.amount_cents as f64);
    }
}
