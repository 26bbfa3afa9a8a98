use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    Account, Cents, Currency, Error, LedgerEntry, Operation, Plan, Store, Transaction,
    TransactionKind, User,
};

/// Postgres-backed store. Balance-changing plans run inside one database
/// transaction with `SELECT … FOR UPDATE` row locks taken in the plan's
/// canonical (ascending account id) order.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the four tables and their indexes if they do not exist.
    /// Safe to call on every startup.
    pub async fn init_schema(&self) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                currency TEXT NOT NULL,
                balance_cents BIGINT NOT NULL,
                allow_negative BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (user_id, currency)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id UUID PRIMARY KEY,
                type TEXT NOT NULL,
                from_user_id UUID NOT NULL REFERENCES users(id),
                to_user_id UUID REFERENCES users(id),
                currency TEXT NOT NULL,
                amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
                description TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                id UUID PRIMARY KEY,
                transaction_id UUID NOT NULL REFERENCES transactions(id),
                account_id UUID NOT NULL REFERENCES accounts(id),
                currency TEXT NOT NULL,
                amount_cents BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_ledger_entries_account ON ledger_entries(account_id)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_from_user ON transactions(from_user_id)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_to_user ON transactions(to_user_id)",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            return match db.code().as_deref() {
                Some("23505") => Error::UniqueViolation(db.message().to_string()),
                Some("40001") | Some("40P01") => Error::Serialization(db.message().to_string()),
                _ => Error::Storage(db.message().to_string()),
            };
        }
        match err {
            sqlx::Error::Io(e) => Error::ConnectionLost(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Error::ConnectionLost(err.to_string())
            }
            other => Error::Storage(other.to_string()),
        }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, Error> {
    let code: String = row.try_get("currency")?;
    Ok(Account {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        currency: Currency::from_code(&code)?,
        balance_cents: row.try_get("balance_cents")?,
        allow_negative: row.try_get("allow_negative")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, Error> {
    let kind: String = row.try_get("type")?;
    let code: String = row.try_get("currency")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        kind: TransactionKind::parse(&kind)
            .map_err(|_| Error::Storage(format!("unknown transaction type: {}", kind)))?,
        from_user_id: row.try_get("from_user_id")?,
        to_user_id: row.try_get("to_user_id")?,
        currency: Currency::from_code(&code)?,
        amount_cents: row.try_get("amount_cents")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, Error> {
    let code: String = row.try_get("currency")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        account_id: row.try_get("account_id")?,
        currency: Currency::from_code(&code)?,
        amount_cents: row.try_get("amount_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn user_by_id(&self, id: Uuid) -> Result<User, Error> {
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::UserNotFound)?;

        user_from_row(&row)
    }

    async fn user_by_email(&self, email: &str) -> Result<User, Error> {
        let row = sqlx::query(
            r#"
            SELECT id, email, first_name, last_name, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::UserNotFound)?;

        user_from_row(&row)
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Account, Error> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, currency, balance_cents, allow_negative, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::AccountNotFound)?;

        account_from_row(&row)
    }

    async fn account_for(&self, user_id: Uuid, currency: Currency) -> Result<Account, Error> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, currency, balance_cents, allow_negative, created_at, updated_at
            FROM accounts
            WHERE user_id = $1 AND currency = $2
            "#,
        )
        .bind(user_id)
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::AccountNotFound)?;

        account_from_row(&row)
    }

    async fn accounts_of(&self, user_id: Uuid) -> Result<Vec<Account>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, currency, balance_cents, allow_negative, created_at, updated_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY currency
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn ledger_sum(&self, account_id: Uuid) -> Result<Cents, Error> {
        // SUM over BIGINT yields NUMERIC; cast back down.
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM ledger_entries
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn entries_of(&self, transaction_id: Uuid) -> Result<Vec<LedgerEntry>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, account_id, currency, amount_cents, created_at
            FROM ledger_entries
            WHERE transaction_id = $1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn transactions_for(
        &self,
        user_id: Uuid,
        kind: Option<TransactionKind>,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Transaction>, i64), Error> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let (total, rows) = match kind {
            Some(kind) => {
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM transactions
                    WHERE (from_user_id = $1 OR to_user_id = $1) AND type = $2
                    "#,
                )
                .bind(user_id)
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, type, from_user_id, to_user_id, currency, amount_cents,
                           description, created_at
                    FROM transactions
                    WHERE (from_user_id = $1 OR to_user_id = $1) AND type = $2
                    ORDER BY created_at DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(user_id)
                .bind(kind.as_str())
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                (total, rows)
            }
            None => {
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM transactions
                    WHERE (from_user_id = $1 OR to_user_id = $1)
                    "#,
                )
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, type, from_user_id, to_user_id, currency, amount_cents,
                           description, created_at
                    FROM transactions
                    WHERE (from_user_id = $1 OR to_user_id = $1)
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(user_id)
                .bind(i64::from(limit))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

                (total, rows)
            }
        };

        let transactions = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((transactions, total))
    }

    async fn execute(&self, plan: &Plan) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        // ── Phase 1: lock & verify ────────────────────────────────────
        // Rows are taken in ascending account-id order; every concurrent
        // plan locks in the same order, so lock waits never cycle.
        for lock in plan.lock_order() {
            let row = sqlx::query(
                r#"
                SELECT balance_cents, allow_negative
                FROM accounts
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(lock.account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::AccountNotFound)?;

            let balance: i64 = row.try_get("balance_cents")?;
            let allow_negative: bool = row.try_get("allow_negative")?;

            // Checked INSIDE the lock: this is the real double-spend guard
            if !allow_negative && balance < lock.required_cents {
                tx.rollback().await.ok();
                return Err(Error::InsufficientFunds);
            }
        }

        // ── Phase 2: apply operations ─────────────────────────────────
        for op in plan.operations() {
            match op {
                Operation::InsertUser(user) => {
                    insert_user(&mut tx, user).await?;
                }
                Operation::InsertAccount(account) => {
                    insert_account(&mut tx, account).await?;
                }
                Operation::InsertTransaction(transaction) => {
                    insert_transaction(&mut tx, transaction).await?;
                }
                Operation::InsertEntry(entry) => {
                    insert_entry(&mut tx, entry).await?;
                }
                Operation::ApplyDelta {
                    account_id,
                    amount_cents,
                } => {
                    sqlx::query(
                        r#"
                        UPDATE accounts
                        SET balance_cents = balance_cents + $1, updated_at = NOW()
                        WHERE id = $2
                        "#,
                    )
                    .bind(amount_cents)
                    .bind(account_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user: &User,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, first_name, last_name, password_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account: &Account,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO accounts (id, user_id, currency, balance_cents, allow_negative,
                              created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(account.id)
    .bind(account.user_id)
    .bind(account.currency.code())
    .bind(account.balance_cents)
    .bind(account.allow_negative)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    transaction: &Transaction,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, type, from_user_id, to_user_id, currency, amount_cents,
                                  description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(transaction.id)
    .bind(transaction.kind.as_str())
    .bind(transaction.from_user_id)
    .bind(transaction.to_user_id)
    .bind(transaction.currency.code())
    .bind(transaction.amount_cents)
    .bind(&transaction.description)
    .bind(transaction.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &LedgerEntry,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, transaction_id, account_id, currency, amount_cents,
                                    created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.id)
    .bind(entry.transaction_id)
    .bind(entry.account_id)
    .bind(entry.currency.code())
    .bind(entry.amount_cents)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
