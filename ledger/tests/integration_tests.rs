// ledger/tests/integration_tests.rs
use std::collections::HashMap;
use std::sync::Arc;

use ledger::adapters::MemoryStore;
use ledger::config::FX_USER_ID;
use ledger::{
    Cents, Currency, Engine, EngineConfig, Error, NewUser, RateTable, Store, TransactionKind, User,
};
use uuid::Uuid;

fn engine_with(store: &MemoryStore, usd: Cents, eur: Cents) -> Engine<MemoryStore> {
    let config = EngineConfig {
        initial_balance_usd_cents: usd,
        initial_balance_eur_cents: eur,
        ..EngineConfig::default()
    };
    Engine::new(Arc::new(store.clone()), config, RateTable::default())
}

async fn register(engine: &Engine<MemoryStore>, email: &str) -> User {
    engine
        .register(NewUser {
            email: email.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            password_hash: "salt$digest".to_string(),
        })
        .await
        .unwrap()
}

async fn balance(store: &MemoryStore, user_id: Uuid, currency: Currency) -> Cents {
    store
        .account_for(user_id, currency)
        .await
        .unwrap()
        .balance_cents
}

async fn assert_balanced(engine: &Engine<MemoryStore>, user_id: Uuid) {
    for audit in engine.reconcile(user_id).await.unwrap() {
        assert!(
            audit.is_balanced,
            "account {} off by {}",
            audit.account_id, audit.difference_cents
        );
    }
}

#[tokio::test]
async fn test_registration_creates_accounts_and_deposits() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 100_000, 50_000);

    let user = register(&engine, "alice@example.com").await;

    let accounts = store.accounts_of(user.id).await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(balance(&store, user.id, Currency::Usd).await, 100_000);
    assert_eq!(balance(&store, user.id, Currency::Eur).await, 50_000);

    // One initial-deposit transaction per seeded currency, each backed by
    // exactly one entry equal to the account balance.
    let (transactions, total) = store
        .transactions_for(user.id, Some(TransactionKind::InitialDeposit), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 2);
    for transaction in &transactions {
        let entries = store.entries_of(transaction.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount_cents, transaction.amount_cents);
        assert_eq!(entries[0].currency, transaction.currency);
    }

    assert_balanced(&engine, user.id).await;
}

#[tokio::test]
async fn test_registration_skips_deposit_for_zero_seed() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 100_000, 0);

    let user = register(&engine, "alice@example.com").await;

    assert_eq!(balance(&store, user.id, Currency::Eur).await, 0);
    let (_, total) = store
        .transactions_for(user.id, None, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_balanced(&engine, user.id).await;
}

#[tokio::test]
async fn test_duplicate_registration_creates_nothing() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 100_000, 50_000);

    let first = register(&engine, "alice@example.com").await;
    let err = engine
        .register(NewUser {
            email: "alice@example.com".to_string(),
            first_name: "Mallory".to_string(),
            last_name: "Smith".to_string(),
            password_hash: "salt$digest".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UserExists));

    // The original user and rows are untouched.
    let resolved = store.user_by_email("alice@example.com").await.unwrap();
    assert_eq!(resolved.id, first.id);
    assert_eq!(resolved.first_name, "Alice");
    let (_, total) = store.transactions_for(first.id, None, 1, 10).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn test_transfer_happy_path() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    let transaction = engine
        .transfer(a.id, &b.id.to_string(), Currency::Usd, 5_000)
        .await
        .unwrap();

    assert_eq!(balance(&store, a.id, Currency::Usd).await, 5_000);
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 5_000);

    let entries = store.entries_of(transaction.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.amount_cents).sum::<Cents>(), 0);

    assert_balanced(&engine, a.id).await;
    assert_balanced(&engine, b.id).await;
}

#[tokio::test]
async fn test_transfer_of_exact_balance_leaves_zero() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    engine
        .transfer(a.id, &b.id.to_string(), Currency::Usd, 10_000)
        .await
        .unwrap();

    assert_eq!(balance(&store, a.id, Currency::Usd).await, 0);
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 10_000);
}

#[tokio::test]
async fn test_transfer_insufficient_funds_leaves_no_trace() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 5_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    let err = engine
        .transfer(a.id, &b.id.to_string(), Currency::Usd, 10_000)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds));

    assert_eq!(balance(&store, a.id, Currency::Usd).await, 5_000);
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 0);
    let (_, total) = store
        .transactions_for(a.id, Some(TransactionKind::Transfer), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_transfer_one_cent_over_balance_fails() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    let err = engine
        .transfer(a.id, &b.id.to_string(), Currency::Usd, 10_001)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds));
    assert_eq!(balance(&store, a.id, Currency::Usd).await, 10_000);
}

#[tokio::test]
async fn test_transfer_to_self_rejected() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);

    let a = register(&engine, "a@example.com").await;

    let by_id = engine
        .transfer(a.id, &a.id.to_string(), Currency::Usd, 100)
        .await
        .unwrap_err();
    assert!(matches!(by_id, Error::CannotTransferToSelf));

    let by_email = engine
        .transfer(a.id, "a@example.com", Currency::Usd, 100)
        .await
        .unwrap_err();
    assert!(matches!(by_email, Error::CannotTransferToSelf));
}

#[tokio::test]
async fn test_transfer_recipient_resolution() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    // Contains '@': resolved by email.
    engine
        .transfer(a.id, "b@example.com", Currency::Usd, 1_000)
        .await
        .unwrap();
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 1_000);

    // No '@': must be a user id.
    engine
        .transfer(a.id, &b.id.to_string(), Currency::Usd, 1_000)
        .await
        .unwrap();
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 2_000);

    let unknown_email = engine
        .transfer(a.id, "nobody@example.com", Currency::Usd, 100)
        .await
        .unwrap_err();
    assert!(matches!(unknown_email, Error::UserNotFound));

    let not_a_uuid = engine
        .transfer(a.id, "not-a-uuid", Currency::Usd, 100)
        .await
        .unwrap_err();
    assert!(matches!(not_a_uuid, Error::UserNotFound));
}

#[tokio::test]
async fn test_transfer_rejects_non_positive_amounts() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    for amount in [0, -1] {
        let err = engine
            .transfer(a.id, &b.id.to_string(), Currency::Usd, amount)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount));
    }
}

#[tokio::test]
async fn test_exchange_usd_to_eur_through_fx_accounts() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    let transaction = engine
        .exchange(user.id, Currency::Usd, 10_000)
        .await
        .unwrap();

    assert_eq!(balance(&store, user.id, Currency::Usd).await, 0);
    assert_eq!(balance(&store, user.id, Currency::Eur).await, 9_200);
    assert_eq!(balance(&store, FX_USER_ID, Currency::Usd).await, 10_000);
    assert_eq!(balance(&store, FX_USER_ID, Currency::Eur).await, -9_200);

    // Four entries, each currency summing to zero on its own.
    let entries = store.entries_of(transaction.id).await.unwrap();
    assert_eq!(entries.len(), 4);
    let mut per_currency: HashMap<Currency, Cents> = HashMap::new();
    for entry in &entries {
        *per_currency.entry(entry.currency).or_insert(0) += entry.amount_cents;
    }
    assert_eq!(per_currency[&Currency::Usd], 0);
    assert_eq!(per_currency[&Currency::Eur], 0);

    assert_balanced(&engine, user.id).await;
    assert_balanced(&engine, FX_USER_ID).await;
}

#[tokio::test]
async fn test_exchange_round_trip_restores_everything() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    engine
        .exchange(user.id, Currency::Usd, 10_000)
        .await
        .unwrap();
    // 9200 = 23 × 400, so the way back is exact: (9200 × 25) / 23 = 10000.
    engine.exchange(user.id, Currency::Eur, 9_200).await.unwrap();

    assert_eq!(balance(&store, user.id, Currency::Usd).await, 10_000);
    assert_eq!(balance(&store, user.id, Currency::Eur).await, 0);
    assert_eq!(balance(&store, FX_USER_ID, Currency::Usd).await, 0);
    assert_eq!(balance(&store, FX_USER_ID, Currency::Eur).await, 0);
}

#[tokio::test]
async fn test_exchange_round_trip_with_residual_never_mints() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 9_999, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    engine.exchange(user.id, Currency::Usd, 9_999).await.unwrap();
    let eur = balance(&store, user.id, Currency::Eur).await;
    engine.exchange(user.id, Currency::Eur, eur).await.unwrap();

    let usd = balance(&store, user.id, Currency::Usd).await;
    assert!(usd < 9_999, "round trip with residuals must lose units");

    // Whatever the user lost, the FX accounts hold: per-currency totals
    // are conserved.
    let fx_usd = balance(&store, FX_USER_ID, Currency::Usd).await;
    assert_eq!(usd + fx_usd, 9_999);
    assert_eq!(
        balance(&store, user.id, Currency::Eur).await
            + balance(&store, FX_USER_ID, Currency::Eur).await,
        0
    );
}

#[tokio::test]
async fn test_exchange_minimum_amount_boundary() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    let err = engine.exchange(user.id, Currency::Usd, 9).await.unwrap_err();
    assert!(matches!(err, Error::InvalidAmount));

    engine.exchange(user.id, Currency::Usd, 10).await.unwrap();
    assert_eq!(balance(&store, user.id, Currency::Usd).await, 9_990);
    assert_eq!(balance(&store, user.id, Currency::Eur).await, 9);
}

#[tokio::test]
async fn test_exchange_overflow_guard() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    // Rejected before any account is touched, so the error is
    // amount_too_large rather than insufficient_funds.
    let err = engine
        .exchange(user.id, Currency::Eur, i64::MAX / 25 + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AmountTooLarge));
}

#[tokio::test]
async fn test_exchange_requires_funds() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 100, 0);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;

    let err = engine
        .exchange(user.id, Currency::Usd, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds));
    assert_eq!(balance(&store, user.id, Currency::Usd).await, 100);
    assert_eq!(balance(&store, FX_USER_ID, Currency::Usd).await, 0);
}

#[tokio::test]
async fn test_bootstrap_fx_accounts_is_idempotent() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 0, 0);

    engine.bootstrap_fx_accounts().await.unwrap();
    engine.bootstrap_fx_accounts().await.unwrap();

    let accounts = store.accounts_of(FX_USER_ID).await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert!(accounts.iter().all(|a| a.allow_negative));
    assert!(accounts.iter().all(|a| a.balance_cents == 0));
}

#[tokio::test]
async fn test_concurrent_transfers_conserve_currency() {
    let store = MemoryStore::new();
    let engine = Arc::new(engine_with(&store, 10_000, 0));
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = Arc::clone(&engine);
        let recipient = b.id.to_string();
        handles.push(tokio::spawn(async move {
            engine.transfer(a.id, &recipient, Currency::Usd, 2_000).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balance(&store, a.id, Currency::Usd).await, 0);
    assert_eq!(balance(&store, b.id, Currency::Usd).await, 10_000);

    let (_, transfers) = store
        .transactions_for(a.id, Some(TransactionKind::Transfer), 1, 100)
        .await
        .unwrap();
    assert_eq!(transfers, 5);

    assert_balanced(&engine, a.id).await;
    assert_balanced(&engine, b.id).await;
}

#[tokio::test]
async fn test_concurrent_mixed_operations_conserve_per_currency() {
    let store = MemoryStore::new();
    let engine = Arc::new(engine_with(&store, 10_000, 10_000));
    engine.bootstrap_fx_accounts().await.unwrap();

    let a = register(&engine, "a@example.com").await;
    let b = register(&engine, "b@example.com").await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = Arc::clone(&engine);
        let recipient = b.id.to_string();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine.transfer(a.id, &recipient, Currency::Usd, 500).await
            } else {
                engine.exchange(a.id, Currency::Usd, 230).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Per-currency totals across users and FX are unchanged from seeding.
    let usd_total = balance(&store, a.id, Currency::Usd).await
        + balance(&store, b.id, Currency::Usd).await
        + balance(&store, FX_USER_ID, Currency::Usd).await;
    let eur_total = balance(&store, a.id, Currency::Eur).await
        + balance(&store, b.id, Currency::Eur).await
        + balance(&store, FX_USER_ID, Currency::Eur).await;
    assert_eq!(usd_total, 20_000);
    assert_eq!(eur_total, 20_000);

    assert_balanced(&engine, a.id).await;
    assert_balanced(&engine, b.id).await;
    assert_balanced(&engine, FX_USER_ID).await;
}

#[tokio::test]
async fn test_reconciler_is_pure() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 5_000);
    engine.bootstrap_fx_accounts().await.unwrap();

    let user = register(&engine, "a@example.com").await;
    engine.exchange(user.id, Currency::Usd, 123).await.unwrap();

    let first = engine.reconcile(user.id).await.unwrap();
    let second = engine.reconcile(user.id).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (x, y) in first.iter().zip(second.iter()) {
        assert_eq!(x.account_id, y.account_id);
        assert_eq!(x.difference_cents, y.difference_cents);
        assert!(x.is_balanced);
    }
}

#[tokio::test]
async fn test_listing_filters_pages_and_counts() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    for _ in 0..3 {
        engine
            .transfer(a.id, &b.id.to_string(), Currency::Usd, 100)
            .await
            .unwrap();
    }

    // a sees 1 deposit + 3 transfers; b sees the 3 transfers it received.
    let (rows, total) = engine.transactions(a.id, None, 1, 10).await.unwrap();
    assert_eq!(total, 4);
    assert_eq!(rows.len(), 4);
    // Newest first.
    assert!(rows.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let (rows, total) = engine
        .transactions(a.id, Some(TransactionKind::Transfer), 1, 2)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(rows.len(), 2);

    let (rows, total) = engine
        .transactions(a.id, Some(TransactionKind::Transfer), 2, 2)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(rows.len(), 1);

    let (rows, total) = engine.transactions(b.id, None, 1, 10).await.unwrap();
    assert_eq!(total, 3);
    assert!(rows.iter().all(|t| t.to_user_id == Some(b.id)));
}

#[tokio::test]
async fn test_account_balance_is_owner_scoped() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, 10_000, 0);
    let empty = engine_with(&store, 0, 0);

    let a = register(&engine, "a@example.com").await;
    let b = register(&empty, "b@example.com").await;

    let a_usd = store.account_for(a.id, Currency::Usd).await.unwrap();

    let owned = engine.account_balance(a.id, a_usd.id).await.unwrap();
    assert_eq!(owned.balance_cents, 10_000);

    let foreign = engine.account_balance(b.id, a_usd.id).await.unwrap_err();
    assert!(matches!(foreign, Error::AccountNotFound));
}
