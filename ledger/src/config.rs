// ledger/src/config.rs
use uuid::Uuid;

/// Reserved identity owning the two FX system accounts. Provisioned once
/// at bootstrap; excluded from ordinary flows.
pub const FX_USER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
pub const FX_USER_EMAIL: &str = "fx@system.internal";

/// Stored as the FX user's password hash. No real hash matches it, so the
/// FX user can never authenticate.
pub const FX_PASSWORD_SENTINEL: &str = "!locked";

pub const MIN_EXCHANGE_AMOUNT_CENTS: i64 = 10;

pub const DEFAULT_INITIAL_BALANCE_USD_CENTS: i64 = 100_000;
pub const DEFAULT_INITIAL_BALANCE_EUR_CENTS: i64 = 50_000;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Tunables the engine consults on every operation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed balances credited as initial deposits on registration.
    pub initial_balance_usd_cents: i64,
    pub initial_balance_eur_cents: i64,
    /// Exchanges below this many source minor units are rejected.
    pub min_exchange_amount_cents: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance_usd_cents: DEFAULT_INITIAL_BALANCE_USD_CENTS,
            initial_balance_eur_cents: DEFAULT_INITIAL_BALANCE_EUR_CENTS,
            min_exchange_amount_cents: MIN_EXCHANGE_AMOUNT_CENTS,
        }
    }
}
