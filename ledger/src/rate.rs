// ledger/src/rate.rs
use crate::{Cents, Currency, Error};

/// An exact integer rational rate for one ordered currency pair.
///
/// Destination amounts truncate toward zero; the remainder of the division
/// is the residual the system retains. No floating point is involved at
/// any step.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRate {
    pub numerator: i64,
    pub denominator: i64,
}

/// Outcome of applying a rate: the truncated destination amount and the
/// non-negative residual `(from × num) mod denom` in destination units
/// scaled by `denom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub to_amount_cents: Cents,
    pub residual: i64,
}

impl ExchangeRate {
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert `from_amount_cents` through this rate.
    ///
    /// The overflow guard runs before the multiplication: any amount above
    /// `i64::MAX / numerator` is rejected as `AmountTooLarge`.
    pub fn convert(&self, from_amount_cents: Cents) -> Result<Conversion, Error> {
        if from_amount_cents <= 0 {
            return Err(Error::InvalidAmount);
        }
        if from_amount_cents > i64::MAX / self.numerator {
            return Err(Error::AmountTooLarge);
        }

        let scaled = from_amount_cents * self.numerator;
        Ok(Conversion {
            to_amount_cents: scaled / self.denominator,
            residual: scaled % self.denominator,
        })
    }
}

/// Configured rates per ordered pair. Defaults: USD→EUR 23/25, EUR→USD
/// 25/23, so a full round trip multiplies to exactly one and loses only
/// truncation residuals.
#[derive(Debug, Clone, Copy)]
pub struct RateTable {
    pub usd_to_eur: ExchangeRate,
    pub eur_to_usd: ExchangeRate,
}

impl RateTable {
    pub fn rate(&self, from: Currency) -> ExchangeRate {
        match from {
            Currency::Usd => self.usd_to_eur,
            Currency::Eur => self.eur_to_usd,
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            usd_to_eur: ExchangeRate::new(23, 25),
            eur_to_usd: ExchangeRate::new(25, 23),
        }
    }
}
