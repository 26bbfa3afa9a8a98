// ledger/src/currency.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Signed minor units (cents). All monetary arithmetic is integer-exact.
pub type Cents = i64;

/// Supported currencies, stored and transported as two-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Usd, Currency::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, Error> {
        match code {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            _ => Err(Error::InvalidCurrency),
        }
    }

    /// The counterpart currency in a two-currency system.
    pub fn other(&self) -> Currency {
        match self {
            Currency::Usd => Currency::Eur,
            Currency::Eur => Currency::Usd,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
