// ledger/src/error.rs
use std::fmt;

/// Every failure the engine or a store adapter can surface.
///
/// Domain kinds map one-to-one onto the wire error codes via [`Error::kind`].
/// `Serialization` and `ConnectionLost` are retryable store failures; the
/// engine retries them with backoff and degrades to `Conflict` on
/// exhaustion. `UniqueViolation` never leaves the engine undressed: it is
/// translated into the domain kind the operation implies.
#[derive(Debug)]
pub enum Error {
    UserNotFound,
    UserExists,
    InvalidCredentials,
    Unauthorized,
    AccountNotFound,
    TransactionNotFound,
    InsufficientFunds,
    InvalidAmount,
    InvalidCurrency,
    CurrenciesMustDiffer,
    CannotTransferToSelf,
    AmountTooLarge,
    Conflict,
    Validation(String),
    UniqueViolation(String),
    Serialization(String),
    ConnectionLost(String),
    Storage(String),
}

impl Error {
    /// Stable snake_case code for the `{"error": "<kind>"}` response shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserNotFound => "user_not_found",
            Self::UserExists => "user_exists",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthorized => "unauthorized",
            Self::AccountNotFound => "account_not_found",
            Self::TransactionNotFound => "transaction_not_found",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidCurrency => "invalid_currency",
            Self::CurrenciesMustDiffer => "currencies_must_differ",
            Self::CannotTransferToSelf => "cannot_transfer_to_self",
            Self::AmountTooLarge => "amount_too_large",
            Self::Conflict => "conflict",
            Self::Validation(_) => "validation_error",
            Self::UniqueViolation(_) => "conflict",
            Self::Serialization(_) | Self::ConnectionLost(_) | Self::Storage(_) => "internal",
        }
    }

    /// Whether the whole scope may be re-run after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::ConnectionLost(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserNotFound => write!(f, "user not found"),
            Self::UserExists => write!(f, "user with this email already exists"),
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::AccountNotFound => write!(f, "account not found"),
            Self::TransactionNotFound => write!(f, "transaction not found"),
            Self::InsufficientFunds => write!(f, "insufficient funds"),
            Self::InvalidAmount => write!(f, "amount must be positive"),
            Self::InvalidCurrency => write!(f, "invalid currency"),
            Self::CurrenciesMustDiffer => {
                write!(f, "from and to currencies must be different")
            }
            Self::CannotTransferToSelf => write!(f, "cannot transfer to self"),
            Self::AmountTooLarge => write!(f, "amount too large"),
            Self::Conflict => write!(f, "operation conflicted, retries exhausted"),
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::UniqueViolation(msg) => write!(f, "unique violation: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization failure: {}", msg),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
