use axum::extract::{Path, State};
use axum::Json;
use ledger::{Account, AccountAudit, Cents, Currency};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balance_cents: Cents,
    pub currency: Currency,
}

pub async fn list_accounts(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state.engine.accounts(user_id).await?;
    Ok(Json(accounts))
}

pub async fn account_balance(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.engine.account_balance(user_id, account_id).await?;
    Ok(Json(BalanceResponse {
        balance_cents: account.balance_cents,
        currency: account.currency,
    }))
}

pub async fn reconcile(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountAudit>>, ApiError> {
    let results = state.engine.reconcile(user_id).await?;
    Ok(Json(results))
}
