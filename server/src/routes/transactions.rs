use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use ledger::{Cents, Currency, Transaction, TransactionKind};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct TransferRequest {
    pub to_user_id: String,
    pub currency: String,
    pub amount_cents: Cents,
}

#[derive(Deserialize)]
pub struct ExchangeRequest {
    pub from_currency: String,
    pub amount_cents: Cents,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub transactions: Vec<Transaction>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

pub async fn transfer(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let currency = Currency::from_code(&req.currency)?;

    let transaction = state
        .engine
        .transfer(user_id, &req.to_user_id, currency, req.amount_cents)
        .await
        .map_err(|err| match err {
            // A missing recipient is the caller's bad input here, not a
            // missing resource.
            ledger::Error::UserNotFound => ApiError::bad_request("recipient not found"),
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn exchange(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let from_currency = Currency::from_code(&req.from_currency)?;

    let transaction = state
        .engine
        .exchange(user_id, from_currency, req.amount_cents)
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn list_transactions(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let kind = match query.kind.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(TransactionKind::parse(raw)?),
    };

    let page = match query.page {
        Some(page) if page >= 1 => page,
        _ => state.config.default_page,
    };
    let limit = match query.limit {
        Some(limit) if limit >= 1 => limit.min(state.config.max_limit),
        _ => state.config.default_limit,
    };

    let (transactions, total) = state.engine.transactions(user_id, kind, page, limit).await?;

    Ok(Json(ListResponse {
        transactions,
        page,
        limit,
        total,
    }))
}
