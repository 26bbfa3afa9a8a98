use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use ledger::{NewUser, User};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{ApiError, FieldError};
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn validate_registration(req: &RegisterRequest) -> Vec<FieldError> {
    let mut fields = Vec::new();
    if req.email.is_empty() {
        fields.push(FieldError {
            field: "email",
            message: "is required".to_string(),
        });
    } else if !req.email.contains('@') {
        fields.push(FieldError {
            field: "email",
            message: "must be a valid email".to_string(),
        });
    }
    if req.password.len() < 6 {
        fields.push(FieldError {
            field: "password",
            message: "must be at least 6 characters".to_string(),
        });
    }
    if req.first_name.is_empty() {
        fields.push(FieldError {
            field: "first_name",
            message: "is required".to_string(),
        });
    }
    if req.last_name.is_empty() {
        fields.push(FieldError {
            field: "last_name",
            message: "is required".to_string(),
        });
    }
    fields
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let violations = validate_registration(&req);
    if !violations.is_empty() {
        return Err(ApiError::validation(violations));
    }

    let user = state
        .engine
        .register(NewUser {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash: hash_password(&req.password),
        })
        .await?;

    let token = state.tokens.issue(user.id);
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = match state.engine.user_by_email(&req.email).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(email = %req.email, error = %err, "login failed");
            return Err(ledger::Error::InvalidCredentials.into());
        }
    };

    if !verify_password(&req.password, &user.password_hash) {
        tracing::warn!(email = %req.email, "login failed, invalid password");
        return Err(ledger::Error::InvalidCredentials.into());
    }

    let token = state.tokens.issue(user.id);
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    let user = state.engine.user_by_id(user_id).await?;
    Ok(Json(user))
}
