use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{NewUser, PublicUser, UserPatch, UserSummary};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// GET /users — filterable listing of the safe-to-expose columns.
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.store.query(&params).await?;
    Ok(Json(users))
}

/// GET /users/:id — the path id is accepted for route shape but the
/// authenticated caller's own record is what gets returned.
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .store
        .find_by_id(caller)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user.into()))
}

/// PUT /users/:id — partial update of the caller's own record.
#[instrument(skip(state, patch))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(patch): Json<UserPatch>,
) -> Result<Json<PublicUser>, ApiError> {
    validate_patch(&patch)?;

    let user = state
        .store
        .update_by_id(caller, patch)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user.into()))
}

/// POST /users — create a record from the request body.
#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Json(body): Json<NewUser>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.store.create(body).await?;
    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(Json(user.into()))
}

/// DELETE /users/:id — soft delete by path id.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_user_id(&id)?;
    let user = state
        .store
        .deactivate(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(user_id = %user.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// A malformed id can never match a record, so it reads as 404 rather
/// than leaking the extractor's 400.
fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>().map_err(|_| ApiError::NotFound)
}

fn validate_patch(patch: &UserPatch) -> Result<(), ApiError> {
    if let Some(email) = &patch.email {
        if !is_valid_email(email) {
            return Err(ApiError::Validation("Invalid email address.".into()));
        }
    }
    if let Some(username) = &patch.username {
        if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::Validation(
                "Usernames must be alphanumeric.".into(),
            ));
        }
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}
