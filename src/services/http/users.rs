use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::{dispatch, watch_events, ApiError, AppState};
use crate::{
    models::{settings::GlobalSettings, tasks::Task, users::User, withdrawals::Withdrawal},
    services::{users::UserRequest, Actor},
};

/// Signs the caller in: an existing account gets its admin flag re-derived,
/// an unknown one is created.
pub async fn register(State(state): State<AppState>, actor: Actor) -> Result<impl IntoResponse, ApiError> {
    let synced = dispatch(&state.user_channel, |response| UserRequest::SyncAdminStatus {
        actor: actor.clone(),
        response,
    })
    .await??;

    if let Some(user) = synced {
        return Ok((StatusCode::OK, Json(user)));
    }

    let user = dispatch(&state.user_channel, |response| UserRequest::CreateUser { actor, response }).await??;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn current_user(State(state): State<AppState>, actor: Actor) -> Result<Json<User>, ApiError> {
    let user = dispatch(&state.user_channel, |response| UserRequest::GetUser {
        id: actor.uid.clone(),
        response,
    })
    .await??;

    user.map(Json)
        .ok_or_else(|| ApiError::not_found(format!("User does not exist: {}", actor.uid)))
}

pub async fn user_events(State(state): State<AppState>, actor: Actor) -> Result<impl IntoResponse, ApiError> {
    let receiver = dispatch(&state.user_channel, |response| UserRequest::SubscribeUser {
        id: actor.uid,
        response,
    })
    .await??;

    Ok(watch_events(receiver))
}

pub async fn list_tasks(State(state): State<AppState>, actor: Actor) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = dispatch(&state.user_channel, |response| UserRequest::ListTasks { actor, response }).await??;
    Ok(Json(tasks))
}

pub async fn my_withdrawals(State(state): State<AppState>, actor: Actor) -> Result<Json<Vec<Withdrawal>>, ApiError> {
    let withdrawals = dispatch(&state.user_channel, |response| UserRequest::ListWithdrawals {
        id: actor.uid,
        response,
    })
    .await??;

    Ok(Json(withdrawals))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<GlobalSettings>, ApiError> {
    let settings = dispatch(&state.user_channel, |response| UserRequest::GetSettings { response }).await??;
    Ok(Json(settings))
}

pub async fn settings_events(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let receiver = dispatch(&state.user_channel, |response| UserRequest::SubscribeSettings { response }).await?;
    Ok(watch_events(receiver))
}
