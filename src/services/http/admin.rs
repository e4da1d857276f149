use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{dispatch, ApiError, AppState};
use crate::{
    models::{
        admin_logs::AdminLog,
        settings::GlobalSettings,
        tasks::Task,
        users::{User, UserPatch},
        withdrawals::{ProcessWithdrawal, Withdrawal},
    },
    services::{admin::AdminRequest, Actor},
};

pub async fn list_users(State(state): State<AppState>, actor: Actor) -> Result<Json<Vec<User>>, ApiError> {
    let users = dispatch(&state.admin_channel, |response| AdminRequest::ListUsers { actor, response }).await??;
    Ok(Json(users))
}

pub async fn update_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(uid): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, ApiError> {
    let user = dispatch(&state.admin_channel, |response| AdminRequest::UpdateUser {
        actor,
        uid,
        patch,
        response,
    })
    .await??;

    Ok(Json(user))
}

pub async fn save_task(
    State(state): State<AppState>,
    actor: Actor,
    Json(task): Json<Task>,
) -> Result<Json<Task>, ApiError> {
    let task = dispatch(&state.admin_channel, |response| AdminRequest::SaveTask {
        actor,
        task,
        response,
    })
    .await??;

    Ok(Json(task))
}

pub async fn duplicate_task(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = dispatch(&state.admin_channel, |response| AdminRequest::DuplicateTask {
        actor,
        id,
        response,
    })
    .await??;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    dispatch(&state.admin_channel, |response| AdminRequest::DeleteTask {
        actor,
        id,
        response,
    })
    .await??;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<Withdrawal>>, ApiError> {
    let withdrawals =
        dispatch(&state.admin_channel, |response| AdminRequest::ListWithdrawals { actor, response }).await??;
    Ok(Json(withdrawals))
}

pub async fn process_withdrawal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(req): Json<ProcessWithdrawal>,
) -> Result<Json<Value>, ApiError> {
    let (withdrawal, outcome) = dispatch(&state.admin_channel, |response| AdminRequest::ProcessWithdrawal {
        actor,
        id,
        action: req.action,
        reason: req.reason,
        response,
    })
    .await??;

    Ok(Json(json!({
        "withdrawal": withdrawal,
        "result": outcome,
    })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    actor: Actor,
    Json(settings): Json<GlobalSettings>,
) -> Result<Json<GlobalSettings>, ApiError> {
    let settings = dispatch(&state.admin_channel, |response| AdminRequest::UpdateSettings {
        actor,
        settings,
        response,
    })
    .await??;

    Ok(Json(settings))
}

pub async fn seed_database(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<(StatusCode, Json<Vec<Task>>), ApiError> {
    let tasks = dispatch(&state.admin_channel, |response| AdminRequest::SeedDatabase { actor, response }).await??;
    Ok((StatusCode::CREATED, Json(tasks)))
}

pub async fn list_logs(State(state): State<AppState>, actor: Actor) -> Result<Json<Vec<AdminLog>>, ApiError> {
    let logs = dispatch(&state.admin_channel, |response| AdminRequest::ListLogs { actor, response }).await??;
    Ok(Json(logs))
}
