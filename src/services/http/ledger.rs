use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{dispatch, ApiError, AppState};
use crate::{
    ledger::{
        bonus::DailyBonus, mining::Mined, referral::Redeemed, tasks::Completed, SpinOutcome,
    },
    models::{
        tasks::CompleteTask,
        withdrawals::{NewWithdrawal, Withdrawal},
    },
    services::{
        ledger::{Applied, LedgerRequest},
        Actor,
    },
};

#[derive(Deserialize)]
pub struct RedeemReferral {
    code: String,
}

type Reply<T> = Result<Json<Applied<T>>, ApiError>;

pub async fn mine(State(state): State<AppState>, actor: Actor) -> Reply<Mined> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::Mine {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn refill_energy(State(state): State<AppState>, actor: Actor) -> Reply<i64> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::RefillEnergy {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn claim_daily_bonus(State(state): State<AppState>, actor: Actor) -> Reply<DailyBonus> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::ClaimDailyBonus {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn spin_wheel(State(state): State<AppState>, actor: Actor) -> Reply<SpinOutcome> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::SpinWheel {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn grant_bonus_spin(State(state): State<AppState>, actor: Actor) -> Reply<i64> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::GrantBonusSpin {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn claim_daily_goal(State(state): State<AppState>, actor: Actor) -> Reply<f64> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::ClaimDailyGoal {
        uid: actor.uid,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn redeem_referral(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<RedeemReferral>,
) -> Reply<Redeemed> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::RedeemReferral {
        uid: actor.uid,
        code: req.code,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn complete_task(
    State(state): State<AppState>,
    actor: Actor,
    Path(task_id): Path<String>,
    Json(req): Json<CompleteTask>,
) -> Reply<Completed> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::CompleteTask {
        uid: actor.uid,
        task_id,
        reward: req.reward,
        response,
    })
    .await??;

    Ok(Json(applied))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<NewWithdrawal>,
) -> Result<(StatusCode, Json<Applied<Withdrawal>>), ApiError> {
    let applied = dispatch(&state.ledger_channel, |response| LedgerRequest::RequestWithdrawal {
        uid: actor.uid,
        amount: req.amount,
        method: req.method,
        response,
    })
    .await??;

    Ok((StatusCode::CREATED, Json(applied)))
}
