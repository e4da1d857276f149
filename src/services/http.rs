use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use futures_util::{stream, Stream};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::trace::TraceLayer;

use super::{
    admin::{AdminError, AdminRequest},
    ledger::LedgerRequest,
    users::UserRequest,
    Actor, ServiceError,
};
use crate::{
    ledger::Rejection,
    repositories::{OperationError, StoreError},
};

mod admin;
mod ledger;
mod users;

const USER_ID_HEADER: &str = "x-user-id";
const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Clone)]
pub struct AppState {
    ledger_channel: mpsc::Sender<LedgerRequest>,
    user_channel: mpsc::Sender<UserRequest>,
    admin_channel: mpsc::Sender<AdminRequest>,
}

/// JSON error body: `{"error": code, "description": text}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    description: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, description: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            description: description.into(),
        }
    }

    fn not_found(description: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", description)
    }

    fn internal() -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal server error.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "description": self.description,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        log::error!("{e}");
        ApiError::internal()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PermissionDenied(details) => {
                log::warn!("Store refused access: {details}");
                ApiError::internal()
            }
            StoreError::Conflict(details) => ApiError::new(StatusCode::CONFLICT, "CONFLICT", details),
            other => {
                log::error!("{other}");
                ApiError::internal()
            }
        }
    }
}

impl<E: Rejection> From<OperationError<E>> for ApiError {
    fn from(e: OperationError<E>) -> Self {
        match e {
            OperationError::Rejected(rejection) => {
                ApiError::new(StatusCode::CONFLICT, rejection.code(), rejection.to_string())
            }
            OperationError::Store(store_error) => store_error.into(),
            not_found => ApiError::not_found(not_found.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Forbidden => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", AdminError::Forbidden.to_string())
            }
            AdminError::Store(store_error) => store_error.into(),
            not_found => ApiError::not_found(not_found.to_string()),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let uid = header(USER_ID_HEADER).ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "Missing caller identity.")
        })?;
        let email = header(USER_EMAIL_HEADER).unwrap_or_default();

        Ok(Actor { uid, email })
    }
}

/// Sends one request to a service and waits for its reply.
async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<T>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("Failed to send request".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("Failed to receive response".to_string(), e.to_string()))
}

/// Streams every value a watch channel takes, starting with the current one.
fn watch_events<T>(receiver: watch::Receiver<T>) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let events = stream::unfold((receiver, true), |(mut receiver, first)| async move {
        if !first && receiver.changed().await.is_err() {
            return None;
        }

        let value = receiver.borrow_and_update().clone();
        let event = Event::default().json_data(&value).unwrap_or_else(|e| {
            log::error!("Could not encode event: {e}");
            Event::default().event("error")
        });
        Some((Ok(event), (receiver, false)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::register))
        .route("/users/me", get(users::current_user))
        .route("/users/me/events", get(users::user_events))
        .route("/tasks", get(users::list_tasks))
        .route("/withdrawals/me", get(users::my_withdrawals))
        .route("/settings", get(users::get_settings))
        .route("/settings/events", get(users::settings_events))
        .route("/ledger/mine", post(ledger::mine))
        .route("/ledger/refill", post(ledger::refill_energy))
        .route("/ledger/daily-bonus", post(ledger::claim_daily_bonus))
        .route("/ledger/spin", post(ledger::spin_wheel))
        .route("/ledger/bonus-spin", post(ledger::grant_bonus_spin))
        .route("/ledger/daily-goal", post(ledger::claim_daily_goal))
        .route("/ledger/referral", post(ledger::redeem_referral))
        .route("/tasks/{id}/complete", post(ledger::complete_task))
        .route("/withdrawals", post(ledger::request_withdrawal))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{uid}", patch(admin::update_user))
        .route("/admin/tasks", put(admin::save_task))
        .route("/admin/tasks/{id}", delete(admin::delete_task))
        .route("/admin/tasks/{id}/duplicate", post(admin::duplicate_task))
        .route("/admin/withdrawals", get(admin::list_withdrawals))
        .route("/admin/withdrawals/{id}/process", post(admin::process_withdrawal))
        .route("/admin/settings", put(admin::update_settings))
        .route("/admin/seed", post(admin::seed_database))
        .route("/admin/logs", get(admin::list_logs))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    ledger_channel: mpsc::Sender<LedgerRequest>,
    user_channel: mpsc::Sender<UserRequest>,
    admin_channel: mpsc::Sender<AdminRequest>,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        ledger_channel,
        user_channel,
        admin_channel,
    };

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(app_state)).await?;

    Ok(())
}
