//! The document store behind the ledger.
//!
//! Every balance-changing operation runs as one of the `update_*` /
//! `create_*` transactions below: the store loads the records, hands them to
//! a rule closure, and writes them back only if the closure succeeds. The
//! store guarantees that concurrent transactions touching the same records
//! are serialised.

use async_trait::async_trait;

use crate::models::{
    admin_logs::AdminLog, settings::GlobalSettings, tasks::Task, users::User, withdrawals::Withdrawal,
};

pub mod admin_logs;
pub mod memory;
pub mod postgres;
pub mod settings;
pub mod tasks;
pub mod users;
pub mod withdrawals;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.code().as_deref() {
                Some("42501") => return StoreError::PermissionDenied(db_err.message().to_string()),
                Some("23505") => return StoreError::Conflict(db_err.message().to_string()),
                _ => {}
            }
        }
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Failure of one ledger operation: a business rejection, a missing record,
/// or the store itself failing.
#[derive(Debug, thiserror::Error)]
pub enum OperationError<E> {
    #[error(transparent)]
    Rejected(E),
    #[error("User does not exist: {0}")]
    UserNotFound(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Withdrawal request not found: {0}")]
    WithdrawalNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<E> OperationError<E> {
    pub fn rejection(&self) -> Option<&E> {
        match self {
            OperationError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn referral_code_taken(&self, code: &str) -> Result<bool, StoreError>;

    /// Runs `apply` over the user's record and commits it if `apply` succeeds.
    async fn update_user<T, E, F>(&self, uid: &str, apply: F) -> Result<(User, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<T, E> + Send + 'static;

    /// Like `update_user`, with the catalog task `task_id` (`None` if absent)
    /// read in the same transaction.
    async fn update_user_with_task<T, E, F>(
        &self,
        uid: &str,
        task_id: &str,
        apply: F,
    ) -> Result<(User, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User, Option<&Task>) -> Result<T, E> + Send + 'static;

    /// Runs `apply` over the referee and the other account holding `code`
    /// (`None` if there is none) and commits both records together.
    async fn update_referral<T, E, F>(
        &self,
        uid: &str,
        code: &str,
        apply: F,
    ) -> Result<(User, Option<User>, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User, Option<&mut User>) -> Result<T, E> + Send + 'static;

    /// Runs `apply` over the user's record and inserts the withdrawal it
    /// returns in the same transaction.
    async fn create_withdrawal<E, F>(&self, uid: &str, apply: F) -> Result<(User, Withdrawal), OperationError<E>>
    where
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<Withdrawal, E> + Send + 'static;

    /// Runs `apply` over a withdrawal and its owner (`None` if the account is
    /// gone) and commits both.
    async fn update_withdrawal<T, E, F>(
        &self,
        id: &str,
        apply: F,
    ) -> Result<(Withdrawal, Option<User>, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut Withdrawal, Option<&mut User>) -> Result<T, E> + Send + 'static;

    async fn list_withdrawals(&self, user_id: Option<&str>) -> Result<Vec<Withdrawal>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    async fn save_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Returns whether a task was deleted.
    async fn delete_task(&self, id: &str) -> Result<bool, StoreError>;

    async fn get_settings(&self) -> Result<Option<GlobalSettings>, StoreError>;

    async fn save_settings(&self, settings: &GlobalSettings) -> Result<(), StoreError>;

    async fn append_admin_log(&self, entry: &AdminLog) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_admin_logs(&self) -> Result<Vec<AdminLog>, StoreError>;
}
