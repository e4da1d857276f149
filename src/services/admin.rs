use std::convert::Infallible;

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{ledger::generate_id, Actor, RequestHandler, Service, ServiceContext};
use crate::{
    ledger::{self, ProcessOutcome},
    models::{
        admin_logs::AdminLog,
        settings::GlobalSettings,
        tasks::{Task, TaskType},
        users::{User, UserPatch},
        withdrawals::{Withdrawal, WithdrawalAction},
    },
    repositories::{LedgerStore, OperationError, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Admin privileges required")]
    Forbidden,
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Withdrawal request not found: {0}")]
    WithdrawalNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OperationError<Infallible>> for AdminError {
    fn from(e: OperationError<Infallible>) -> Self {
        match e {
            OperationError::Rejected(never) => match never {},
            OperationError::UserNotFound(uid) => AdminError::UserNotFound(uid),
            OperationError::TaskNotFound(id) => AdminError::TaskNotFound(id),
            OperationError::WithdrawalNotFound(id) => AdminError::WithdrawalNotFound(id),
            OperationError::Store(e) => AdminError::Store(e),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, AdminError>>;

pub enum AdminRequest {
    ListUsers {
        actor: Actor,
        response: Reply<Vec<User>>,
    },
    UpdateUser {
        actor: Actor,
        uid: String,
        patch: UserPatch,
        response: Reply<User>,
    },
    SaveTask {
        actor: Actor,
        task: Task,
        response: Reply<Task>,
    },
    DuplicateTask {
        actor: Actor,
        id: String,
        response: Reply<Task>,
    },
    DeleteTask {
        actor: Actor,
        id: String,
        response: Reply<()>,
    },
    ListWithdrawals {
        actor: Actor,
        response: Reply<Vec<Withdrawal>>,
    },
    ProcessWithdrawal {
        actor: Actor,
        id: String,
        action: WithdrawalAction,
        reason: Option<String>,
        response: Reply<(Withdrawal, ProcessOutcome)>,
    },
    UpdateSettings {
        actor: Actor,
        settings: GlobalSettings,
        response: Reply<GlobalSettings>,
    },
    SeedDatabase {
        actor: Actor,
        response: Reply<Vec<Task>>,
    },
    ListLogs {
        actor: Actor,
        response: Reply<Vec<AdminLog>>,
    },
}

#[derive(Clone)]
pub struct AdminRequestHandler<S: LedgerStore> {
    context: ServiceContext<S>,
}

impl<S: LedgerStore> AdminRequestHandler<S> {
    pub fn new(context: ServiceContext<S>) -> Self {
        AdminRequestHandler { context }
    }

    fn authorize(&self, actor: &Actor) -> Result<(), AdminError> {
        if self.context.admins.is_admin(&actor.uid, &actor.email) {
            Ok(())
        } else {
            log::warn!("Rejected admin request from {} <{}>", actor.uid, actor.email);
            Err(AdminError::Forbidden)
        }
    }

    /// Appends an audit entry. Failures are logged and otherwise ignored.
    async fn log_action(&self, actor: &Actor, action: &str, details: String) {
        let entry = AdminLog {
            id: Uuid::new_v4().hyphenated().to_string(),
            admin_email: actor.email.clone(),
            admin_uid: actor.uid.clone(),
            action: action.to_string(),
            details,
            timestamp: self.context.clock.now().to_utc(),
        };

        if let Err(e) = self.context.store.append_admin_log(&entry).await {
            log::warn!("Could not append admin log '{action}': {e}");
        }
    }

    pub async fn list_users(&self, actor: &Actor) -> Result<Vec<User>, AdminError> {
        self.authorize(actor)?;
        Ok(self.context.store.list_users().await?)
    }

    pub async fn update_user(&self, actor: &Actor, uid: &str, patch: UserPatch) -> Result<User, AdminError> {
        self.authorize(actor)?;
        let details = format!("Updated user {uid}: {}.", patch.describe());

        let (user, ()) = self
            .context
            .store
            .update_user(uid, move |user| {
                patch.apply(user);
                Ok::<_, Infallible>(())
            })
            .await?;

        self.context.notifier.publish_user(&user);
        self.log_action(actor, "Update User", details).await;
        Ok(user)
    }

    pub async fn save_task(&self, actor: &Actor, task: Task) -> Result<Task, AdminError> {
        self.authorize(actor)?;
        let task = if task.id.trim().is_empty() {
            Task { id: generate_id(), ..task }
        } else {
            task
        };

        self.context.store.save_task(&task).await?;
        self.log_action(actor, "Save Task", format!("Saved task: {}", task.title)).await;
        Ok(task)
    }

    pub async fn duplicate_task(&self, actor: &Actor, id: &str) -> Result<Task, AdminError> {
        self.authorize(actor)?;
        let original = self
            .context
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| AdminError::TaskNotFound(id.to_string()))?;

        let copy = original.duplicate(generate_id());
        self.context.store.save_task(&copy).await?;
        self.log_action(actor, "Duplicate Task", format!("Duplicated task: {}", original.title))
            .await;
        Ok(copy)
    }

    pub async fn delete_task(&self, actor: &Actor, id: &str) -> Result<(), AdminError> {
        self.authorize(actor)?;
        if !self.context.store.delete_task(id).await? {
            return Err(AdminError::TaskNotFound(id.to_string()));
        }

        self.log_action(actor, "Delete Task", format!("Deleted task ID: {id}")).await;
        Ok(())
    }

    pub async fn list_withdrawals(&self, actor: &Actor) -> Result<Vec<Withdrawal>, AdminError> {
        self.authorize(actor)?;
        Ok(self.context.store.list_withdrawals(None).await?)
    }

    /// Settles a PENDING request. Requests already settled are left as they
    /// are and reported back unchanged.
    pub async fn process_withdrawal(
        &self,
        actor: &Actor,
        id: &str,
        action: WithdrawalAction,
        reason: Option<String>,
    ) -> Result<(Withdrawal, ProcessOutcome), AdminError> {
        self.authorize(actor)?;
        let details = format!(
            "{action} withdrawal {id}. Reason: {}",
            reason.as_deref().unwrap_or("N/A")
        );

        let (withdrawal, owner, outcome) = self
            .context
            .store
            .update_withdrawal(id, move |withdrawal, owner| {
                Ok::<_, Infallible>(ledger::process_withdrawal(withdrawal, owner, action, reason))
            })
            .await?;

        if outcome.changed() {
            if let Some(owner) = &owner {
                self.context.notifier.publish_user(owner);
            }
            self.log_action(actor, "Process Withdrawal", details).await;
        } else {
            log::info!("Withdrawal {id} already processed, nothing to do");
        }
        Ok((withdrawal, outcome))
    }

    pub async fn update_settings(&self, actor: &Actor, settings: GlobalSettings) -> Result<GlobalSettings, AdminError> {
        self.authorize(actor)?;

        self.context.store.save_settings(&settings).await?;
        self.context.notifier.publish_settings(&settings);
        self.log_action(actor, "Update Settings", "Updated global settings".to_string())
            .await;
        Ok(settings)
    }

    /// Writes the sample catalog and the default settings.
    pub async fn seed_database(&self, actor: &Actor) -> Result<Vec<Task>, AdminError> {
        self.authorize(actor)?;
        let tasks = sample_tasks();
        let settings = GlobalSettings::default();

        for task in &tasks {
            self.context.store.save_task(task).await?;
        }
        self.context.store.save_settings(&settings).await?;
        self.context.notifier.publish_settings(&settings);

        self.log_action(actor, "Seed Database", "Populated database with sample data".to_string())
            .await;
        Ok(tasks)
    }

    pub async fn list_logs(&self, actor: &Actor) -> Result<Vec<AdminLog>, AdminError> {
        self.authorize(actor)?;
        Ok(self.context.store.list_admin_logs().await?)
    }
}

fn sample_tasks() -> Vec<Task> {
    vec![
        Task {
            id: generate_id(),
            title: "Join Mailivery Email List".to_string(),
            description: "Connect your email to the interface and verify.".to_string(),
            reward: 0.35402,
            currency_val: Some(0.28),
            task_type: TaskType::Signup,
            image_url: "https://picsum.photos/seed/mail/200/200".to_string(),
            is_multi_task: true,
            is_active: true,
            url: None,
            max_completions: Some(1),
        },
        Task {
            id: generate_id(),
            title: "Goblin Miner: Idle Merger".to_string(),
            description: "Reach level 50 to earn rewards.".to_string(),
            reward: 1427.49,
            currency_val: Some(10.50),
            task_type: TaskType::Game,
            image_url: "https://picsum.photos/seed/goblin/200/200".to_string(),
            is_multi_task: false,
            is_active: true,
            url: None,
            max_completions: Some(1),
        },
    ]
}

#[async_trait]
impl<S: LedgerStore> RequestHandler<AdminRequest> for AdminRequestHandler<S> {
    async fn handle_request(&self, request: AdminRequest) {
        match request {
            AdminRequest::ListUsers { actor, response } => {
                let _ = response.send(self.list_users(&actor).await);
            }
            AdminRequest::UpdateUser {
                actor,
                uid,
                patch,
                response,
            } => {
                let _ = response.send(self.update_user(&actor, &uid, patch).await);
            }
            AdminRequest::SaveTask { actor, task, response } => {
                let _ = response.send(self.save_task(&actor, task).await);
            }
            AdminRequest::DuplicateTask { actor, id, response } => {
                let _ = response.send(self.duplicate_task(&actor, &id).await);
            }
            AdminRequest::DeleteTask { actor, id, response } => {
                let _ = response.send(self.delete_task(&actor, &id).await);
            }
            AdminRequest::ListWithdrawals { actor, response } => {
                let _ = response.send(self.list_withdrawals(&actor).await);
            }
            AdminRequest::ProcessWithdrawal {
                actor,
                id,
                action,
                reason,
                response,
            } => {
                let _ = response.send(self.process_withdrawal(&actor, &id, action, reason).await);
            }
            AdminRequest::UpdateSettings {
                actor,
                settings,
                response,
            } => {
                let _ = response.send(self.update_settings(&actor, settings).await);
            }
            AdminRequest::SeedDatabase { actor, response } => {
                let _ = response.send(self.seed_database(&actor).await);
            }
            AdminRequest::ListLogs { actor, response } => {
                let _ = response.send(self.list_logs(&actor).await);
            }
        }
    }
}

pub struct AdminService;

impl AdminService {
    pub fn new() -> Self {
        AdminService {}
    }
}

#[async_trait]
impl<S: LedgerStore> Service<AdminRequest, AdminRequestHandler<S>> for AdminService {}
