use std::convert::Infallible;

use async_trait::async_trait;
use rand::{seq::SliceRandom, thread_rng};
use tokio::sync::{oneshot, watch};

use super::{Actor, RequestHandler, Service, ServiceContext};
use crate::{
    models::{settings::GlobalSettings, tasks::Task, users, withdrawals::Withdrawal},
    repositories::{LedgerStore, OperationError, StoreError},
};

const REFERRAL_CODE_LEN: usize = 6;
const REFERRAL_CODE_ATTEMPTS: usize = 16;
const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub enum UserRequest {
    CreateUser {
        actor: Actor,
        response: oneshot::Sender<Result<users::User, StoreError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<Option<users::User>, StoreError>>,
    },
    SyncAdminStatus {
        actor: Actor,
        response: oneshot::Sender<Result<Option<users::User>, StoreError>>,
    },
    SubscribeUser {
        id: String,
        response: oneshot::Sender<Result<watch::Receiver<Option<users::User>>, StoreError>>,
    },
    ListTasks {
        actor: Actor,
        response: oneshot::Sender<Result<Vec<Task>, StoreError>>,
    },
    ListWithdrawals {
        id: String,
        response: oneshot::Sender<Result<Vec<Withdrawal>, StoreError>>,
    },
    GetSettings {
        response: oneshot::Sender<Result<GlobalSettings, StoreError>>,
    },
    SubscribeSettings {
        response: oneshot::Sender<watch::Receiver<GlobalSettings>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler<S: LedgerStore> {
    context: ServiceContext<S>,
}

impl<S: LedgerStore> UserRequestHandler<S> {
    pub fn new(context: ServiceContext<S>) -> Self {
        UserRequestHandler { context }
    }

    /// Creates the account record for a freshly authenticated identity.
    pub async fn create_user(&self, actor: &Actor) -> Result<users::User, StoreError> {
        let referral_code = self.unused_referral_code().await?;
        let is_admin = self.context.admins.is_admin(&actor.uid, &actor.email);
        let now = self.context.clock.now().to_utc();

        let user = users::User::new(&actor.uid, &actor.email, referral_code, is_admin, now);
        self.context.store.insert_user(&user).await?;

        log::info!("Registered user {} with referral code {}", user.uid, user.referral_code);
        Ok(user)
    }

    async fn unused_referral_code(&self) -> Result<String, StoreError> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            if !self.context.store.referral_code_taken(&code).await? {
                return Ok(code);
            }
        }

        Err(StoreError::Conflict("could not find a free referral code".to_string()))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<users::User>, StoreError> {
        self.context.store.get_user(id).await
    }

    /// Re-derives `isAdmin` from the allow-list.
    pub async fn sync_admin_status(&self, actor: &Actor) -> Result<Option<users::User>, StoreError> {
        let is_admin = self.context.admins.is_admin(&actor.uid, &actor.email);

        match self
            .context
            .store
            .update_user(&actor.uid, move |user| {
                user.is_admin = is_admin;
                Ok::<_, Infallible>(())
            })
            .await
        {
            Ok((user, ())) => {
                self.context.notifier.publish_user(&user);
                Ok(Some(user))
            }
            Err(OperationError::Store(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    pub async fn subscribe_user(&self, id: &str) -> Result<watch::Receiver<Option<users::User>>, StoreError> {
        self.context.notifier.prune();
        let receiver = self.context.notifier.subscribe_user(id);
        let current = self.context.store.get_user(id).await?;
        self.context.notifier.seed_user(id, current);

        Ok(receiver)
    }

    /// Admins see the whole catalog, everyone else only active tasks.
    pub async fn list_tasks(&self, actor: &Actor) -> Result<Vec<Task>, StoreError> {
        let tasks = self.context.store.list_tasks().await?;

        if self.context.admins.is_admin(&actor.uid, &actor.email) {
            Ok(tasks)
        } else {
            Ok(tasks.into_iter().filter(|task| task.is_active).collect())
        }
    }

    pub async fn list_withdrawals(&self, id: &str) -> Result<Vec<Withdrawal>, StoreError> {
        self.context.store.list_withdrawals(Some(id)).await
    }
}

fn generate_referral_code() -> String {
    let mut rng = thread_rng();

    (0..REFERRAL_CODE_LEN)
        .filter_map(|_| REFERRAL_CODE_CHARSET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}

#[async_trait]
impl<S: LedgerStore> RequestHandler<UserRequest> for UserRequestHandler<S> {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateUser { actor, response } => {
                let user = self.create_user(&actor).await;
                let _ = response.send(user);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(&id).await;
                let _ = response.send(user);
            }
            UserRequest::SyncAdminStatus { actor, response } => {
                let user = self.sync_admin_status(&actor).await;
                let _ = response.send(user);
            }
            UserRequest::SubscribeUser { id, response } => {
                let receiver = self.subscribe_user(&id).await;
                let _ = response.send(receiver);
            }
            UserRequest::ListTasks { actor, response } => {
                let tasks = self.list_tasks(&actor).await;
                let _ = response.send(tasks);
            }
            UserRequest::ListWithdrawals { id, response } => {
                let withdrawals = self.list_withdrawals(&id).await;
                let _ = response.send(withdrawals);
            }
            UserRequest::GetSettings { response } => {
                let settings = self.context.settings_snapshot().await;
                let _ = response.send(settings);
            }
            UserRequest::SubscribeSettings { response } => {
                let _ = response.send(self.context.notifier.subscribe_settings());
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl<S: LedgerStore> Service<UserRequest, UserRequestHandler<S>> for UserService {}
