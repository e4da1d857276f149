use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    ledger::{Clock, DrawSource},
    models::settings::GlobalSettings,
    repositories::{LedgerStore, StoreError},
    settings::Settings,
};

mod admin;
mod http;
mod ledger;
mod notifier;
mod users;

pub use notifier::Notifier;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// The authenticated caller, as asserted by the fronting auth service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    pub email: String,
}

/// Super-admin allow-list: a fixed email or a fixed uid.
#[derive(Clone, Debug, Default)]
pub struct AdminAllowList {
    email: String,
    uid: String,
}

impl AdminAllowList {
    pub fn new(email: &str, uid: &str) -> Self {
        AdminAllowList {
            email: email.trim().to_lowercase(),
            uid: uid.trim().to_string(),
        }
    }

    pub fn is_admin(&self, uid: &str, email: &str) -> bool {
        let email_match = !self.email.is_empty() && email.trim().to_lowercase() == self.email;
        let uid_match = !self.uid.is_empty() && uid == self.uid;

        email_match || uid_match
    }
}

/// Everything a request handler needs to run ledger operations.
#[derive(Clone)]
pub struct ServiceContext<S: LedgerStore> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
    pub draws: Arc<dyn DrawSource>,
    pub notifier: Notifier,
    pub admins: AdminAllowList,
}

impl<S: LedgerStore> ServiceContext<S> {
    /// Reads the settings document once for one invocation, falling back to
    /// the defaults when none is stored.
    pub async fn settings_snapshot(&self) -> Result<GlobalSettings, StoreError> {
        Ok(self.store.get_settings().await?.unwrap_or_default())
    }
}

pub async fn start_services<S: LedgerStore>(
    context: ServiceContext<S>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (admin_tx, mut admin_rx) = mpsc::channel(512);

    let mut ledger_service = ledger::LedgerService::new();
    let mut user_service = users::UserService::new();
    let mut admin_service = admin::AdminService::new();

    log::info!("Starting ledger service.");
    let ledger_context = context.clone();
    tokio::spawn(async move {
        ledger_service
            .run(ledger::LedgerRequestHandler::new(ledger_context), &mut ledger_rx)
            .await;
    });

    log::info!("Starting user service.");
    let user_context = context.clone();
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_context), &mut user_rx)
            .await;
    });

    log::info!("Starting admin service.");
    let admin_context = context.clone();
    tokio::spawn(async move {
        admin_service
            .run(admin::AdminRequestHandler::new(admin_context), &mut admin_rx)
            .await;
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, ledger_tx, user_tx, admin_tx).await?;

    Ok(())
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use chrono::{DateTime, FixedOffset};

    use super::{AdminAllowList, Notifier, ServiceContext};
    use crate::{
        ledger::testing::{user_at, FixedClock, FixedDraw},
        models::{settings::GlobalSettings, users::User},
        repositories::{LedgerStore, MemoryStore},
    };

    pub const ADMIN_EMAIL: &str = "admin@example.com";

    pub fn context(now: DateTime<FixedOffset>, draw: f64) -> (ServiceContext<MemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now));
        let context = ServiceContext {
            store: MemoryStore::new(),
            clock: clock.clone(),
            draws: Arc::new(FixedDraw(draw)),
            notifier: Notifier::new(GlobalSettings::default()),
            admins: AdminAllowList::new(ADMIN_EMAIL, ""),
        };
        (context, clock)
    }

    /// Stores a fresh account, letting `edit` adjust it first.
    pub async fn seed_user(
        context: &ServiceContext<MemoryStore>,
        uid: &str,
        now: DateTime<FixedOffset>,
        edit: impl FnOnce(&mut User),
    ) -> User {
        let mut user = user_at(uid, now);
        edit(&mut user);
        context.store.insert_user(&user).await.unwrap();
        user
    }
}
