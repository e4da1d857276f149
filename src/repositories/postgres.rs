use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use super::{
    admin_logs::AdminLogRepository, settings::SettingsRepository, tasks::TaskRepository,
    users::UserRepository, withdrawals::WithdrawalRepository, LedgerStore, OperationError, StoreError,
};
use crate::models::{
    admin_logs::AdminLog, settings::GlobalSettings, tasks::Task, users::User, withdrawals::Withdrawal,
};

/// Postgres-backed store. Transactions take row locks on every record they
/// read, so concurrent operations on one account queue behind each other.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    users: UserRepository,
    tasks: TaskRepository,
    withdrawals: WithdrawalRepository,
    settings: SettingsRepository,
    admin_logs: AdminLogRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            users: UserRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            withdrawals: WithdrawalRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool.clone()),
            admin_logs: AdminLogRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(PgStore::new(pool))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert_user(user).await
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        self.users.get_user_by_id(uid).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.users.list_users().await
    }

    async fn referral_code_taken(&self, code: &str) -> Result<bool, StoreError> {
        self.users.referral_code_exists(code).await
    }

    async fn update_user<T, E, F>(&self, uid: &str, apply: F) -> Result<(User, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<T, E> + Send + 'static,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut user = UserRepository::lock_user(&mut tx, uid)
            .await?
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;

        // Dropping `tx` on the error paths rolls it back.
        let value = apply(&mut user).map_err(OperationError::Rejected)?;

        UserRepository::write_user(&mut tx, &user).await?;
        tx.commit().await.map_err(StoreError::from)?;

        Ok((user, value))
    }

    async fn update_user_with_task<T, E, F>(
        &self,
        uid: &str,
        task_id: &str,
        apply: F,
    ) -> Result<(User, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User, Option<&Task>) -> Result<T, E> + Send + 'static,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut user = UserRepository::lock_user(&mut tx, uid)
            .await?
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        // Shared lock: admin edits to the task wait for this commit.
        let task = TaskRepository::share_task(&mut tx, task_id).await?;

        let value = apply(&mut user, task.as_ref()).map_err(OperationError::Rejected)?;

        UserRepository::write_user(&mut tx, &user).await?;
        tx.commit().await.map_err(StoreError::from)?;

        Ok((user, value))
    }

    async fn update_referral<T, E, F>(
        &self,
        uid: &str,
        code: &str,
        apply: F,
    ) -> Result<(User, Option<User>, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User, Option<&mut User>) -> Result<T, E> + Send + 'static,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut user_ids = vec![uid.to_string()];
        user_ids.extend(UserRepository::find_id_by_referral_code(&mut tx, code, uid).await?);

        let mut locked = UserRepository::lock_users(&mut tx, &user_ids).await?;
        let referee_at = locked
            .iter()
            .position(|user| user.uid == uid)
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        let mut referee = locked.swap_remove(referee_at);
        // The code is re-checked now that the row is locked.
        let mut referrer = locked.pop().filter(|user| user.referral_code == code);

        let value = apply(&mut referee, referrer.as_mut()).map_err(OperationError::Rejected)?;

        UserRepository::write_user(&mut tx, &referee).await?;
        if let Some(referrer) = &referrer {
            UserRepository::write_user(&mut tx, referrer).await?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        Ok((referee, referrer, value))
    }

    async fn create_withdrawal<E, F>(&self, uid: &str, apply: F) -> Result<(User, Withdrawal), OperationError<E>>
    where
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<Withdrawal, E> + Send + 'static,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut user = UserRepository::lock_user(&mut tx, uid)
            .await?
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;

        let withdrawal = apply(&mut user).map_err(OperationError::Rejected)?;

        UserRepository::write_user(&mut tx, &user).await?;
        WithdrawalRepository::insert_withdrawal(&mut tx, &withdrawal).await?;
        tx.commit().await.map_err(StoreError::from)?;

        Ok((user, withdrawal))
    }

    async fn update_withdrawal<T, E, F>(
        &self,
        id: &str,
        apply: F,
    ) -> Result<(Withdrawal, Option<User>, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut Withdrawal, Option<&mut User>) -> Result<T, E> + Send + 'static,
    {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut withdrawal = WithdrawalRepository::lock_withdrawal(&mut tx, id)
            .await?
            .ok_or_else(|| OperationError::WithdrawalNotFound(id.to_string()))?;
        let mut owner = UserRepository::lock_user(&mut tx, &withdrawal.user_id).await?;

        let value = apply(&mut withdrawal, owner.as_mut()).map_err(OperationError::Rejected)?;

        WithdrawalRepository::write_withdrawal(&mut tx, &withdrawal).await?;
        if let Some(owner) = &owner {
            UserRepository::write_user(&mut tx, owner).await?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        Ok((withdrawal, owner, value))
    }

    async fn list_withdrawals(&self, user_id: Option<&str>) -> Result<Vec<Withdrawal>, StoreError> {
        self.withdrawals.list_withdrawals(user_id).await
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        self.tasks.get_task(id).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.tasks.list_tasks().await
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.upsert_task(task).await
    }

    async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        self.tasks.delete_task(id).await
    }

    async fn get_settings(&self) -> Result<Option<GlobalSettings>, StoreError> {
        self.settings.get_settings().await
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> Result<(), StoreError> {
        self.settings.save_settings(settings).await
    }

    async fn append_admin_log(&self, entry: &AdminLog) -> Result<(), StoreError> {
        self.admin_logs.append(entry).await
    }

    async fn list_admin_logs(&self) -> Result<Vec<AdminLog>, StoreError> {
        self.admin_logs.list().await
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::{
        ledger::{self, testing::at, testing::user_at, ReferralError},
        models::{tasks::TaskType, withdrawals::WithdrawalMethod},
    };

    fn survey() -> Task {
        Task {
            id: "t1".into(),
            title: "Survey".into(),
            description: String::new(),
            reward: 0.25,
            currency_val: None,
            task_type: TaskType::Survey,
            image_url: String::new(),
            is_multi_task: false,
            is_active: true,
            url: None,
            max_completions: Some(2),
        }
    }

    async fn store_with(pool: PgPool, users: &[&str]) -> PgStore {
        let store = PgStore::new(pool);
        for uid in users {
            let mut user = user_at(uid, at(2024, 5, 1, 12));
            user.balance = 1.25;
            user.completed_task_ids = vec!["t0".into(), "t0".into()];
            store.insert_user(&user).await.unwrap();
        }
        store
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn user_documents_round_trip(pool: PgPool) {
        let store = store_with(pool, &["u1"]).await;

        let mut expected = user_at("u1", at(2024, 5, 1, 12));
        expected.balance = 1.25;
        expected.completed_task_ids = vec!["t0".into(), "t0".into()];
        assert_eq!(store.get_user("u1").await.unwrap(), Some(expected));
        assert!(store.referral_code_taken("0000U1").await.unwrap());
        assert!(matches!(
            store.insert_user(&user_at("u1", at(2024, 5, 1, 12))).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn withdrawals_are_filtered_by_owner(pool: PgPool) {
        let store = store_with(pool, &["u1", "u2"]).await;
        let now = at(2024, 5, 1, 12);

        for (uid, id) in [("u1", "w1"), ("u2", "w2")] {
            store
                .create_withdrawal(uid, move |user| {
                    ledger::request_withdrawal(user, id.to_string(), 1.0, WithdrawalMethod::PayPal, now)
                })
                .await
                .unwrap();
        }

        let mine = store.list_withdrawals(Some("u1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "w1");
        assert_eq!(store.list_withdrawals(None).await.unwrap().len(), 2);
        assert!((store.get_user("u1").await.unwrap().unwrap().balance - 0.25).abs() < 1e-12);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn crossed_referrals_both_commit(pool: PgPool) {
        let store = store_with(pool, &["u1", "u2"]).await;

        let mut handles = Vec::new();
        for (uid, code) in [("u1", "0000U2"), ("u2", "0000U1")] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_referral(uid, code, move |referee, referrer| {
                        ledger::redeem_referral(referee, referrer, code, 0.1)
                    })
                    .await
            }));
        }
        for handle in handles {
            let result: Result<_, OperationError<ReferralError>> = handle.await.unwrap();
            assert!(result.is_ok(), "{:?}", result.err());
        }

        for uid in ["u1", "u2"] {
            let user = store.get_user(uid).await.unwrap().unwrap();
            assert_eq!(user.referral_count, 1);
            assert!(user.referred_by.is_some());
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn completion_sees_the_stored_task(pool: PgPool) {
        let store = store_with(pool, &["u1"]).await;
        store.save_task(&survey()).await.unwrap();

        let (user, cap) = store
            .update_user_with_task("u1", "t1", |user, task| {
                user.balance += task.map_or(0.0, |t| t.reward);
                Ok::<_, ()>(task.and_then(|t| t.max_completions))
            })
            .await
            .unwrap();
        assert_eq!(cap, Some(2));
        assert!((user.balance - 1.5).abs() < 1e-12);

        let (_, missing) = store
            .update_user_with_task("u1", "gone", |_, task| Ok::<_, ()>(task.is_none()))
            .await
            .unwrap();
        assert!(missing);
    }
}
