use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LedgerStore, OperationError, StoreError};
use crate::models::{
    admin_logs::AdminLog, settings::GlobalSettings, tasks::Task, users::User, withdrawals::Withdrawal,
};

#[derive(Default)]
struct Documents {
    users: HashMap<String, User>,
    tasks: HashMap<String, Task>,
    withdrawals: HashMap<String, Withdrawal>,
    settings: Option<GlobalSettings>,
    admin_logs: Vec<AdminLog>,
}

/// In-process store. One mutex over all documents serialises every
/// transaction; rules run on copies that are written back only on success.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<Documents>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().await;

        if docs.users.contains_key(&user.uid) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.uid)));
        }
        if docs.users.values().any(|u| u.referral_code == user.referral_code) {
            return Err(StoreError::Conflict(format!(
                "referral code {} already taken",
                user.referral_code
            )));
        }

        docs.users.insert(user.uid.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        Ok(self.docs.lock().await.users.get(uid).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let docs = self.docs.lock().await;
        let mut users: Vec<User> = docs.users.values().cloned().collect();
        users.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(users)
    }

    async fn referral_code_taken(&self, code: &str) -> Result<bool, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.users.values().any(|u| u.referral_code == code))
    }

    async fn update_user<T, E, F>(&self, uid: &str, apply: F) -> Result<(User, T), OperationError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<T, E> + Send + 'static,
    {
        let mut docs = self.docs.lock().await;

        let mut user = docs
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        let value = apply(&mut user).map_err(OperationError::Rejected)?;

        docs.users.insert(user.uid.clone(), user.clone());
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
        let mut docs = self.docs.lock().await;

        let mut user = docs
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        let value = apply(&mut user, docs.tasks.get(task_id)).map_err(OperationError::Rejected)?;

        docs.users.insert(user.uid.clone(), user.clone());
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
        let mut docs = self.docs.lock().await;

        let mut referee = docs
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        let mut referrer = docs
            .users
            .values()
            .find(|u| u.referral_code == code && u.uid != uid)
            .cloned();

        let value = apply(&mut referee, referrer.as_mut()).map_err(OperationError::Rejected)?;

        docs.users.insert(referee.uid.clone(), referee.clone());
        if let Some(referrer) = &referrer {
            docs.users.insert(referrer.uid.clone(), referrer.clone());
        }
        Ok((referee, referrer, value))
    }

    async fn create_withdrawal<E, F>(&self, uid: &str, apply: F) -> Result<(User, Withdrawal), OperationError<E>>
    where
        E: Send + 'static,
        F: FnOnce(&mut User) -> Result<Withdrawal, E> + Send + 'static,
    {
        let mut docs = self.docs.lock().await;

        let mut user = docs
            .users
            .get(uid)
            .cloned()
            .ok_or_else(|| OperationError::UserNotFound(uid.to_string()))?;
        let withdrawal = apply(&mut user).map_err(OperationError::Rejected)?;

        if docs.withdrawals.contains_key(&withdrawal.id) {
            return Err(StoreError::Conflict(format!("withdrawal {} already exists", withdrawal.id)).into());
        }

        docs.users.insert(user.uid.clone(), user.clone());
        docs.withdrawals.insert(withdrawal.id.clone(), withdrawal.clone());
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
        let mut docs = self.docs.lock().await;

        let mut withdrawal = docs
            .withdrawals
            .get(id)
            .cloned()
            .ok_or_else(|| OperationError::WithdrawalNotFound(id.to_string()))?;
        let mut owner = docs.users.get(&withdrawal.user_id).cloned();

        let value = apply(&mut withdrawal, owner.as_mut()).map_err(OperationError::Rejected)?;

        docs.withdrawals.insert(withdrawal.id.clone(), withdrawal.clone());
        if let Some(owner) = &owner {
            docs.users.insert(owner.uid.clone(), owner.clone());
        }
        Ok((withdrawal, owner, value))
    }

    async fn list_withdrawals(&self, user_id: Option<&str>) -> Result<Vec<Withdrawal>, StoreError> {
        let docs = self.docs.lock().await;
        let mut list: Vec<Withdrawal> = docs
            .withdrawals
            .values()
            .filter(|w| user_id.map_or(true, |uid| w.user_id == uid))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(list)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.docs.lock().await.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let docs = self.docs.lock().await;
        let mut tasks: Vec<Task> = docs.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.docs.lock().await.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.lock().await.tasks.remove(id).is_some())
    }

    async fn get_settings(&self) -> Result<Option<GlobalSettings>, StoreError> {
        Ok(self.docs.lock().await.settings.clone())
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> Result<(), StoreError> {
        self.docs.lock().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn append_admin_log(&self, entry: &AdminLog) -> Result<(), StoreError> {
        self.docs.lock().await.admin_logs.push(entry.clone());
        Ok(())
    }

    async fn list_admin_logs(&self) -> Result<Vec<AdminLog>, StoreError> {
        let docs = self.docs.lock().await;
        let mut logs = docs.admin_logs.clone();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::tasks::TaskType;

    fn user(uid: &str, code: &str) -> User {
        User::new(uid, &format!("{uid}@example.com"), code.to_string(), false, Utc::now())
    }

    #[tokio::test]
    async fn failed_transaction_writes_nothing() {
        let store = MemoryStore::new();
        store.insert_user(&user("u1", "AAA111")).await.unwrap();

        let result = store
            .update_user("u1", |user| {
                user.balance = 99.0;
                Err::<(), _>("rejected")
            })
            .await;

        assert!(matches!(result, Err(OperationError::Rejected("rejected"))));
        assert_eq!(store.get_user("u1").await.unwrap().unwrap().balance, 0.0);
    }

    #[tokio::test]
    async fn missing_user_is_reported() {
        let store = MemoryStore::new();
        let result = store.update_user("ghost", |_| Ok::<_, ()>(())).await;

        assert!(matches!(result, Err(OperationError::UserNotFound(uid)) if uid == "ghost"));
    }

    #[tokio::test]
    async fn task_is_read_alongside_the_user() {
        let store = MemoryStore::new();
        store.insert_user(&user("u1", "AAA111")).await.unwrap();
        let task = Task {
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
            max_completions: Some(4),
        };
        store.save_task(&task).await.unwrap();

        let (user, seen) = store
            .update_user_with_task("u1", "t1", |user, task| {
                user.balance += task.map_or(0.0, |t| t.reward);
                Ok::<_, ()>(task.and_then(|t| t.max_completions))
            })
            .await
            .unwrap();
        assert_eq!(seen, Some(4));
        assert_eq!(user.balance, 0.25);

        let (_, missing) = store
            .update_user_with_task("u1", "gone", |_, task| Ok::<_, ()>(task.is_none()))
            .await
            .unwrap();
        assert!(missing);
    }

    #[tokio::test]
    async fn duplicate_referral_code_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&user("u1", "AAA111")).await.unwrap();

        let err = store.insert_user(&user("u2", "AAA111")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.referral_code_taken("AAA111").await.unwrap());
    }

    #[tokio::test]
    async fn referral_lookup_skips_own_record() {
        let store = MemoryStore::new();
        store.insert_user(&user("u1", "AAA111")).await.unwrap();

        let (_, referrer, ()) = store
            .update_referral("u1", "AAA111", |_, referrer| {
                assert!(referrer.is_none());
                Ok::<_, ()>(())
            })
            .await
            .unwrap();
        assert!(referrer.is_none());
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_writes() {
        let store = MemoryStore::new();
        store.insert_user(&user("u1", "AAA111")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_user("u1", |user| {
                        user.xp += 1;
                        Ok::<_, ()>(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get_user("u1").await.unwrap().unwrap().xp, 50);
    }
}
