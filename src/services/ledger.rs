use std::convert::Infallible;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceContext};
use crate::{
    ledger::{
        self,
        bonus::DailyBonus,
        mining::Mined,
        referral::Redeemed,
        tasks::{is_ad_watch, Completed},
        DailyBonusError, DailyGoalError, MineError, RefillError, ReferralError, Rejection, SpinError,
        SpinOutcome, TaskCompletionError, WithdrawalError,
    },
    models::{
        users::User,
        withdrawals::{Withdrawal, WithdrawalMethod},
    },
    repositories::{LedgerStore, OperationError},
};

const WITHDRAWAL_ID_LEN: usize = 20;

/// Result of a committed operation together with the record it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Applied<T> {
    pub outcome: T,
    pub user: User,
}

type Reply<T, E> = oneshot::Sender<Result<Applied<T>, OperationError<E>>>;

pub enum LedgerRequest {
    Mine {
        uid: String,
        response: Reply<Mined, MineError>,
    },
    RefillEnergy {
        uid: String,
        response: Reply<i64, RefillError>,
    },
    ClaimDailyBonus {
        uid: String,
        response: Reply<DailyBonus, DailyBonusError>,
    },
    SpinWheel {
        uid: String,
        response: Reply<SpinOutcome, SpinError>,
    },
    GrantBonusSpin {
        uid: String,
        response: Reply<i64, Infallible>,
    },
    ClaimDailyGoal {
        uid: String,
        response: Reply<f64, DailyGoalError>,
    },
    RedeemReferral {
        uid: String,
        code: String,
        response: Reply<Redeemed, ReferralError>,
    },
    CompleteTask {
        uid: String,
        task_id: String,
        reward: f64,
        response: Reply<Completed, TaskCompletionError>,
    },
    RequestWithdrawal {
        uid: String,
        amount: f64,
        method: WithdrawalMethod,
        response: Reply<Withdrawal, WithdrawalError>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler<S: LedgerStore> {
    context: ServiceContext<S>,
}

impl<S: LedgerStore> LedgerRequestHandler<S> {
    pub fn new(context: ServiceContext<S>) -> Self {
        LedgerRequestHandler { context }
    }

    fn committed<T, E: Rejection>(
        &self,
        operation: &str,
        uid: &str,
        result: Result<(User, T), OperationError<E>>,
    ) -> Result<Applied<T>, OperationError<E>> {
        match result {
            Ok((user, outcome)) => {
                log::debug!("{operation} committed for {uid}");
                self.context.notifier.publish_user(&user);
                Ok(Applied { outcome, user })
            }
            Err(e) => {
                match e.rejection() {
                    Some(rejection) => log::debug!("{operation} rejected for {uid}: {}", rejection.code()),
                    None if matches!(e, OperationError::Store(_)) => log::error!("{operation} failed for {uid}: {e}"),
                    None => log::warn!("{operation} failed for {uid}: {e}"),
                }
                Err(e)
            }
        }
    }

    pub async fn mine(&self, uid: &str) -> Result<Applied<Mined>, OperationError<MineError>> {
        let settings = self.context.settings_snapshot().await?;
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| ledger::mine(user, &settings.gamification, now))
            .await;

        self.committed("mine", uid, result)
    }

    pub async fn refill_energy(&self, uid: &str) -> Result<Applied<i64>, OperationError<RefillError>> {
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| ledger::refill_energy(user, now))
            .await;

        self.committed("refill_energy", uid, result)
    }

    pub async fn claim_daily_bonus(&self, uid: &str) -> Result<Applied<DailyBonus>, OperationError<DailyBonusError>> {
        let settings = self.context.settings_snapshot().await?;
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| ledger::claim_daily_bonus(user, &settings.gamification, now))
            .await;

        self.committed("claim_daily_bonus", uid, result)
    }

    pub async fn spin_wheel(&self, uid: &str) -> Result<Applied<SpinOutcome>, OperationError<SpinError>> {
        let outcome = SpinOutcome::from_draw(self.context.draws.draw());
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| ledger::spin_wheel(user, outcome, now))
            .await;

        self.committed("spin_wheel", uid, result)
    }

    pub async fn grant_bonus_spin(&self, uid: &str) -> Result<Applied<i64>, OperationError<Infallible>> {
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| Ok::<_, Infallible>(ledger::grant_bonus_spin(user, now)))
            .await;

        self.committed("grant_bonus_spin", uid, result)
    }

    pub async fn claim_daily_goal(&self, uid: &str) -> Result<Applied<f64>, OperationError<DailyGoalError>> {
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .update_user(uid, move |user| ledger::claim_daily_goal(user, now))
            .await;

        self.committed("claim_daily_goal", uid, result)
    }

    pub async fn redeem_referral(&self, uid: &str, code: &str) -> Result<Applied<Redeemed>, OperationError<ReferralError>> {
        let settings = self.context.settings_snapshot().await?;
        let code = code.trim().to_uppercase();
        let lookup = code.clone();

        let result = self
            .context
            .store
            .update_referral(uid, &lookup, move |referee, referrer| {
                ledger::redeem_referral(referee, referrer, &code, settings.referral_bonus)
            })
            .await
            .map(|(referee, referrer, redeemed)| {
                if let Some(referrer) = referrer {
                    self.context.notifier.publish_user(&referrer);
                }
                (referee, redeemed)
            });

        self.committed("redeem_referral", uid, result)
    }

    pub async fn complete_task(
        &self,
        uid: &str,
        task_id: &str,
        reward: f64,
    ) -> Result<Applied<Completed>, OperationError<TaskCompletionError>> {
        let now = self.context.clock.now();
        let id = task_id.to_string();

        let result = if is_ad_watch(task_id) {
            self.context
                .store
                .update_user(uid, move |user| {
                    let (reward, limit) = ledger::completion_terms(None, reward);
                    ledger::complete_task(user, &id, reward, limit, now)
                })
                .await
        } else {
            self.context
                .store
                .update_user_with_task(uid, task_id, move |user, task| {
                    if task.is_none() {
                        log::warn!("Task {id} missing from catalog, treating as unlimited");
                    }
                    let (reward, limit) = ledger::completion_terms(task, reward);
                    ledger::complete_task(user, &id, reward, limit, now)
                })
                .await
        };

        self.committed("complete_task", uid, result)
    }

    pub async fn request_withdrawal(
        &self,
        uid: &str,
        amount: f64,
        method: WithdrawalMethod,
    ) -> Result<Applied<Withdrawal>, OperationError<WithdrawalError>> {
        let id = generate_id();
        let now = self.context.clock.now();

        let result = self
            .context
            .store
            .create_withdrawal(uid, move |user| ledger::request_withdrawal(user, id, amount, method, now))
            .await;

        self.committed("request_withdrawal", uid, result)
    }
}

/// Random document key; no uniqueness check is made beyond the store's.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(WITHDRAWAL_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl<S: LedgerStore> RequestHandler<LedgerRequest> for LedgerRequestHandler<S> {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Mine { uid, response } => {
                let result = self.mine(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::RefillEnergy { uid, response } => {
                let result = self.refill_energy(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::ClaimDailyBonus { uid, response } => {
                let result = self.claim_daily_bonus(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::SpinWheel { uid, response } => {
                let result = self.spin_wheel(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::GrantBonusSpin { uid, response } => {
                let result = self.grant_bonus_spin(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::ClaimDailyGoal { uid, response } => {
                let result = self.claim_daily_goal(&uid).await;
                let _ = response.send(result);
            }
            LedgerRequest::RedeemReferral { uid, code, response } => {
                let result = self.redeem_referral(&uid, &code).await;
                let _ = response.send(result);
            }
            LedgerRequest::CompleteTask {
                uid,
                task_id,
                reward,
                response,
            } => {
                let result = self.complete_task(&uid, &task_id, reward).await;
                let _ = response.send(result);
            }
            LedgerRequest::RequestWithdrawal {
                uid,
                amount,
                method,
                response,
            } => {
                let result = self.request_withdrawal(&uid, amount, method).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl<S: LedgerStore> Service<LedgerRequest, LedgerRequestHandler<S>> for LedgerService {}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{
        ledger::{tasks::UNLIMITED_COMPLETIONS, testing::at},
        models::tasks::{Task, TaskType},
        repositories::MemoryStore,
        services::testing::{context, seed_user},
    };

    fn handler(draw: f64) -> (LedgerRequestHandler<MemoryStore>, ServiceContext<MemoryStore>) {
        let (context, _) = context(at(2024, 5, 1, 12), draw);
        (LedgerRequestHandler::new(context.clone()), context)
    }

    fn survey(reward: f64, max_completions: Option<i64>) -> Task {
        Task {
            id: "t1".into(),
            title: "Survey".into(),
            description: String::new(),
            reward,
            currency_val: None,
            task_type: TaskType::Survey,
            image_url: String::new(),
            is_multi_task: false,
            is_active: true,
            url: None,
            max_completions,
        }
    }

    #[tokio::test]
    async fn rejected_mine_leaves_record_untouched() {
        let (ledger, context) = handler(0.5);
        let before = seed_user(&context, "u1", at(2024, 5, 1, 12), |u| u.energy = 5).await;

        let err = ledger.mine("u1").await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("OUT_OF_ENERGY"));

        let after = context.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn mine_pays_and_publishes() {
        let (ledger, context) = handler(0.5);
        seed_user(&context, "u1", at(2024, 5, 1, 12), |_| {}).await;
        let mut rx = context.notifier.subscribe_user("u1");

        let applied = ledger.mine("u1").await.unwrap();
        assert_eq!(applied.user.energy, 90);
        assert!((applied.user.balance - 0.0005).abs() < 1e-12);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.energy), Some(90));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (ledger, _) = handler(0.5);
        assert!(matches!(
            ledger.refill_energy("ghost").await,
            Err(OperationError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn spin_limit_lifts_on_the_next_day() {
        let (context, clock) = context(at(2024, 5, 1, 12), 0.05);
        let ledger = LedgerRequestHandler::new(context.clone());
        seed_user(&context, "u1", at(2024, 5, 1, 12), |u| {
            u.daily_spin_count = 7;
            u.spins_available = 3;
        })
        .await;

        let err = ledger.spin_wheel("u1").await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("DAILY_LIMIT_REACHED"));

        clock.advance(Duration::days(1));
        let applied = ledger.spin_wheel("u1").await.unwrap();
        assert_eq!(applied.outcome.label, "Jackpot! 0.05");
        assert_eq!(applied.user.daily_spin_count, 1);
        assert_eq!(applied.user.spins_available, 2);
    }

    #[tokio::test]
    async fn referral_pays_both_sides_once() {
        let (ledger, context) = handler(0.5);
        let alice = seed_user(&context, "alice", at(2024, 5, 1, 12), |_| {}).await;
        seed_user(&context, "bob", at(2024, 5, 1, 12), |_| {}).await;

        let code = format!("  {} ", alice.referral_code.to_lowercase());
        let applied = ledger.redeem_referral("bob", &code).await.unwrap();
        assert_eq!(applied.outcome.referrer_id, "alice");
        assert_eq!(applied.user.referred_by.as_deref(), Some("alice"));
        assert!((applied.user.balance - 0.05).abs() < 1e-12);

        let alice = context.store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.referral_count, 1);
        assert!((alice.balance - 0.10).abs() < 1e-12);

        let err = ledger.redeem_referral("bob", &alice.referral_code).await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("ALREADY_REFERRED"));
        let alice_again = context.store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice_again.referral_count, 1);
    }

    #[tokio::test]
    async fn own_and_unknown_codes_are_refused() {
        let (ledger, context) = handler(0.5);
        let bob = seed_user(&context, "bob", at(2024, 5, 1, 12), |_| {}).await;

        let err = ledger.redeem_referral("bob", &bob.referral_code).await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("SELF_REFERRAL"));

        let err = ledger.redeem_referral("bob", "NOPE42").await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("INVALID_CODE"));
    }

    #[tokio::test]
    async fn catalog_caps_apply_but_ad_views_do_not() {
        let (ledger, context) = handler(0.5);
        seed_user(&context, "u1", at(2024, 5, 1, 12), |_| {}).await;
        context.store.save_task(&survey(0.5, None)).await.unwrap();

        ledger.complete_task("u1", "t1", 0.5).await.unwrap();
        let err = ledger.complete_task("u1", "t1", 0.5).await.unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("COMPLETION_LIMIT"));

        for _ in 0..3 {
            ledger.complete_task("u1", "AD_WATCH_1", 0.005).await.unwrap();
        }
        let user = context.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.completions_of("AD_WATCH_1"), 3);
        assert!((user.balance - 0.515).abs() < 1e-9);
    }

    #[tokio::test]
    async fn catalog_tasks_pay_their_own_reward() {
        let (ledger, context) = handler(0.5);
        seed_user(&context, "u1", at(2024, 5, 1, 12), |_| {}).await;
        context.store.save_task(&survey(0.25, Some(2))).await.unwrap();

        let applied = ledger.complete_task("u1", "t1", 1000.0).await.unwrap();
        assert_eq!(applied.outcome.reward, 0.25);
        assert!((applied.user.balance - 0.25).abs() < 1e-12);

        let applied = ledger.complete_task("u1", "gone", 0.01).await.unwrap();
        assert_eq!(applied.outcome.limit, UNLIMITED_COMPLETIONS);
        assert!((applied.user.balance - 0.26).abs() < 1e-12);
    }

    #[tokio::test]
    async fn cap_is_read_when_the_completion_commits() {
        let (ledger, context) = handler(0.5);
        seed_user(&context, "u1", at(2024, 5, 1, 12), |_| {}).await;
        context.store.save_task(&survey(0.25, Some(3))).await.unwrap();

        ledger.complete_task("u1", "t1", 0.25).await.unwrap();
        context.store.save_task(&survey(0.25, None)).await.unwrap();

        let err = ledger.complete_task("u1", "t1", 0.25).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&TaskCompletionError::LimitReached { limit: 1 }));
        let user = context.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.completions_of("t1"), 1);
    }

    #[tokio::test]
    async fn withdrawal_debits_and_is_listed() {
        let (ledger, context) = handler(0.5);
        seed_user(&context, "u1", at(2024, 5, 1, 12), |u| u.balance = 1.0).await;

        let applied = ledger
            .request_withdrawal("u1", 0.4, WithdrawalMethod::PayPal)
            .await
            .unwrap();
        assert!((applied.user.balance - 0.6).abs() < 1e-12);
        assert_eq!(applied.outcome.id.len(), 20);

        let err = ledger
            .request_withdrawal("u1", 5.0, WithdrawalMethod::Crypto)
            .await
            .unwrap_err();
        assert_eq!(err.rejection().map(|e| e.code()), Some("INSUFFICIENT_FUNDS"));

        let listed = context.store.list_withdrawals(Some("u1")).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
