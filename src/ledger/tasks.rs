use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::{daily_reset::DailyResetPatch, Rejection};
use crate::models::{tasks::Task, users::User};

/// Pseudo-task ids credited after an ad view; never in the catalog.
pub const AD_WATCH_PREFIX: &str = "AD_WATCH";
pub const UNLIMITED_COMPLETIONS: i64 = 999_999;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskCompletionError {
    #[error("Task completion limit reached for this account ({limit}).")]
    LimitReached { limit: i64 },
    #[error("Invalid task reward {0}")]
    InvalidReward(f64),
}

impl Rejection for TaskCompletionError {
    fn code(&self) -> &'static str {
        match self {
            TaskCompletionError::LimitReached { .. } => "COMPLETION_LIMIT",
            TaskCompletionError::InvalidReward(_) => "INVALID_AMOUNT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completed {
    pub task_id: String,
    pub reward: f64,
    pub completions: usize,
    pub limit: i64,
}

pub fn is_ad_watch(task_id: &str) -> bool {
    task_id.starts_with(AD_WATCH_PREFIX)
}

/// Per-user cap for a task. Ad pseudo-tasks and tasks missing from the
/// catalog are unlimited.
pub fn completion_limit(task: Option<&Task>) -> i64 {
    match task {
        Some(task) => match task.max_completions {
            Some(max) if max > 1 => max,
            _ if task.is_multi_task => UNLIMITED_COMPLETIONS,
            _ => 1,
        },
        None => UNLIMITED_COMPLETIONS,
    }
}

/// Reward and cap for one completion. Catalog tasks pay their own reward;
/// ad pseudo-tasks and ids missing from the catalog pay the posted amount.
pub fn completion_terms(task: Option<&Task>, posted_reward: f64) -> (f64, i64) {
    let reward = task.map_or(posted_reward, |task| task.reward);
    (reward, completion_limit(task))
}

pub fn complete_task(
    user: &mut User,
    task_id: &str,
    reward: f64,
    limit: i64,
    now: DateTime<FixedOffset>,
) -> Result<Completed, TaskCompletionError> {
    if !reward.is_finite() || reward < 0.0 {
        return Err(TaskCompletionError::InvalidReward(reward));
    }

    let completions = user.completions_of(task_id);
    if completions as i64 >= limit {
        return Err(TaskCompletionError::LimitReached { limit });
    }

    DailyResetPatch::for_user(user, now).apply(user);
    user.balance += reward;
    user.completed_task_ids.push(task_id.to_string());

    Ok(Completed {
        task_id: task_id.to_string(),
        reward,
        completions: completions + 1,
        limit,
    })
}
