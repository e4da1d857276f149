use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::Rejection;
use crate::models::{
    users::User,
    withdrawals::{Withdrawal, WithdrawalAction, WithdrawalMethod, WithdrawalStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum WithdrawalError {
    #[error("Invalid withdrawal amount {0}")]
    InvalidAmount(f64),
    #[error("Insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds { balance: f64, amount: f64 },
}

impl Rejection for WithdrawalError {
    fn code(&self) -> &'static str {
        match self {
            WithdrawalError::InvalidAmount(_) => "INVALID_AMOUNT",
            WithdrawalError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
        }
    }
}

/// Debits `amount` and builds the PENDING request stored alongside it.
pub fn request_withdrawal(
    user: &mut User,
    id: String,
    amount: f64,
    method: WithdrawalMethod,
    now: DateTime<FixedOffset>,
) -> Result<Withdrawal, WithdrawalError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(WithdrawalError::InvalidAmount(amount));
    }
    if user.balance < amount {
        return Err(WithdrawalError::InsufficientFunds {
            balance: user.balance,
            amount,
        });
    }

    user.balance -= amount;

    Ok(Withdrawal {
        id,
        user_id: user.uid.clone(),
        user_email: Some(user.email.clone()),
        amount,
        method,
        status: WithdrawalStatus::Pending,
        date: now.to_utc(),
        rejection_reason: None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ProcessOutcome {
    Approved,
    Rejected { refunded: bool },
    /// The request had already left PENDING; nothing changed.
    AlreadyProcessed { status: WithdrawalStatus },
}

impl ProcessOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ProcessOutcome::AlreadyProcessed { .. })
    }
}

/// Moves a PENDING request to its terminal state. A rejection refunds the
/// amount to `owner` when the account still exists.
pub fn process_withdrawal(
    withdrawal: &mut Withdrawal,
    owner: Option<&mut User>,
    action: WithdrawalAction,
    reason: Option<String>,
) -> ProcessOutcome {
    if withdrawal.status != WithdrawalStatus::Pending {
        return ProcessOutcome::AlreadyProcessed {
            status: withdrawal.status,
        };
    }

    match action {
        WithdrawalAction::Approve => {
            withdrawal.status = WithdrawalStatus::Approved;
            ProcessOutcome::Approved
        }
        WithdrawalAction::Reject => {
            let refunded = match owner {
                Some(owner) => {
                    owner.balance += withdrawal.amount;
                    true
                }
                None => false,
            };
            withdrawal.status = WithdrawalStatus::Rejected;
            withdrawal.rejection_reason = reason;
            ProcessOutcome::Rejected { refunded }
        }
    }
}
