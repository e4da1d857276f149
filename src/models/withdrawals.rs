use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalMethod {
    PayPal,
    Crypto,
    GiftCard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalAction {
    Approve,
    Reject,
}

impl std::fmt::Display for WithdrawalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalAction::Approve => write!(f, "APPROVE"),
            WithdrawalAction::Reject => write!(f, "REJECT"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    pub amount: f64,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub amount: f64,
    pub method: WithdrawalMethod,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProcessWithdrawal {
    pub action: WithdrawalAction,
    pub reason: Option<String>,
}
