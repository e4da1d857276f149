use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLog {
    pub id: String,
    pub admin_email: String,
    pub admin_uid: String,
    pub action: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}
