pub mod admin_logs;
pub mod settings;
pub mod tasks;
pub mod users;
pub mod withdrawals;
