use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::models::{settings::GlobalSettings, users::User};

/// Fans committed snapshots out to subscribers. Publishing happens after the
/// store transaction commits, so a receiver never sees uncommitted state.
#[derive(Clone)]
pub struct Notifier {
    users: Arc<DashMap<String, watch::Sender<Option<User>>>>,
    settings: Arc<watch::Sender<GlobalSettings>>,
}

impl Notifier {
    pub fn new(settings: GlobalSettings) -> Self {
        let (settings_tx, _) = watch::channel(settings);

        Notifier {
            users: Arc::new(DashMap::new()),
            settings: Arc::new(settings_tx),
        }
    }

    pub fn publish_user(&self, user: &User) {
        if let Some(sender) = self.users.get(&user.uid) {
            sender.send_replace(Some(user.clone()));
        }
    }

    /// Receiver for one user's record. Empty until seeded or published.
    pub fn subscribe_user(&self, uid: &str) -> watch::Receiver<Option<User>> {
        self.users
            .entry(uid.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Fills an empty channel with a store read. A snapshot published since
    /// the channel was opened is newer than `current` and wins.
    pub fn seed_user(&self, uid: &str, current: Option<User>) {
        let Some(current) = current else {
            return;
        };

        if let Some(sender) = self.users.get(uid) {
            sender.send_if_modified(|value| {
                if value.is_some() {
                    return false;
                }
                *value = Some(current);
                true
            });
        }
    }

    pub fn publish_settings(&self, settings: &GlobalSettings) {
        self.settings.send_replace(settings.clone());
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<GlobalSettings> {
        self.settings.subscribe()
    }

    /// Drops channels nobody listens to any more.
    pub fn prune(&self) {
        self.users.retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn subscriber_sees_published_snapshot() {
        let notifier = Notifier::new(GlobalSettings::default());
        let mut user = User::new("u1", "u1@example.com", "AAA111".into(), false, Utc::now());
        let mut rx = notifier.subscribe_user("u1");
        notifier.seed_user("u1", Some(user.clone()));
        assert_eq!(rx.borrow_and_update().as_ref().map(|u| u.balance), Some(0.0));

        user.balance = 2.5;
        notifier.publish_user(&user);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.balance), Some(2.5));
    }

    #[test]
    fn stale_seed_does_not_replace_a_newer_publish() {
        let notifier = Notifier::new(GlobalSettings::default());
        let mut stale = User::new("u1", "u1@example.com", "AAA111".into(), false, Utc::now());
        stale.balance = 1.0;
        let mut fresh = stale.clone();
        fresh.balance = 2.0;

        let rx = notifier.subscribe_user("u1");
        notifier.publish_user(&fresh);
        notifier.seed_user("u1", Some(stale));

        assert_eq!(rx.borrow().as_ref().map(|u| u.balance), Some(2.0));
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let notifier = Notifier::new(GlobalSettings::default());
        let user = User::new("u1", "u1@example.com", "AAA111".into(), false, Utc::now());

        notifier.publish_user(&user);
        assert!(notifier.users.is_empty());
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let notifier = Notifier::new(GlobalSettings::default());
        let rx = notifier.subscribe_user("u1");
        notifier.prune();
        assert_eq!(notifier.users.len(), 1);

        drop(rx);
        notifier.prune();
        assert!(notifier.users.is_empty());
    }
}
