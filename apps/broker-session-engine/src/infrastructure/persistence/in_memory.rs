//! In-memory session store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::domain::session::{
    Session, SessionChange, SessionKey, SessionRepository, SessionUpdate, UpdateOutcome,
};
use crate::domain::shared::UserId;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// In-memory implementation of `SessionRepository`.
///
/// The only owner of session state in the process. Reads clone snapshots and
/// never block on broker I/O.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    next_epoch: AtomicU64,
    changes: broadcast::Sender<SessionChange>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
            changes,
        }
    }

    /// Number of sessions in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn publish(&self, change: SessionChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

impl SessionRepository for InMemorySessionStore {
    fn establish(&self, session: Session) -> Session {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let session = session.with_epoch(epoch);
        {
            let mut sessions = self.sessions.write();
            sessions.insert(session.key().clone(), session.clone());
        }
        self.publish(SessionChange::Established {
            key: session.key().clone(),
            status: session.status(),
            epoch,
            occurred_at: Utc::now(),
        });
        session
    }

    fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.read().get(key).cloned()
    }

    fn update_if_current(
        &self,
        key: &SessionKey,
        epoch: u64,
        update: SessionUpdate<'_>,
    ) -> UpdateOutcome {
        let (before, after, trigger) = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(key) else {
                return UpdateOutcome::Stale;
            };
            if session.epoch() != epoch {
                return UpdateOutcome::Stale;
            }
            let before = session.status();
            let trigger = update(session);
            (before, session.clone(), trigger)
        };

        if let Some(trigger) = trigger
            && before != after.status()
        {
            self.publish(SessionChange::StatusChanged {
                key: key.clone(),
                from: before,
                to: after.status(),
                trigger,
                occurred_at: Utc::now(),
            });
        }
        UpdateOutcome::Applied(after)
    }

    fn update_and_fence(&self, key: &SessionKey, update: SessionUpdate<'_>) -> Option<Session> {
        let (before, after, trigger) = {
            let mut sessions = self.sessions.write();
            let session = sessions.get_mut(key)?;
            let before = session.status();
            let trigger = update(session);
            let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
            *session = session.clone().with_epoch(epoch);
            (before, session.clone(), trigger)
        };

        if let Some(trigger) = trigger
            && before != after.status()
        {
            self.publish(SessionChange::StatusChanged {
                key: key.clone(),
                from: before,
                to: after.status(),
                trigger,
                occurred_at: Utc::now(),
            });
        }
        Some(after)
    }

    fn remove(&self, key: &SessionKey) -> Option<Session> {
        let removed = self.sessions.write().remove(key);
        if removed.is_some() {
            self.publish(SessionChange::Removed {
                key: key.clone(),
                occurred_at: Utc::now(),
            });
        }
        removed
    }

    fn list(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    fn list_for_user(&self, user_id: &UserId) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .filter(|s| &s.key().user_id == user_id)
            .cloned()
            .collect()
    }

    fn supervised_keys(&self) -> Vec<SessionKey> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.status().is_supervised())
            .map(|s| s.key().clone())
            .collect()
    }

    fn purge_inactive(&self, retention: Duration, now: DateTime<Utc>) -> Vec<SessionKey> {
        let purged: Vec<SessionKey> = {
            let mut sessions = self.sessions.write();
            let expired: Vec<SessionKey> = sessions
                .values()
                .filter(|s| s.is_expired_inactive(retention, now))
                .map(|s| s.key().clone())
                .collect();
            for key in &expired {
                sessions.remove(key);
            }
            expired
        };

        for key in &purged {
            tracing::debug!(session = %key, "Purged inactive session");
            self.publish(SessionChange::Removed {
                key: key.clone(),
                occurred_at: now,
            });
        }
        purged
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
