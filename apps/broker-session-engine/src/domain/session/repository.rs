//! Session Repository Trait
//!
//! Storage abstraction owning every live `Session`. Implementations must make
//! `update_if_current` atomic with respect to `establish` and `remove` so a
//! result computed against an old epoch is never written over a newer
//! session.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;

use super::aggregate::Session;
use super::events::SessionChange;
use super::services::SessionTrigger;
use super::value_objects::{AccountStatus, SessionKey};
use crate::domain::shared::UserId;

/// Mutation applied by [`SessionRepository::update_if_current`].
///
/// Returns the trigger of the status change it performed, if any, so the
/// repository can publish a `StatusChanged` event.
pub type SessionUpdate<'a> = &'a mut dyn FnMut(&mut Session) -> Option<SessionTrigger>;

/// Outcome of a check-then-write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update ran; carries the session after the write.
    Applied(Session),
    /// The session was replaced or removed since the epoch was read.
    Stale,
}

/// Repository for live sessions.
pub trait SessionRepository: Send + Sync {
    /// Insert or replace the session for its key under a fresh epoch.
    ///
    /// Returns the stored session.
    fn establish(&self, session: Session) -> Session;

    /// Snapshot of one session.
    fn get(&self, key: &SessionKey) -> Option<Session>;

    /// Apply `update` only if the stored session still has `epoch`.
    fn update_if_current(&self, key: &SessionKey, epoch: u64, update: SessionUpdate<'_>)
    -> UpdateOutcome;

    /// Apply `update` regardless of epoch, then move the session to a fresh
    /// epoch so results computed against the old one become stale.
    fn update_and_fence(&self, key: &SessionKey, update: SessionUpdate<'_>) -> Option<Session>;

    /// Remove a session, returning it.
    fn remove(&self, key: &SessionKey) -> Option<Session>;

    /// Snapshot of every session.
    fn list(&self) -> Vec<Session>;

    /// Snapshot of one user's sessions.
    fn list_for_user(&self, user_id: &UserId) -> Vec<Session>;

    /// Keys whose status is supervised by the health supervisor.
    fn supervised_keys(&self) -> Vec<SessionKey>;

    /// Remove sessions INACTIVE for longer than `retention`.
    fn purge_inactive(&self, retention: Duration, now: DateTime<Utc>) -> Vec<SessionKey>;

    /// Count of sessions with `status`.
    fn count_by_status(&self, status: AccountStatus) -> usize {
        self.list().iter().filter(|s| s.status() == status).count()
    }

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}
