//! Session domain errors.

use thiserror::Error;

use super::services::SessionTrigger;
use super::value_objects::{AccountStatus, SessionKey};

/// Errors raised by session invariants and session operations.
///
/// Broker failures are not errors here: adapters fold them into envelopes
/// carrying an `ErrorKind`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session exists for the key.
    #[error("Session not found: {key}")]
    NotFound {
        /// Session key.
        key: SessionKey,
    },

    /// A status change not allowed by the session state machine.
    #[error("Invalid session transition on {trigger}: {} -> {to}: {reason}", status_label(.from))]
    InvalidTransition {
        /// Status before the trigger, `None` when no session exists.
        from: Option<AccountStatus>,
        /// Trigger that proposed the change.
        trigger: SessionTrigger,
        /// Proposed status.
        to: AccountStatus,
        /// Why the transition was rejected.
        reason: String,
    },

    /// The broker name is not usable.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The session was disconnected while the operation was running.
    #[error("Operation cancelled for session {key}")]
    Cancelled {
        /// Session key.
        key: SessionKey,
    },
}

/// Broker registry configuration errors. These are not broker `ErrorKind`s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No plugin registered under the name.
    #[error("Broker plugin not found: {name}")]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// A plugin with the same name is already registered.
    #[error("Broker plugin already registered: {name}")]
    DuplicatePlugin {
        /// Conflicting name.
        name: String,
    },

    /// A declared dependency is not registered.
    #[error("Broker plugin {name} depends on unregistered plugin {dependency}")]
    MissingDependency {
        /// Plugin being registered.
        name: String,
        /// Missing dependency.
        dependency: String,
    },

    /// Other plugins still depend on the plugin.
    #[error("Broker plugin {name} is required by {dependents:?}")]
    InUse {
        /// Plugin being unregistered.
        name: String,
        /// Plugins depending on it.
        dependents: Vec<String>,
    },
}

fn status_label(status: &Option<AccountStatus>) -> &'static str {
    status.as_ref().map_or("ABSENT", AccountStatus::as_str)
}
