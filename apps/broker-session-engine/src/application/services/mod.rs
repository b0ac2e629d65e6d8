//! Application Services
//!
//! The session manager serves explicit caller operations; the supervisor
//! runs as a background task driving the same manager.

mod session_manager;
mod session_supervisor;

pub use session_manager::{CycleOutcome, SessionManager, SessionManagerConfig};
pub use session_supervisor::{CycleSummary, SessionSupervisor, SupervisorConfig};
