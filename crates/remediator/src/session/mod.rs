//! Incident sessions: lifecycle phases, state machine, and status registry.

mod orchestrator;
mod phase;
mod registry;
mod summary;
mod types;

pub use orchestrator::{Collaborators, Orchestrator, Session, SessionSettings};
pub use phase::Phase;
pub use registry::{SessionRegistry, SessionSummary};
pub use summary::{render_failure_summary, FailureSummaryData};
pub use types::{ExecutedCommand, FailureKind, FailureRecord, Incident, Outcome, Report};
