//! Decision pipeline for PMO actions.
//!
//! Registers proposals, records human or policy decisions against them,
//! dispatches approved decisions to pluggable action handlers exactly once,
//! and serves the organization-scoped audit trail.

pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod proposals;
pub mod recorder;
pub mod types;

pub use audit::AuditTrail;
pub use dispatcher::ExecutionDispatcher;
pub use error::{ActionError, DecisionError};
pub use events::EventSink;
pub use handler::{ActionHandler, ActionRegistry};
pub use proposals::ProposalIntake;
pub use recorder::DecisionRecorder;
pub use types::{
    ActionPayload, ActionResult, DecisionFilters, DecisionRequest, ExecutionOutcome,
    HandlerContext, NewProposal, RecordedDecision,
};
