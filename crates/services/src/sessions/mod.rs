mod controller;
mod submissions;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{
    SessionCommand, SessionController, SessionHandle, SessionOutcome, SessionUpdate,
};
pub use submissions::{SubmissionService, SubmissionSummary};
pub use workflow::{ExamWorkflowService, LiveSession};
