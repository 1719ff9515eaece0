#![forbid(unsafe_code)]

pub mod error;
pub mod platform;
pub mod sessions;

pub use proctor_core::Clock;

pub use error::SessionError;
pub use platform::{BroadcastPlatform, PlatformEvents, Subscription};
pub use sessions::{
    ExamWorkflowService, LiveSession, SessionCommand, SessionController, SessionHandle,
    SessionOutcome, SessionUpdate, SubmissionService, SubmissionSummary,
};
