#![forbid(unsafe_code)]

pub mod answers;
pub mod error;
pub mod model;
pub mod navigator;
pub mod session;
pub mod time;
pub mod timer;
pub mod violation;

pub use error::Error;
pub use session::{ExamSession, Phase, SessionEvent, SessionInput, SessionSnapshot};
pub use time::Clock;
