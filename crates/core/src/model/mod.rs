mod category;
mod ids;
mod paper;
mod question;
mod submission;

pub use category::Category;
pub use ids::{ParseIdError, QuestionId, TestId};
pub use paper::{PaperError, QuestionItem, TestPaper, flatten_items};
pub use question::{MIN_OPTIONS, Question, QuestionError};
pub use submission::{SubmitReason, Submission};
