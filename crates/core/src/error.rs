use thiserror::Error;

use crate::model::{PaperError, QuestionError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Paper(#[from] PaperError),
}
