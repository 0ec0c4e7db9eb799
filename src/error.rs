use thiserror::Error;

use crate::session::{SessionKey, SessionStatus};

/// Hard failures surfaced to whoever opens a session.
///
/// Policy outcomes (warnings, corruption, time expiry) are never errors; the
/// caller observes them through the controller's status instead.
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("session {key} already ended as {status}; it cannot be replayed")]
    AlreadyTerminal {
        key: SessionKey,
        status: SessionStatus,
    },

    #[error("quiz {0} has no questions")]
    EmptyQuestionSet(String),

    #[error("quiz {0} has no time limit")]
    NoTimeLimit(String),

    #[error("quiz {0} has a time limit too large to track")]
    TimeLimitTooLarge(String),

    #[error("quiz {0} not found")]
    QuizNotFound(String),

    #[error("invalid quiz definition: {0}")]
    InvalidQuiz(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt session payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the submission collaborator. Logged by the controller, never
/// propagated: the local terminal transition stands regardless.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding breakdown: {0}")]
    Codec(#[from] serde_json::Error),
}
