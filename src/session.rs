use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    /// Waiting on the candidate to acknowledge a warning.
    Paused,
    Corrupted,
    Submitted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Corrupted | SessionStatus::Submitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionReason {
    #[strum(serialize = "fullscreen exit")]
    FullscreenExit,
    #[strum(serialize = "tab switch")]
    TabSwitch,
    #[strum(serialize = "navigation")]
    Navigation,
    #[strum(serialize = "page unload")]
    PageUnload,
}

/// Identity of an attempt; also the persistence key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub quiz_id: String,
    pub candidate_id: String,
}

impl SessionKey {
    pub fn new(quiz_id: impl Into<String>, candidate_id: impl Into<String>) -> Self {
        Self {
            quiz_id: quiz_id.into(),
            candidate_id: candidate_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.quiz_id, self.candidate_id)
    }
}

/// The authoritative record of one exam attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub quiz_id: String,
    pub candidate_id: String,
    pub status: SessionStatus,
    pub current_question_index: usize,
    pub answers: BTreeMap<usize, String>,
    pub violation_count: u32,
    pub exam_time_left_secs: u32,
    pub time_taken_secs: u32,
    /// Grace restarts from "not engaged" on reload, so it is never persisted.
    #[serde(skip)]
    pub grace_secs_remaining: u32,
}

impl SessionState {
    pub fn new(key: &SessionKey, time_limit_secs: u32) -> Self {
        Self {
            quiz_id: key.quiz_id.clone(),
            candidate_id: key.candidate_id.clone(),
            status: SessionStatus::Running,
            current_question_index: 0,
            answers: BTreeMap::new(),
            violation_count: 0,
            exam_time_left_secs: time_limit_secs,
            time_taken_secs: 0,
            grace_secs_remaining: 0,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.quiz_id, &self.candidate_id)
    }
}

/// What remains in storage once a session is corrupted: enough to block a
/// replay and to explain why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalMarker {
    pub status: SessionStatus,
    pub violation_count: u32,
    pub reason: Option<CorruptionReason>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredSession {
    Active(SessionState),
    Terminal(TerminalMarker),
}

impl StoredSession {
    pub fn status(&self) -> SessionStatus {
        match self {
            StoredSession::Active(state) => state.status,
            StoredSession::Terminal(marker) => marker.status,
        }
    }
}
