//! The proctored session state machine.
//!
//! ```text
//! NOT_STARTED -> RUNNING     start(), clock waits for full-screen
//! RUNNING     -> PAUSED      first strike
//! PAUSED      -> RUNNING     resume() with full-screen engaged
//! RUNNING     -> SUBMITTED   time expires or candidate finishes
//! PAUSED      -> CORRUPTED   grace expires or threshold reached
//! RUNNING     -> CORRUPTED   threshold reached directly
//! ```
//!
//! The controller is the only writer of [`SessionState`] and of its persisted
//! mirror. Every accepted mutation is written through to the store before the
//! call returns. Once terminal, clocks and listeners are detached in the same
//! call, and anything still queued is dropped by the `listening` guard.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::ProctorError;
use crate::integrity::IntegrityEvent;
use crate::policy::{Outcome, Verdict, ViolationPolicy};
use crate::quiz::{Question, Quiz};
use crate::scoring::{compute_score, AttemptRecord};
use crate::session::{
    CorruptionReason, SessionKey, SessionState, SessionStatus, StoredSession, TerminalMarker,
};
use crate::store::SessionStore;
use crate::submit::AttemptSink;
use crate::timer::{Countdown, TickOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    pub policy: ViolationPolicy,
    pub grace_period_secs: u32,
}

impl SessionRules {
    pub const DEFAULT_GRACE_SECS: u32 = 10;
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            policy: ViolationPolicy::default(),
            grace_period_secs: Self::DEFAULT_GRACE_SECS,
        }
    }
}

impl From<&Settings> for SessionRules {
    fn from(settings: &Settings) -> Self {
        Self {
            policy: ViolationPolicy::new(settings.violation_threshold),
            grace_period_secs: settings.grace_period_secs,
        }
    }
}

/// Why a mutation was dropped. `Stale` covers callbacks that arrive after the
/// session went terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
enum Rejected {
    Stale,
    Paused,
    NotEngaged,
    OutOfRange,
    InvalidAnswer,
}

/// Read-only view for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: SessionStatus,
    pub current_question_index: usize,
    pub question_count: usize,
    pub answered: usize,
    pub exam_time_left_secs: u32,
    pub time_taken_secs: u32,
    pub grace_secs_remaining: u32,
    pub violation_count: u32,
    pub fullscreen: bool,
    pub reason: Option<CorruptionReason>,
}

#[derive(Debug)]
pub struct SessionController<S: SessionStore, K: AttemptSink> {
    quiz: Quiz,
    questions: Vec<Question>,
    state: SessionState,
    rules: SessionRules,
    exam_clock: Countdown,
    grace_clock: Countdown,
    fullscreen: bool,
    listening: bool,
    reason: Option<CorruptionReason>,
    attempt: Option<AttemptRecord>,
    store: S,
    sink: K,
}

impl<S: SessionStore, K: AttemptSink> SessionController<S, K> {
    /// Open a session, restoring a persisted non-terminal one if present.
    pub fn start(
        quiz: Quiz,
        questions: Vec<Question>,
        candidate_id: &str,
        store: S,
        sink: K,
        rules: SessionRules,
    ) -> Result<Self, ProctorError> {
        if questions.is_empty() {
            return Err(ProctorError::EmptyQuestionSet(quiz.id));
        }
        if quiz.time_limit_minutes == 0 {
            return Err(ProctorError::NoTimeLimit(quiz.id));
        }
        let Some(time_limit) = quiz.time_limit_secs() else {
            return Err(ProctorError::TimeLimitTooLarge(quiz.id));
        };

        let key = SessionKey::new(&quiz.id, candidate_id);
        let state = match store.get(&key)? {
            Some(StoredSession::Terminal(marker)) => {
                warn!(session = %key, status = %marker.status, "refusing to replay finished session");
                return Err(ProctorError::AlreadyTerminal {
                    key,
                    status: marker.status,
                });
            }
            Some(StoredSession::Active(state)) if state.status.is_terminal() => {
                warn!(session = %key, status = %state.status, "refusing to replay finished session");
                return Err(ProctorError::AlreadyTerminal {
                    key,
                    status: state.status,
                });
            }
            Some(StoredSession::Active(mut state)) => {
                state.grace_secs_remaining = 0;
                state.current_question_index =
                    state.current_question_index.min(questions.len() - 1);
                info!(
                    session = %key,
                    index = state.current_question_index,
                    answered = state.answers.len(),
                    time_left = state.exam_time_left_secs,
                    violations = state.violation_count,
                    "session restored"
                );
                state
            }
            None => {
                info!(session = %key, time_limit, "session created");
                SessionState::new(&key, time_limit)
            }
        };

        let controller = Self {
            exam_clock: Countdown::new(state.exam_time_left_secs),
            grace_clock: Countdown::default(),
            quiz,
            questions,
            state,
            rules,
            fullscreen: false,
            listening: true,
            reason: None,
            attempt: None,
            store,
            sink,
        };
        controller.persist();
        Ok(controller)
    }

    pub fn key(&self) -> SessionKey {
        self.state.key()
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn current_question_index(&self) -> usize {
        self.state.current_question_index
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.state.current_question_index]
    }

    pub fn answer(&self, index: usize) -> Option<&str> {
        self.state.answers.get(&index).map(String::as_str)
    }

    pub fn exam_time_left_secs(&self) -> u32 {
        self.state.exam_time_left_secs
    }

    pub fn time_taken_secs(&self) -> u32 {
        self.state.time_taken_secs
    }

    pub fn grace_secs_remaining(&self) -> u32 {
        self.state.grace_secs_remaining
    }

    pub fn violation_count(&self) -> u32 {
        self.state.violation_count
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// False once the session is terminal; event sources should stop forwarding.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn corruption_reason(&self) -> Option<CorruptionReason> {
        self.reason
    }

    pub fn attempt(&self) -> Option<&AttemptRecord> {
        self.attempt.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn snapshot(&self) -> SessionView {
        SessionView {
            status: self.state.status,
            current_question_index: self.state.current_question_index,
            question_count: self.questions.len(),
            answered: self.state.answers.len(),
            exam_time_left_secs: self.state.exam_time_left_secs,
            time_taken_secs: self.state.time_taken_secs,
            grace_secs_remaining: self.state.grace_secs_remaining,
            violation_count: self.state.violation_count,
            fullscreen: self.fullscreen,
            reason: self.reason,
        }
    }

    pub fn record_answer(&mut self, index: usize, value: impl Into<String>) -> bool {
        if let Err(why) = self.guard() {
            self.reject("record_answer", why);
            return false;
        }
        let value = value.into();
        let Some(question) = self.questions.get(index) else {
            self.reject("record_answer", Rejected::OutOfRange);
            return false;
        };
        if !question.accepts(&value) {
            self.reject("record_answer", Rejected::InvalidAnswer);
            return false;
        }

        self.state.answers.insert(index, value);
        self.persist();
        true
    }

    /// Move to the next question; past the last one, finish the session.
    pub fn advance(&mut self) -> bool {
        if let Err(why) = self.guard() {
            self.reject("advance", why);
            return false;
        }
        if self.state.current_question_index + 1 < self.questions.len() {
            self.state.current_question_index += 1;
            self.persist();
            true
        } else {
            self.finish(true)
        }
    }

    pub fn retreat(&mut self) -> bool {
        if let Err(why) = self.guard() {
            self.reject("retreat", why);
            return false;
        }
        if self.state.current_question_index == 0 {
            return false;
        }
        self.state.current_question_index -= 1;
        self.persist();
        true
    }

    /// Score and submit. A no-op on a terminal session.
    pub fn finish(&mut self, manual: bool) -> bool {
        if self.state.status.is_terminal() {
            self.reject("finish", Rejected::Stale);
            return false;
        }
        if manual {
            if let Err(why) = self.guard() {
                self.reject("finish", why);
                return false;
            }
        }

        let scorecard = compute_score(&self.questions, &self.state.answers);
        self.state.status = SessionStatus::Submitted;
        self.detach();

        let key = self.key();
        if let Err(e) = self.store.delete(&key) {
            error!(session = %key, error = %e, "failed to clear persisted session");
        }

        info!(
            session = %key,
            manual,
            score = scorecard.score,
            max_score = scorecard.max_score,
            time_taken = self.state.time_taken_secs,
            "session submitted"
        );
        let record = AttemptRecord::submitted(&self.state, scorecard);
        self.deliver(record);
        true
    }

    /// Acknowledge a warning. Only possible with full-screen engaged.
    pub fn resume(&mut self) -> bool {
        if !self.listening {
            self.reject("resume", Rejected::Stale);
            return false;
        }
        if self.state.status != SessionStatus::Paused {
            return false;
        }
        if !self.fullscreen {
            self.reject("resume", Rejected::NotEngaged);
            return false;
        }

        self.state.status = SessionStatus::Running;
        info!(session = %self.key(), violations = self.state.violation_count, "session resumed");
        self.sync_exam_clock();
        self.persist();
        true
    }

    pub fn report_integrity_event(&mut self, event: IntegrityEvent) {
        if !self.listening {
            debug!(session = %self.key(), ?event, "dropping event for finished session");
            return;
        }

        match event {
            IntegrityEvent::FullscreenEngaged => {
                if self.grace_clock.is_active() {
                    info!(
                        session = %self.key(),
                        grace_left = self.grace_clock.remaining(),
                        "fullscreen restored within grace"
                    );
                }
                self.fullscreen = true;
                self.grace_clock.reset();
                self.state.grace_secs_remaining = 0;
            }
            event => {
                if event.loses_fullscreen() {
                    self.fullscreen = false;
                    if !self.grace_clock.is_active() {
                        self.grace_clock.restart(self.rules.grace_period_secs);
                        self.state.grace_secs_remaining = self.rules.grace_period_secs;
                    }
                }
                let verdict = self.rules.policy.assess(self.state.violation_count, event);
                self.apply(verdict);
                self.persist();
            }
        }

        self.sync_exam_clock();
    }

    /// One second elapsed. The exam clock resolves first so an expiring exam
    /// is submitted rather than corrupted.
    pub fn on_tick(&mut self) {
        if !self.listening {
            debug!(session = %self.key(), "dropping tick for finished session");
            return;
        }

        match self.exam_clock.tick() {
            TickOutcome::Idle => {}
            TickOutcome::Running(left) => {
                self.state.exam_time_left_secs = left;
                self.state.time_taken_secs += 1;
                self.persist();
            }
            TickOutcome::Expired => {
                self.state.exam_time_left_secs = 0;
                self.state.time_taken_secs += 1;
                info!(session = %self.key(), "exam time expired");
                self.finish(false);
                return;
            }
        }

        match self.grace_clock.tick() {
            TickOutcome::Idle => {}
            TickOutcome::Running(left) => self.state.grace_secs_remaining = left,
            TickOutcome::Expired => {
                self.state.grace_secs_remaining = 0;
                warn!(session = %self.key(), "fullscreen grace period expired");
                let verdict = self.rules.policy.grace_expired(self.state.violation_count);
                self.apply(verdict);
            }
        }
    }

    fn apply(&mut self, verdict: Verdict) {
        self.state.violation_count = verdict.violation_count;
        match verdict.outcome {
            Outcome::None => {}
            Outcome::Warn => {
                if self.state.status == SessionStatus::Running {
                    self.state.status = SessionStatus::Paused;
                }
                warn!(
                    session = %self.key(),
                    violations = self.state.violation_count,
                    "integrity warning, session paused"
                );
            }
            Outcome::Corrupt(reason) => self.corrupt(reason),
        }
    }

    fn corrupt(&mut self, reason: CorruptionReason) {
        let scorecard = compute_score(&self.questions, &self.state.answers);
        self.state.status = SessionStatus::Corrupted;
        self.reason = Some(reason);
        self.detach();

        let key = self.key();
        let marker = StoredSession::Terminal(TerminalMarker {
            status: SessionStatus::Corrupted,
            violation_count: self.state.violation_count,
            reason: Some(reason),
            ended_at: Utc::now(),
        });
        if let Err(e) = self.store.put(&key, &marker) {
            error!(session = %key, error = %e, "failed to persist terminal marker");
        }

        warn!(
            session = %key,
            %reason,
            violations = self.state.violation_count,
            "session corrupted"
        );
        let record = AttemptRecord::corrupted(&self.state, scorecard, reason);
        self.deliver(record);
    }

    fn detach(&mut self) {
        self.exam_clock.stop();
        self.grace_clock.reset();
        self.state.grace_secs_remaining = 0;
        self.listening = false;
    }

    fn deliver(&mut self, record: AttemptRecord) {
        if let Err(e) = self.sink.submit(&record) {
            warn!(session = %self.key(), error = %e, "attempt submission failed, local outcome stands");
        }
        self.attempt = Some(record);
    }

    fn sync_exam_clock(&mut self) {
        if self.listening && self.fullscreen && self.state.status == SessionStatus::Running {
            self.exam_clock.start();
        } else {
            self.exam_clock.stop();
        }
    }

    fn guard(&self) -> Result<(), Rejected> {
        if !self.listening || self.state.status.is_terminal() {
            Err(Rejected::Stale)
        } else if self.state.status == SessionStatus::Paused {
            Err(Rejected::Paused)
        } else if !self.fullscreen {
            Err(Rejected::NotEngaged)
        } else {
            Ok(())
        }
    }

    fn reject(&self, op: &'static str, why: Rejected) {
        debug!(session = %self.key(), op, %why, "mutation rejected");
    }

    fn persist(&self) {
        if self.state.status.is_terminal() {
            return;
        }
        let key = self.key();
        if let Err(e) = self
            .store
            .put(&key, &StoredSession::Active(self.state.clone()))
        {
            error!(session = %key, error = %e, "failed to persist session");
        }
    }
}
