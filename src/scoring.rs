use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::quiz::Question;
use crate::session::{CorruptionReason, SessionState, SessionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBreakdown {
    pub question_id: String,
    pub answer: Option<String>,
    pub correct: bool,
    pub marks_awarded: u32,
    pub marks_available: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub score: u32,
    pub max_score: u32,
    pub correct_count: u32,
    pub breakdown: Vec<AnswerBreakdown>,
}

/// Marks for exact matches, zero otherwise. Unanswered questions are not penalized.
pub fn compute_score(questions: &[Question], answers: &BTreeMap<usize, String>) -> Scorecard {
    let breakdown: Vec<AnswerBreakdown> = questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let answer = answers.get(&idx).cloned();
            let correct = answer.as_deref() == Some(q.answer.as_str());
            AnswerBreakdown {
                question_id: q.id.clone(),
                answer,
                correct,
                marks_awarded: if correct { q.marks } else { 0 },
                marks_available: q.marks,
            }
        })
        .collect();

    Scorecard {
        score: breakdown.iter().map(|b| b.marks_awarded).sum(),
        max_score: breakdown.iter().map(|b| b.marks_available).sum(),
        correct_count: breakdown.iter().filter(|b| b.correct).count() as u32,
        breakdown,
    }
}

/// The finalized, immutable outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub candidate_id: String,
    pub quiz_id: String,
    pub score: u32,
    pub max_score: u32,
    pub correct_count: u32,
    pub breakdown: Vec<AnswerBreakdown>,
    pub time_taken_secs: u32,
    pub violation_count: u32,
    pub status: SessionStatus,
    pub reason: Option<CorruptionReason>,
    pub finished_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn submitted(state: &SessionState, scorecard: Scorecard) -> Self {
        Self {
            candidate_id: state.candidate_id.clone(),
            quiz_id: state.quiz_id.clone(),
            score: scorecard.score,
            max_score: scorecard.max_score,
            correct_count: scorecard.correct_count,
            breakdown: scorecard.breakdown,
            time_taken_secs: state.time_taken_secs,
            violation_count: state.violation_count,
            status: SessionStatus::Submitted,
            reason: None,
            finished_at: Utc::now(),
        }
    }

    /// Corruption forfeits all credit; the recorded answers are kept for review.
    pub fn corrupted(state: &SessionState, scorecard: Scorecard, reason: CorruptionReason) -> Self {
        let breakdown = scorecard
            .breakdown
            .into_iter()
            .map(|b| AnswerBreakdown {
                correct: false,
                marks_awarded: 0,
                ..b
            })
            .collect();

        Self {
            candidate_id: state.candidate_id.clone(),
            quiz_id: state.quiz_id.clone(),
            score: 0,
            max_score: scorecard.max_score,
            correct_count: 0,
            breakdown,
            time_taken_secs: state.time_taken_secs,
            violation_count: state.violation_count,
            status: SessionStatus::Corrupted,
            reason: Some(reason),
            finished_at: Utc::now(),
        }
    }
}
