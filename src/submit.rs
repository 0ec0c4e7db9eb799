use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::SubmissionError;
use crate::scoring::AttemptRecord;
use crate::session::SessionKey;

/// Receiver of finalized attempts. Called once per session; failures are the
/// sink's concern and never reverse the session outcome.
pub trait AttemptSink {
    fn submit(&self, record: &AttemptRecord) -> Result<(), SubmissionError>;
}

/// Fan out to several sinks. Every sink is tried; the first failure is returned.
impl AttemptSink for Vec<Box<dyn AttemptSink>> {
    fn submit(&self, record: &AttemptRecord) -> Result<(), SubmissionError> {
        let mut first_err = None;
        for sink in self {
            if let Err(e) = sink.submit(record) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Attempt history kept next to the session store.
#[derive(Debug)]
pub struct SqliteAttemptLedger {
    conn: Connection,
}

impl SqliteAttemptLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SubmissionError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SubmissionError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, SubmissionError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                quiz_id TEXT NOT NULL,
                candidate_id TEXT NOT NULL,
                status TEXT NOT NULL,
                score INTEGER NOT NULL,
                max_score INTEGER NOT NULL,
                violation_count INTEGER NOT NULL,
                record TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attempts_key ON attempts(quiz_id, candidate_id)",
            [],
        )?;

        Ok(Self { conn })
    }

    pub fn has_attempt(&self, key: &SessionKey) -> Result<bool, SubmissionError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE quiz_id = ?1 AND candidate_id = ?2",
            params![key.quiz_id, key.candidate_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn latest(&self, key: &SessionKey) -> Result<Option<AttemptRecord>, SubmissionError> {
        let json: Option<String> = self
            .conn
            .query_row(
                r#"
                SELECT record FROM attempts
                WHERE quiz_id = ?1 AND candidate_id = ?2
                ORDER BY id DESC
                LIMIT 1
                "#,
                params![key.quiz_id, key.candidate_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl AttemptSink for SqliteAttemptLedger {
    fn submit(&self, record: &AttemptRecord) -> Result<(), SubmissionError> {
        self.conn.execute(
            r#"
            INSERT INTO attempts
            (quiz_id, candidate_id, status, score, max_score, violation_count, record, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.quiz_id,
                record.candidate_id,
                record.status.to_string(),
                record.score,
                record.max_score,
                record.violation_count,
                serde_json::to_string(record)?,
                record.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    finished_at: String,
    quiz_id: &'a str,
    candidate_id: &'a str,
    status: String,
    score: u32,
    max_score: u32,
    correct_count: u32,
    time_taken_secs: u32,
    violation_count: u32,
    reason: String,
}

/// Append-only CSV log of attempts.
#[derive(Debug, Clone)]
pub struct CsvAttemptLog {
    path: PathBuf,
}

impl CsvAttemptLog {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl AttemptSink for CsvAttemptLog {
    fn submit(&self, record: &AttemptRecord) -> Result<(), SubmissionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // If the log doesn't exist yet, we need to emit a header
        let needs_header = !self.path.exists();

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        writer.serialize(CsvRow {
            finished_at: record.finished_at.to_rfc3339(),
            quiz_id: &record.quiz_id,
            candidate_id: &record.candidate_id,
            status: record.status.to_string(),
            score: record.score,
            max_score: record.max_score,
            correct_count: record.correct_count,
            time_taken_secs: record.time_taken_secs,
            violation_count: record.violation_count,
            reason: record.reason.map(|r| r.to_string()).unwrap_or_default(),
        })?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps submitted records in memory. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<AttemptRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.borrow().clone()
    }
}

impl AttemptSink for RecordingSink {
    fn submit(&self, record: &AttemptRecord) -> Result<(), SubmissionError> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }
}
