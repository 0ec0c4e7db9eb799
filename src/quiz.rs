use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProctorError;

static QUIZ_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/quizzes");

/// A single question as handed to the session. Read-only to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Empty for free-response questions.
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default = "default_marks")]
    pub marks: u32,
}

fn default_marks() -> u32 {
    1
}

impl Question {
    pub fn is_free_response(&self) -> bool {
        self.options.is_empty()
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.is_free_response() || self.options.iter().any(|o| o == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub time_limit_minutes: u32,
}

impl Quiz {
    /// `None` when the limit does not fit in seconds.
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_minutes.checked_mul(60)
    }
}

/// On-disk layout of a quiz: metadata plus its ordered question set.
#[derive(Debug, Clone, Deserialize)]
struct QuizFile {
    #[serde(flatten)]
    quiz: Quiz,
    questions: Vec<Question>,
}

/// Source of quizzes and their finalized question sets. Selection and
/// shuffling happen behind this boundary; the session takes the list as-is.
pub trait QuestionBank {
    fn quiz(&self, quiz_id: &str) -> Result<Quiz, ProctorError>;
    fn questions_for_quiz(&self, quiz_id: &str) -> Result<Vec<Question>, ProctorError>;
}

/// Quizzes compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoBank;

impl DemoBank {
    pub fn names() -> Vec<String> {
        let mut names: Vec<String> = QUIZ_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn load(&self, quiz_id: &str) -> Result<QuizFile, ProctorError> {
        let file = QUIZ_DIR
            .get_file(format!("{}.json", quiz_id))
            .ok_or_else(|| ProctorError::QuizNotFound(quiz_id.to_string()))?;
        let contents = file
            .contents_utf8()
            .ok_or_else(|| ProctorError::QuizNotFound(quiz_id.to_string()))?;
        Ok(serde_json::from_str(contents)?)
    }
}

impl QuestionBank for DemoBank {
    fn quiz(&self, quiz_id: &str) -> Result<Quiz, ProctorError> {
        Ok(self.load(quiz_id)?.quiz)
    }

    fn questions_for_quiz(&self, quiz_id: &str) -> Result<Vec<Question>, ProctorError> {
        Ok(self.load(quiz_id)?.questions)
    }
}

/// A single quiz stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileBank {
    path: PathBuf,
}

impl FileBank {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    fn load(&self, quiz_id: &str) -> Result<QuizFile, ProctorError> {
        let bytes = fs::read(&self.path)?;
        let file: QuizFile = serde_json::from_slice(&bytes)?;
        if file.quiz.id != quiz_id {
            return Err(ProctorError::QuizNotFound(quiz_id.to_string()));
        }
        Ok(file)
    }

    /// Id of the quiz the file holds.
    pub fn quiz_id(&self) -> Result<String, ProctorError> {
        let bytes = fs::read(&self.path)?;
        let file: QuizFile = serde_json::from_slice(&bytes)?;
        Ok(file.quiz.id)
    }
}

impl QuestionBank for FileBank {
    fn quiz(&self, quiz_id: &str) -> Result<Quiz, ProctorError> {
        Ok(self.load(quiz_id)?.quiz)
    }

    fn questions_for_quiz(&self, quiz_id: &str) -> Result<Vec<Question>, ProctorError> {
        Ok(self.load(quiz_id)?.questions)
    }
}
