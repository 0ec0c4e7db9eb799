use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use quizguard::{
    app_dirs::AppDirs,
    config::{FileSettingsStore, Settings, SettingsStore},
    controller::{SessionController, SessionRules, SessionView},
    error::ProctorError,
    quiz::{DemoBank, FileBank, Question, QuestionBank, Quiz},
    runtime::{CrosstermEventSource, ExamEvent, ExamEventSource, FixedTicker, Runner, ScreenRequirement},
    scoring::AttemptRecord,
    session::{SessionKey, SessionStatus},
    store::{SessionStore, SqliteSessionStore},
    submit::{AttemptSink, CsvAttemptLog, SqliteAttemptLedger},
    ui::{format_clock, ExamScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::{Path, PathBuf},
};
use tracing::info;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::EnvFilter;

/// proctored quiz sessions in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs a timed quiz under integrity monitoring. Leaving the full-size terminal, losing focus or trying to suspend counts against you; progress is saved continuously and resumes on relaunch."
)]
pub struct Cli {
    /// quiz to take: a JSON file or the name of a bundled demo
    #[clap(short = 'q', long, default_value = "rust-basics")]
    quiz: String,

    /// candidate identifier (defaults to $USER)
    #[clap(short = 'c', long)]
    candidate: Option<String>,

    /// strikes before the session is terminated
    #[clap(long)]
    threshold: Option<u32>,

    /// seconds allowed to restore the full-size terminal
    #[clap(long)]
    grace_secs: Option<u32>,

    /// also append finished attempts to this CSV file
    #[clap(long)]
    csv_log: Option<PathBuf>,

    /// session database (defaults to the app state dir)
    #[clap(long)]
    db: Option<PathBuf>,

    /// log filter, e.g. `debug` or `quizguard=trace`
    #[clap(long)]
    log_level: Option<String>,

    /// print the bundled demo quizzes and exit
    #[clap(long)]
    list_demos: bool,
}

impl Cli {
    fn candidate_id(&self) -> String {
        self.candidate
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "candidate".to_string())
    }

    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(threshold) = self.threshold {
            settings.violation_threshold = threshold;
        }
        if let Some(grace) = self.grace_secs {
            settings.grace_period_secs = grace;
        }
    }
}

/// Binary-side state layered over the controller: the option cursor and the
/// free-response draft for the question on screen.
pub struct App<S: SessionStore, K: AttemptSink> {
    pub controller: SessionController<S, K>,
    pub selected: usize,
    pub draft: String,
    shown_index: Option<usize>,
    screen: ScreenRequirement,
}

impl<S: SessionStore, K: AttemptSink> App<S, K> {
    pub fn new(controller: SessionController<S, K>, screen: ScreenRequirement) -> Self {
        let mut app = Self {
            controller,
            selected: 0,
            draft: String::new(),
            shown_index: None,
            screen,
        };
        app.sync_cursor();
        app
    }

    /// Reset the cursor and draft when the controller moved to another question.
    fn sync_cursor(&mut self) {
        let index = self.controller.current_question_index();
        if self.shown_index == Some(index) {
            return;
        }
        self.shown_index = Some(index);

        let question = self.controller.current_question();
        let recorded = self.controller.answer(index);
        if question.is_free_response() {
            self.selected = 0;
            self.draft = recorded.unwrap_or_default().to_string();
        } else {
            self.selected = recorded
                .and_then(|r| question.options.iter().position(|o| o == r))
                .unwrap_or(0);
            self.draft.clear();
        }
    }

    pub fn screen<'a>(&'a self, view: &'a SessionView) -> ExamScreen<'a> {
        let index = self.controller.current_question_index();
        ExamScreen {
            title: &self.controller.quiz().title,
            view,
            question: self.controller.current_question(),
            recorded: self.controller.answer(index),
            selected: self.selected,
            draft: &self.draft,
            attempt: self.controller.attempt(),
            screen: self.screen,
        }
    }

    /// Apply one runner event. Returns `true` when the program should exit.
    pub fn handle(&mut self, event: ExamEvent) -> bool {
        let exit = match event {
            ExamEvent::Tick => {
                self.controller.on_tick();
                false
            }
            ExamEvent::Integrity(ev) => {
                self.controller.report_integrity_event(ev);
                false
            }
            ExamEvent::Key(key) => self.on_key(key),
            ExamEvent::Quit => true,
        };
        self.sync_cursor();
        exit
    }

    fn on_key(&mut self, key: KeyEvent) -> bool {
        let status = self.controller.status();
        if status.is_terminal() {
            return matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')
            );
        }
        if status == SessionStatus::Paused {
            if key.code == KeyCode::Enter {
                self.controller.resume();
            }
            return false;
        }

        let index = self.controller.current_question_index();
        let question = self.controller.current_question();
        let free_response = question.is_free_response();
        let options = question.options.clone();
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::F(10) => {
                self.controller.finish(true);
            }
            KeyCode::Char('s') if ctrl => {
                self.controller.finish(true);
            }
            KeyCode::Right | KeyCode::Tab => {
                self.controller.advance();
            }
            KeyCode::Left | KeyCode::BackTab => {
                self.controller.retreat();
            }
            KeyCode::Enter if free_response => {
                let value = self.draft.trim().to_string();
                if !value.is_empty() {
                    self.controller.record_answer(index, value);
                }
            }
            KeyCode::Enter => {
                if let Some(option) = options.get(self.selected).cloned() {
                    self.controller.record_answer(index, option);
                }
            }
            KeyCode::Backspace if free_response => {
                self.draft.pop();
            }
            KeyCode::Char(c) if free_response && !ctrl => self.draft.push(c),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down if self.selected + 1 < options.len() => self.selected += 1,
            KeyCode::Char(c) if c.is_ascii_digit() => {
                let n = c.to_digit(10).unwrap_or(0) as usize;
                if n >= 1 && n <= options.len() {
                    self.selected = n - 1;
                }
            }
            _ => {}
        }
        false
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.list_demos {
        for name in DemoBank::names() {
            println!("{name}");
        }
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _log_guard = init_tracing(cli.log_level.as_deref());

    let mut settings = FileSettingsStore::new().load();
    cli.apply_overrides(&mut settings);

    let (quiz, questions) = match load_quiz(&cli.quiz) {
        Ok(loaded) => loaded,
        Err(e) => {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, format!("cannot load quiz: {e}"))
                .exit();
        }
    };

    let candidate = cli.candidate_id();
    let key = SessionKey::new(&quiz.id, &candidate);
    let db_path = cli
        .db
        .clone()
        .or_else(AppDirs::db_path)
        .unwrap_or_else(|| PathBuf::from("sessions.db"));

    let ledger = SqliteAttemptLedger::open(&db_path)?;
    if ledger.has_attempt(&key)? {
        if let Some(record) = ledger.latest(&key)? {
            print_summary(&record);
        }
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::InvalidValue,
            format!("{key} has already been attempted"),
        )
        .exit();
    }

    let mut sinks: Vec<Box<dyn AttemptSink>> = vec![Box::new(ledger)];
    if let Some(path) = &cli.csv_log {
        sinks.push(Box::new(CsvAttemptLog::with_path(path)));
    }

    let store = SqliteSessionStore::open(&db_path)?;
    let controller = match SessionController::start(
        quiz,
        questions,
        &candidate,
        store,
        sinks,
        SessionRules::from(&settings),
    ) {
        Ok(controller) => controller,
        Err(ProctorError::AlreadyTerminal { key, status }) => {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::InvalidValue,
                format!("{key} already ended ({status})"),
            )
            .exit();
        }
        Err(e) => return Err(e.into()),
    };

    let screen = ScreenRequirement {
        min_width: settings.min_width,
        min_height: settings.min_height,
    };
    let mut app = App::new(controller, screen);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut runner = Runner::new(
        CrosstermEventSource::new(screen),
        FixedTicker::new(settings.tick_interval()),
        settings.debounce(),
    );
    let result = run_exam(&mut terminal, &mut app, &mut runner);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    result?;

    match (app.controller.status(), app.controller.attempt()) {
        (_, Some(record)) => print_summary(record),
        (status, None) => {
            info!(session = %app.controller.key(), %status, "leaving with session saved");
            println!(
                "session saved with {} left; run again to resume",
                format_clock(app.controller.exam_time_left_secs())
            );
        }
    }

    Ok(())
}

fn run_exam<B: Backend, S: SessionStore, K: AttemptSink, E: ExamEventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S, K>,
    runner: &mut Runner<E>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| {
            let view = app.controller.snapshot();
            let screen = app.screen(&view);
            f.render_widget(&screen, f.area());
        })?;

        if app.handle(runner.step()) {
            return Ok(());
        }
    }
}

fn load_quiz(name: &str) -> Result<(Quiz, Vec<Question>), ProctorError> {
    let path = Path::new(name);
    if path.is_file() {
        let bank = FileBank::with_path(path);
        let id = bank.quiz_id()?;
        Ok((bank.quiz(&id)?, bank.questions_for_quiz(&id)?))
    } else {
        Ok((DemoBank.quiz(name)?, DemoBank.questions_for_quiz(name)?))
    }
}

/// Route logs to a daily file; the TUI owns stdout.
fn init_tracing(level: Option<&str>) -> Option<WorkerGuard> {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("quizguard")
        .filename_suffix("log")
        .build(AppDirs::log_dir()?)
        .ok()?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn print_summary(record: &AttemptRecord) {
    println!("{} / {}: {}", record.quiz_id, record.candidate_id, record.status);
    match record.reason {
        Some(reason) => println!("terminated for {reason}, score 0/{}", record.max_score),
        None => println!(
            "score {}/{}   {} correct   {} taken",
            record.score,
            record.max_score,
            record.correct_count,
            format_clock(record.time_taken_secs)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use quizguard::integrity::IntegrityEvent;
    use quizguard::policy::Breach;
    use quizguard::store::MemorySessionStore;
    use quizguard::submit::RecordingSink;

    const SCREEN: ScreenRequirement = ScreenRequirement {
        min_width: 80,
        min_height: 24,
    };

    fn key(code: KeyCode) -> ExamEvent {
        ExamEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app(quiz_id: &str) -> App<MemorySessionStore, RecordingSink> {
        let controller = SessionController::start(
            DemoBank.quiz(quiz_id).unwrap(),
            DemoBank.questions_for_quiz(quiz_id).unwrap(),
            "alice",
            MemorySessionStore::new(),
            RecordingSink::new(),
            SessionRules::default(),
        )
        .unwrap();
        let mut app = App::new(controller, SCREEN);
        app.handle(ExamEvent::Integrity(IntegrityEvent::FullscreenEngaged));
        app
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["quizguard"]);

        assert_eq!(cli.quiz, "rust-basics");
        assert_eq!(cli.candidate, None);
        assert_eq!(cli.threshold, None);
        assert_eq!(cli.grace_secs, None);
        assert_eq!(cli.csv_log, None);
        assert_eq!(cli.db, None);
        assert!(!cli.list_demos);
    }

    #[test]
    fn test_cli_quiz_and_candidate() {
        let cli = Cli::parse_from(["quizguard", "-q", "networking", "-c", "bob"]);
        assert_eq!(cli.quiz, "networking");
        assert_eq!(cli.candidate_id(), "bob");

        let cli = Cli::parse_from(["quizguard", "--quiz", "exam.json", "--candidate", "carol"]);
        assert_eq!(cli.quiz, "exam.json");
        assert_eq!(cli.candidate_id(), "carol");
    }

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::parse_from(["quizguard", "--threshold", "3", "--grace-secs", "30"]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.violation_threshold, 3);
        assert_eq!(settings.grace_period_secs, 30);
        assert_eq!(settings.debounce_ms, Settings::default().debounce_ms);
    }

    #[test]
    fn test_cli_paths() {
        let cli = Cli::parse_from([
            "quizguard",
            "--db",
            "/tmp/s.db",
            "--csv-log",
            "/tmp/a.csv",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/s.db")));
        assert_eq!(cli.csv_log, Some(PathBuf::from("/tmp/a.csv")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_invalid_threshold() {
        assert!(Cli::try_parse_from(["quizguard", "--threshold", "two"]).is_err());
    }

    #[test]
    fn load_quiz_reads_demo_and_file() {
        let (quiz, questions) = load_quiz("networking").unwrap();
        assert_eq!(quiz.id, "networking");
        assert_eq!(questions.len(), 3);

        assert!(matches!(
            load_quiz("no-such-quiz"),
            Err(ProctorError::QuizNotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            r#"{"id":"custom","title":"Custom","time_limit_minutes":1,
                "questions":[{"id":"c1","prompt":"2+2?","answer":"4"}]}"#,
        )
        .unwrap();
        let (quiz, questions) = load_quiz(path.to_str().unwrap()).unwrap();
        assert_eq!(quiz.id, "custom");
        assert!(questions[0].is_free_response());
    }

    #[test]
    fn keys_select_and_record_options() {
        let mut app = app("networking");
        app.handle(key(KeyCode::Down));
        app.handle(key(KeyCode::Enter));
        assert_eq!(app.controller.answer(0), Some("TCP"));

        app.handle(key(KeyCode::Right));
        assert_eq!(app.controller.current_question_index(), 1);
        assert_eq!(app.selected, 0);

        app.handle(key(KeyCode::Char('2')));
        app.handle(key(KeyCode::Enter));
        assert_eq!(app.controller.answer(1), Some("443"));

        app.handle(key(KeyCode::Left));
        assert_eq!(app.selected, 1, "cursor returns to the saved option");
    }

    #[test]
    fn free_response_uses_the_draft() {
        let mut app = app("rust-basics");
        let last = app.controller.questions().len() - 1;
        for _ in 0..last {
            app.handle(key(KeyCode::Tab));
        }
        assert!(app.controller.current_question().is_free_response());

        for c in "cargox".chars() {
            app.handle(key(KeyCode::Char(c)));
        }
        app.handle(key(KeyCode::Backspace));
        app.handle(key(KeyCode::Enter));
        assert_eq!(app.controller.answer(last), Some("cargo"));
    }

    #[test]
    fn f10_submits_and_escape_leaves() {
        let mut app = app("networking");
        app.handle(key(KeyCode::Enter));
        assert!(!app.handle(key(KeyCode::F(10))));
        assert_eq!(app.controller.status(), SessionStatus::Submitted);
        assert_eq!(app.controller.sink().records().len(), 1);

        assert!(!app.handle(key(KeyCode::Right)));
        assert!(app.handle(key(KeyCode::Esc)));
    }

    #[test]
    fn enter_acknowledges_a_warning() {
        let mut app = app("networking");
        app.handle(ExamEvent::Integrity(IntegrityEvent::Breach(Breach::TabSwitch)));
        assert_eq!(app.controller.status(), SessionStatus::Paused);

        app.handle(key(KeyCode::Down));
        assert_eq!(app.selected, 0, "keys are ignored while paused");

        app.handle(key(KeyCode::Enter));
        assert_eq!(app.controller.status(), SessionStatus::Running);
        assert_eq!(app.controller.answer(0), None);
    }

    #[test]
    fn quit_event_exits() {
        let mut app = app("networking");
        assert!(!app.handle(ExamEvent::Tick));
        assert!(app.handle(ExamEvent::Quit));
        assert_eq!(app.controller.status(), SessionStatus::Running);
    }
}
