use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;

use crate::integrity::{EnvSignal, IntegrityEvent, SignalNormalizer};

/// What an event source delivers before normalization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEvent {
    Key(KeyEvent),
    Signal(EnvSignal),
    Quit,
}

/// Unified event type consumed by the app runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExamEvent {
    Key(KeyEvent),
    Integrity(IntegrityEvent),
    Tick,
    Quit,
}

/// Source of terminal events (keyboard, focus, resize, etc.)
pub trait ExamEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<RawEvent, RecvTimeoutError>;
}

/// Terminal size threshold that stands in for full-screen mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenRequirement {
    pub min_width: u16,
    pub min_height: u16,
}

impl ScreenRequirement {
    pub fn is_met(&self, width: u16, height: u16) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

/// Map one crossterm event to what the session cares about.
pub fn translate(event: CtEvent, screen: ScreenRequirement) -> Vec<RawEvent> {
    match event {
        CtEvent::Key(key) if key.kind == KeyEventKind::Press => {
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            let alt = key.modifiers.contains(KeyModifiers::ALT);
            match key.code {
                KeyCode::Char('c') if ctrl => {
                    vec![RawEvent::Signal(EnvSignal::UnloadAttempt), RawEvent::Quit]
                }
                // raw mode swallows SIGTSTP, so a suspend attempt arrives as a key
                KeyCode::Char('z') if ctrl => vec![
                    RawEvent::Signal(EnvSignal::Visibility { hidden: true }),
                    RawEvent::Signal(EnvSignal::Visibility { hidden: false }),
                ],
                KeyCode::Left | KeyCode::Right if alt => {
                    vec![RawEvent::Signal(EnvSignal::NavigationAttempt)]
                }
                _ => vec![RawEvent::Key(key)],
            }
        }
        CtEvent::FocusLost => vec![RawEvent::Signal(EnvSignal::Focus { focused: false })],
        CtEvent::FocusGained => vec![RawEvent::Signal(EnvSignal::Focus { focused: true })],
        CtEvent::Resize(w, h) => vec![RawEvent::Signal(EnvSignal::Fullscreen {
            engaged: screen.is_met(w, h),
        })],
        _ => vec![],
    }
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<RawEvent>,
}

impl CrosstermEventSource {
    /// Reports the initial screen state, then forwards terminal events.
    pub fn new(screen: ScreenRequirement) -> Self {
        let (tx, rx) = mpsc::channel();

        if let Ok((w, h)) = crossterm::terminal::size() {
            let _ = tx.send(RawEvent::Signal(EnvSignal::Fullscreen {
                engaged: screen.is_met(w, h),
            }));
        }

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(ev) => {
                    for raw in translate(ev, screen) {
                        if tx.send(raw).is_err() {
                            return;
                        }
                    }
                }
                Err(_) => {
                    let _ = tx.send(RawEvent::Quit);
                    return;
                }
            }
        });

        Self { rx }
    }
}

impl ExamEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RawEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<RawEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<RawEvent>) -> Self {
        Self { rx }
    }
}

impl ExamEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RawEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
/// A runner on this clock blocks until an event is queued or the clock is
/// advanced past the next tick.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Deadline-based tick schedule. Falls behind gracefully: every missed
/// interval still yields a tick, so the exam clock tracks wall time.
#[derive(Clone, Copy, Debug)]
pub struct Metronome {
    interval: Duration,
    next: Instant,
}

impl Metronome {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    pub fn until_next(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    pub fn advance(&mut self) {
        self.next += self.interval;
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// A due tick is always delivered before any queued event, so clock expiry
/// is resolved ahead of integrity events arriving in the same interval.
pub struct Runner<E: ExamEventSource, C: Clock = SystemClock> {
    event_source: E,
    clock: C,
    metronome: Metronome,
    normalizer: SignalNormalizer,
}

impl<E: ExamEventSource> Runner<E, SystemClock> {
    pub fn new<T: Ticker>(event_source: E, ticker: T, debounce: Duration) -> Self {
        Self::with_clock(event_source, ticker, debounce, SystemClock)
    }
}

impl<E: ExamEventSource, C: Clock> Runner<E, C> {
    pub fn with_clock<T: Ticker>(event_source: E, ticker: T, debounce: Duration, clock: C) -> Self {
        let metronome = Metronome::new(ticker.interval(), clock.now());
        Self {
            event_source,
            clock,
            metronome,
            normalizer: SignalNormalizer::new(debounce),
        }
    }

    /// Blocks until the next tick or deliverable event.
    pub fn step(&mut self) -> ExamEvent {
        loop {
            let now = self.clock.now();
            if self.metronome.is_due(now) {
                self.metronome.advance();
                return ExamEvent::Tick;
            }

            match self.event_source.recv_timeout(self.metronome.until_next(now)) {
                Ok(RawEvent::Key(key)) => return ExamEvent::Key(key),
                Ok(RawEvent::Quit) => return ExamEvent::Quit,
                Ok(RawEvent::Signal(signal)) => {
                    if let Some(ev) = self.normalizer.observe(signal, self.clock.now()) {
                        return ExamEvent::Integrity(ev);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("event source disconnected");
                    return ExamEvent::Quit;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Breach;
    use std::sync::mpsc;

    const SCREEN: ScreenRequirement = ScreenRequirement {
        min_width: 80,
        min_height: 24,
    };

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let mut runner = Runner::new(es, ticker, Duration::ZERO);

        assert_eq!(runner.step(), ExamEvent::Tick);
    }

    #[test]
    fn step_passes_through_keys() {
        let (tx, rx) = mpsc::channel();
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        tx.send(RawEvent::Key(key)).unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(50));
        let mut runner = Runner::new(es, ticker, Duration::ZERO);

        assert_eq!(runner.step(), ExamEvent::Key(key));
    }

    #[test]
    fn step_normalizes_signals() {
        let (tx, rx) = mpsc::channel();
        tx.send(RawEvent::Signal(EnvSignal::Fullscreen { engaged: true }))
            .unwrap();
        tx.send(RawEvent::Signal(EnvSignal::Fullscreen { engaged: true }))
            .unwrap();
        tx.send(RawEvent::Signal(EnvSignal::Visibility { hidden: true }))
            .unwrap();
        tx.send(RawEvent::Signal(EnvSignal::Focus { focused: false }))
            .unwrap();
        let key = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        tx.send(RawEvent::Key(key)).unwrap();
        let clock = ManualClock::new();
        let mut runner = Runner::with_clock(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_secs(1)),
            Duration::from_millis(250),
            clock.clone(),
        );

        assert_eq!(
            runner.step(),
            ExamEvent::Integrity(IntegrityEvent::FullscreenEngaged)
        );
        assert_eq!(
            runner.step(),
            ExamEvent::Integrity(IntegrityEvent::Breach(Breach::TabSwitch))
        );
        // the overlapping blur is swallowed, so the key comes straight through
        assert_eq!(runner.step(), ExamEvent::Key(key));
        clock.advance(Duration::from_secs(1));
        assert_eq!(runner.step(), ExamEvent::Tick);
    }

    #[test]
    fn due_tick_precedes_queued_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(RawEvent::Signal(EnvSignal::NavigationAttempt))
            .unwrap();
        let clock = ManualClock::new();
        let mut runner = Runner::with_clock(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_secs(1)),
            Duration::ZERO,
            clock.clone(),
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(runner.step(), ExamEvent::Tick);
        assert_eq!(
            runner.step(),
            ExamEvent::Integrity(IntegrityEvent::Breach(Breach::Navigation))
        );
    }

    #[test]
    fn missed_intervals_are_caught_up() {
        let (_tx, rx) = mpsc::channel::<RawEvent>();
        let clock = ManualClock::new();
        let mut runner = Runner::with_clock(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_secs(1)),
            Duration::ZERO,
            clock.clone(),
        );

        clock.advance(Duration::from_secs(3));
        for _ in 0..3 {
            assert_eq!(runner.step(), ExamEvent::Tick);
        }
    }

    #[test]
    fn disconnected_source_quits() {
        let (tx, rx) = mpsc::channel::<RawEvent>();
        drop(tx);
        let mut runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_secs(60)),
            Duration::ZERO,
        );
        assert_eq!(runner.step(), ExamEvent::Quit);
    }

    #[test]
    fn translate_maps_terminal_events() {
        assert_eq!(
            translate(CtEvent::Resize(40, 10), SCREEN),
            vec![RawEvent::Signal(EnvSignal::Fullscreen { engaged: false })]
        );
        assert_eq!(
            translate(CtEvent::Resize(120, 40), SCREEN),
            vec![RawEvent::Signal(EnvSignal::Fullscreen { engaged: true })]
        );
        assert_eq!(
            translate(CtEvent::FocusLost, SCREEN),
            vec![RawEvent::Signal(EnvSignal::Focus { focused: false })]
        );

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(
            translate(CtEvent::Key(ctrl_c), SCREEN),
            vec![RawEvent::Signal(EnvSignal::UnloadAttempt), RawEvent::Quit]
        );

        let alt_left = KeyEvent::new(KeyCode::Left, KeyModifiers::ALT);
        assert_eq!(
            translate(CtEvent::Key(alt_left), SCREEN),
            vec![RawEvent::Signal(EnvSignal::NavigationAttempt)]
        );

        let left = KeyEvent::new(KeyCode::Left, KeyModifiers::NONE);
        assert_eq!(
            translate(CtEvent::Key(left), SCREEN),
            vec![RawEvent::Key(left)]
        );
    }
}
