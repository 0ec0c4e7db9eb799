//! Environment signals and their normalization into controller-facing events.
//!
//! Raw signals overlap: switching away from a full-screen window typically
//! fires a visibility change, a focus change and a full-screen change within
//! a few milliseconds. [`SignalNormalizer`] collapses each such burst into a
//! single strike, while still reporting a full-screen loss so the grace clock
//! can start.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::policy::Breach;

/// A raw environment notification, as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSignal {
    Fullscreen { engaged: bool },
    Visibility { hidden: bool },
    Focus { focused: bool },
    NavigationAttempt,
    UnloadAttempt,
}

/// What the session controller consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityEvent {
    /// Full-screen entered for the first time or restored.
    FullscreenEngaged,
    /// Full-screen lost as part of a change that already produced a strike.
    /// Starts the grace clock without counting again.
    FullscreenLost,
    Breach(Breach),
}

impl IntegrityEvent {
    pub fn breach(&self) -> Option<Breach> {
        match self {
            IntegrityEvent::Breach(b) => Some(*b),
            _ => None,
        }
    }

    pub fn loses_fullscreen(&self) -> bool {
        matches!(
            self,
            IntegrityEvent::FullscreenLost | IntegrityEvent::Breach(Breach::FullscreenExit)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SignalNormalizer {
    debounce: Duration,
    fullscreen: bool,
    hidden: bool,
    focused: bool,
    last_strike: Option<Instant>,
}

impl SignalNormalizer {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            fullscreen: false,
            hidden: false,
            focused: true,
            last_strike: None,
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// The candidate is currently away: tab hidden or window unfocused.
    fn away(&self) -> bool {
        self.hidden || !self.focused
    }

    fn recently_struck(&self, now: Instant) -> bool {
        self.last_strike
            .is_some_and(|at| now.saturating_duration_since(at) < self.debounce)
    }

    fn strike(&mut self, now: Instant, breach: Breach) -> Option<IntegrityEvent> {
        self.last_strike = Some(now);
        Some(IntegrityEvent::Breach(breach))
    }

    /// Feed one raw signal. Returns the event to deliver, if any.
    pub fn observe(&mut self, signal: EnvSignal, now: Instant) -> Option<IntegrityEvent> {
        let event = match signal {
            EnvSignal::Fullscreen { engaged: true } => {
                if self.fullscreen {
                    None
                } else {
                    // entering full screen means the candidate is present
                    self.fullscreen = true;
                    self.hidden = false;
                    self.focused = true;
                    Some(IntegrityEvent::FullscreenEngaged)
                }
            }
            EnvSignal::Fullscreen { engaged: false } => {
                if !self.fullscreen {
                    None
                } else {
                    self.fullscreen = false;
                    if self.away() || self.recently_struck(now) {
                        Some(IntegrityEvent::FullscreenLost)
                    } else {
                        self.strike(now, Breach::FullscreenExit)
                    }
                }
            }
            EnvSignal::Visibility { hidden: true } => {
                if self.hidden {
                    None
                } else {
                    let was_away = self.away();
                    self.hidden = true;
                    if was_away || self.recently_struck(now) {
                        None
                    } else {
                        self.strike(now, Breach::TabSwitch)
                    }
                }
            }
            EnvSignal::Visibility { hidden: false } => {
                self.hidden = false;
                None
            }
            EnvSignal::Focus { focused: false } => {
                if !self.focused {
                    None
                } else {
                    let was_away = self.away();
                    self.focused = false;
                    // blur only counts while full-screen is engaged
                    if was_away || !self.fullscreen || self.recently_struck(now) {
                        None
                    } else {
                        self.strike(now, Breach::WindowBlur)
                    }
                }
            }
            EnvSignal::Focus { focused: true } => {
                self.focused = true;
                None
            }
            EnvSignal::NavigationAttempt => {
                if self.recently_struck(now) {
                    None
                } else {
                    self.strike(now, Breach::Navigation)
                }
            }
            EnvSignal::UnloadAttempt => {
                if self.recently_struck(now) {
                    None
                } else {
                    self.strike(now, Breach::Unload)
                }
            }
        };

        if event.is_none() {
            debug!(?signal, "signal suppressed");
        }
        event
    }
}

impl Default for SignalNormalizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engaged(n: &mut SignalNormalizer, now: Instant) {
        assert_eq!(
            n.observe(EnvSignal::Fullscreen { engaged: true }, now),
            Some(IntegrityEvent::FullscreenEngaged)
        );
    }

    #[test]
    fn fullscreen_engage_reported_once() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        assert_eq!(n.observe(EnvSignal::Fullscreen { engaged: true }, now), None);
        assert!(n.is_fullscreen());
    }

    #[test]
    fn fullscreen_exit_is_a_strike() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        assert_eq!(
            n.observe(EnvSignal::Fullscreen { engaged: false }, now),
            Some(IntegrityEvent::Breach(Breach::FullscreenExit))
        );
        assert_eq!(n.observe(EnvSignal::Fullscreen { engaged: false }, now), None);
    }

    #[test]
    fn hidden_reported_once_per_transition() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        assert_eq!(
            n.observe(EnvSignal::Visibility { hidden: true }, now),
            Some(IntegrityEvent::Breach(Breach::TabSwitch))
        );
        assert_eq!(n.observe(EnvSignal::Visibility { hidden: true }, now), None);

        let later = now + Duration::from_secs(5);
        n.observe(EnvSignal::Visibility { hidden: false }, later);
        assert_eq!(
            n.observe(EnvSignal::Visibility { hidden: true }, later),
            Some(IntegrityEvent::Breach(Breach::TabSwitch))
        );
    }

    #[test]
    fn blur_alongside_hidden_counts_once() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        assert_eq!(
            n.observe(EnvSignal::Visibility { hidden: true }, now),
            Some(IntegrityEvent::Breach(Breach::TabSwitch))
        );
        // blur arrives outside the debounce window but within the same away episode
        let later = now + Duration::from_secs(1);
        assert_eq!(n.observe(EnvSignal::Focus { focused: false }, later), None);
    }

    #[test]
    fn tab_switch_out_of_fullscreen_still_starts_grace() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        n.observe(EnvSignal::Visibility { hidden: true }, now);
        assert_eq!(
            n.observe(EnvSignal::Fullscreen { engaged: false }, now),
            Some(IntegrityEvent::FullscreenLost)
        );
    }

    #[test]
    fn fullscreen_exit_then_blur_within_window_is_one_strike() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        assert_eq!(
            n.observe(EnvSignal::Fullscreen { engaged: false }, now),
            Some(IntegrityEvent::Breach(Breach::FullscreenExit))
        );
        // blur after leaving full-screen never counts
        let later = now + Duration::from_millis(10);
        assert_eq!(n.observe(EnvSignal::Focus { focused: false }, later), None);
    }

    #[test]
    fn blur_without_fullscreen_is_ignored() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        assert_eq!(n.observe(EnvSignal::Focus { focused: false }, now), None);
    }

    #[test]
    fn blur_before_engaging_does_not_mask_later_breaches() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        assert_eq!(n.observe(EnvSignal::Focus { focused: false }, now), None);
        engaged(&mut n, now + Duration::from_secs(2));
        assert_eq!(
            n.observe(
                EnvSignal::Visibility { hidden: true },
                now + Duration::from_secs(5)
            ),
            Some(IntegrityEvent::Breach(Breach::TabSwitch))
        );

        let mut n = SignalNormalizer::default();
        n.observe(EnvSignal::Focus { focused: false }, now);
        engaged(&mut n, now + Duration::from_secs(2));
        assert_eq!(
            n.observe(
                EnvSignal::Fullscreen { engaged: false },
                now + Duration::from_secs(8)
            ),
            Some(IntegrityEvent::Breach(Breach::FullscreenExit))
        );
    }

    #[test]
    fn blur_while_fullscreen_is_a_strike() {
        let now = Instant::now();
        let mut n = SignalNormalizer::default();
        engaged(&mut n, now);
        assert_eq!(
            n.observe(EnvSignal::Focus { focused: false }, now),
            Some(IntegrityEvent::Breach(Breach::WindowBlur))
        );
        let back = now + Duration::from_secs(2);
        n.observe(EnvSignal::Focus { focused: true }, back);
        assert_eq!(
            n.observe(EnvSignal::Focus { focused: false }, back),
            Some(IntegrityEvent::Breach(Breach::WindowBlur))
        );
    }

    #[test]
    fn navigation_and_unload_are_debounced() {
        let now = Instant::now();
        let mut n = SignalNormalizer::new(Duration::from_millis(100));
        assert_eq!(
            n.observe(EnvSignal::NavigationAttempt, now),
            Some(IntegrityEvent::Breach(Breach::Navigation))
        );
        assert_eq!(
            n.observe(EnvSignal::UnloadAttempt, now + Duration::from_millis(50)),
            None
        );
        assert_eq!(
            n.observe(EnvSignal::UnloadAttempt, now + Duration::from_millis(200)),
            Some(IntegrityEvent::Breach(Breach::Unload))
        );
    }

    #[test]
    fn event_helpers() {
        assert!(IntegrityEvent::FullscreenLost.loses_fullscreen());
        assert!(IntegrityEvent::Breach(Breach::FullscreenExit).loses_fullscreen());
        assert!(!IntegrityEvent::Breach(Breach::TabSwitch).loses_fullscreen());
        assert_eq!(IntegrityEvent::FullscreenEngaged.breach(), None);
    }
}
