use crate::integrity::IntegrityEvent;
use crate::session::CorruptionReason;

/// A qualifying integrity breach. Each one is a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Breach {
    FullscreenExit,
    TabSwitch,
    /// Window lost focus while full-screen was engaged.
    WindowBlur,
    Navigation,
    Unload,
}

impl Breach {
    pub fn reason(&self) -> CorruptionReason {
        match self {
            Breach::FullscreenExit => CorruptionReason::FullscreenExit,
            Breach::TabSwitch | Breach::WindowBlur => CorruptionReason::TabSwitch,
            Breach::Navigation => CorruptionReason::Navigation,
            Breach::Unload => CorruptionReason::PageUnload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    None,
    Warn,
    Corrupt(CorruptionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub violation_count: u32,
    pub outcome: Outcome,
}

/// Strike counter with a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationPolicy {
    threshold: u32,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl ViolationPolicy {
    pub const DEFAULT_THRESHOLD: u32 = 2;

    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Pure transition: `(count, event) -> (count', outcome)`.
    pub fn assess(&self, violation_count: u32, event: IntegrityEvent) -> Verdict {
        let Some(breach) = event.breach() else {
            return Verdict {
                violation_count,
                outcome: Outcome::None,
            };
        };

        let violation_count = violation_count.saturating_add(1);
        let outcome = if violation_count >= self.threshold {
            Outcome::Corrupt(breach.reason())
        } else {
            Outcome::Warn
        };

        Verdict {
            violation_count,
            outcome,
        }
    }

    /// The grace window ran out; corrupts without touching the strike count.
    pub fn grace_expired(&self, violation_count: u32) -> Verdict {
        Verdict {
            violation_count,
            outcome: Outcome::Corrupt(CorruptionReason::FullscreenExit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_breach_warns() {
        let policy = ViolationPolicy::default();
        let verdict = policy.assess(0, IntegrityEvent::Breach(Breach::TabSwitch));
        assert_eq!(verdict.violation_count, 1);
        assert_eq!(verdict.outcome, Outcome::Warn);
    }

    #[test]
    fn second_breach_corrupts_regardless_of_kind() {
        let policy = ViolationPolicy::default();
        for breach in [
            Breach::FullscreenExit,
            Breach::TabSwitch,
            Breach::WindowBlur,
            Breach::Navigation,
            Breach::Unload,
        ] {
            let verdict = policy.assess(1, IntegrityEvent::Breach(breach));
            assert_eq!(verdict.violation_count, 2);
            assert_eq!(verdict.outcome, Outcome::Corrupt(breach.reason()));
        }
    }

    #[test]
    fn non_breach_events_are_neutral() {
        let policy = ViolationPolicy::default();
        for event in [IntegrityEvent::FullscreenEngaged, IntegrityEvent::FullscreenLost] {
            let verdict = policy.assess(1, event);
            assert_eq!(verdict.violation_count, 1);
            assert_eq!(verdict.outcome, Outcome::None);
        }
    }

    #[test]
    fn grace_expiry_corrupts_below_threshold() {
        let verdict = ViolationPolicy::default().grace_expired(0);
        assert_eq!(verdict.violation_count, 0);
        assert_eq!(
            verdict.outcome,
            Outcome::Corrupt(CorruptionReason::FullscreenExit)
        );
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = ViolationPolicy::new(1);
        assert_eq!(
            strict.assess(0, IntegrityEvent::Breach(Breach::Navigation)).outcome,
            Outcome::Corrupt(CorruptionReason::Navigation)
        );

        let lenient = ViolationPolicy::new(3);
        assert_eq!(
            lenient.assess(1, IntegrityEvent::Breach(Breach::Unload)).outcome,
            Outcome::Warn
        );

        assert_eq!(ViolationPolicy::new(0).threshold(), 1);
    }

    #[test]
    fn blur_counts_as_tab_switch() {
        assert_eq!(Breach::WindowBlur.reason(), CorruptionReason::TabSwitch);
    }
}
