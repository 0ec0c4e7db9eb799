/// A one-second countdown handle. The controller owns one for the exam clock
/// and one for the grace window; neither runs on its own, both advance only
/// when the controller forwards a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Countdown {
    remaining: u32,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running(u32),
    Expired,
}

impl Countdown {
    pub fn new(remaining: u32) -> Self {
        Self {
            remaining,
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Arm from `secs` and start. Used by the grace clock, which never resumes.
    pub fn restart(&mut self, secs: u32) {
        self.remaining = secs;
        self.active = true;
    }

    /// Stop and zero out.
    pub fn reset(&mut self) {
        self.remaining = 0;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.active {
            return TickOutcome::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_countdown_does_not_move() {
        let mut c = Countdown::new(5);
        assert_eq!(c.tick(), TickOutcome::Idle);
        assert_eq!(c.remaining(), 5);
    }

    #[test]
    fn counts_down_to_expiry_and_stops() {
        let mut c = Countdown::new(2);
        c.start();
        assert_eq!(c.tick(), TickOutcome::Running(1));
        assert_eq!(c.tick(), TickOutcome::Expired);
        assert!(!c.is_active());
        assert_eq!(c.tick(), TickOutcome::Idle);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn stop_then_start_resumes_where_it_was() {
        let mut c = Countdown::new(10);
        c.start();
        c.tick();
        c.stop();
        c.tick();
        c.start();
        assert_eq!(c.tick(), TickOutcome::Running(8));
    }

    #[test]
    fn restart_rearms_and_reset_clears() {
        let mut c = Countdown::new(0);
        c.restart(10);
        c.tick();
        c.restart(10);
        assert_eq!(c.remaining(), 10);
        c.reset();
        assert_eq!(c.remaining(), 0);
        assert!(!c.is_active());
    }
}
