//! Inter-cycle delay controller
//!
//! Multiplies the delay on every failed submission and snaps back to the
//! base delay after a clean cycle. The current value is always clamped to
//! `[base, max]`.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DelayController {
    base: Duration,
    max: Duration,
    factor: u32,
    current: Duration,
}

impl DelayController {
    /// `max` below `base` is raised to `base`; a zero factor acts as 1
    pub fn new(base: Duration, max: Duration, factor: u32) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            factor: factor.max(1),
            current: base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn on_failure(&mut self) -> Duration {
        let next = self.current.saturating_mul(self.factor);
        self.current = next.clamp(self.base, self.max);
        self.current
    }

    pub fn on_clean_cycle(&mut self) -> Duration {
        self.current = self.base;
        self.current
    }

    pub fn is_backed_off(&self) -> bool {
        self.current > self.base
    }
}
