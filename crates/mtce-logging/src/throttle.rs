//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Structured logging context, macros, and throttling."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---

/// Rate limiter for repetitive log lines.
///
/// The first `first` occurrences are let through, after that only every
/// `every`th one. [`LogThrottle::reset`] re-arms it once the condition clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogThrottle {
    first: u32,
    every: u32,
    count: u32,
}

impl LogThrottle {
    /// Create a throttle passing `first` events and then one in `every`.
    pub fn new(first: u32, every: u32) -> Self {
        Self {
            first,
            every: every.max(1),
            count: 0,
        }
    }

    /// Record an occurrence; returns whether it should be logged.
    pub fn should_log(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count <= self.first {
            return true;
        }
        (self.count - self.first) % self.every == 0
    }

    /// Total occurrences seen since the last reset.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Forget previous occurrences.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(3, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_first_then_every_nth() {
        let mut throttle = LogThrottle::new(2, 3);
        let passed: Vec<bool> = (0..8).map(|_| throttle.should_log()).collect();
        assert_eq!(
            passed,
            vec![true, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn reset_rearms() {
        let mut throttle = LogThrottle::new(1, 100);
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
        throttle.reset();
        assert_eq!(throttle.count(), 0);
        assert!(throttle.should_log());
    }
}
