//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Shared primitives and utilities for the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::time::Instant;

/// Capture an instant for timer and audit comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Render an uptime in seconds as `1d 02:03:04`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_days() {
        assert_eq!(format_uptime(59), "00:00:59");
        assert_eq!(format_uptime(90_061), "1d 01:01:01");
    }
}
