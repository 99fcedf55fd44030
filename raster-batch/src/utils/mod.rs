pub mod fs;

use std::time::Duration;

/// Format a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
