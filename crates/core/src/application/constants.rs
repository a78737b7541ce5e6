// Job tracking constants (no magic values)
use std::time::Duration;

/// Bytes of stdout/stderr tail kept for the job record (100 bytes)
pub const DEFAULT_CAPTURE_BYTES: usize = 100;

/// Grace period between the polite termination signal and a hard kill (5s)
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Annotation added to an attempt rejected because the job is still running elsewhere
pub const ALREADY_RUNNING_MESSAGE: &str = "a job with the same ID is already running";

/// Annotation added when an external interruption killed the job
pub const INTERRUPTED_MESSAGE: &str =
    "terminated by external interruption: all subprocesses were killed";

/// Annotation added when the max execution time was exceeded
pub fn timeout_message(max_execution_time: Duration) -> String {
    format!(
        "terminated by timeout: max execution time of {} exceeded",
        format_duration(max_execution_time)
    )
}

/// Compact human duration: 1h2m3s, 45s, 1m30s, 500ms
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    if total == 0 {
        return format!("{}ms", d.as_millis());
    }

    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if h > 0 || m > 0 {
        out.push_str(&format!("{}m", m));
    }
    out.push_str(&format!("{}s", s));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_timeout_message_names_duration() {
        assert!(timeout_message(Duration::from_secs(2)).contains("2s"));
    }
}
