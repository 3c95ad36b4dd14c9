//! Human-readable formatting for CLI output

use std::io::{self, IsTerminal, Write};
use std::ops::ControlFlow;

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One line of download progress, e.g. `1.5 MB / 3.0 MB (50%)`
pub fn format_progress(done: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!(
            "{} / {} ({}%)",
            format_size(done),
            format_size(total),
            (done.saturating_mul(100) / total).min(100)
        ),
        _ => format_size(done),
    }
}

/// Progress callback that redraws one stderr line when attached to a terminal
pub fn download_progress() -> impl FnMut(u64, Option<u64>) -> ControlFlow<()> {
    let interactive = io::stderr().is_terminal();
    move |done, total| {
        if interactive {
            let mut stderr = io::stderr();
            let _ = write!(stderr, "\r  Downloading {}   ", format_progress(done, total));
            if total == Some(done) {
                let _ = writeln!(stderr);
            }
            let _ = stderr.flush();
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_duration(chrono::Duration::minutes(3)), "3m");
        assert_eq!(format_duration(chrono::Duration::hours(5)), "5h");
        assert_eq!(format_duration(chrono::Duration::days(3)), "3d");
        assert_eq!(format_duration(chrono::Duration::days(65)), "2mo");
        assert_eq!(format_duration(chrono::Duration::seconds(-4)), "0s");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(512, None), "512 B");
        assert_eq!(format_progress(1024, Some(2048)), "1.0 KB / 2.0 KB (50%)");
        assert_eq!(format_progress(10, Some(0)), "10 B");
    }
}
