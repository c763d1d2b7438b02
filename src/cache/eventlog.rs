//! VL-015: Append-only JSONL build event log.

use crate::core::types::{BuildEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Generate an ISO 8601 UTC timestamp.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_timestamp(secs)
}

/// Format seconds since the Unix epoch as `YYYY-MM-DDTHH:MM:SSZ`.
fn format_timestamp(secs: u64) -> String {
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    let mut y = 1970i64;
    let mut remaining = days as i64;
    loop {
        let year_days = if is_leap(y) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        y += 1;
    }
    let feb = if is_leap(y) { 29 } else { 28 };
    let month_days = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut m = 12;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md {
            m = i + 1;
            break;
        }
        remaining -= md;
    }
    let d = remaining + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y, m, d, hours, minutes, seconds
    )
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Event log location inside a cache directory.
pub fn event_log_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("events.jsonl")
}

/// Append one event to the log at `path`.
pub fn append_event(path: &Path, event: BuildEvent) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error {}: {}", path.display(), e))?;

    Ok(())
}

/// Read every event in a log. A missing log reads as empty.
pub fn read_events(path: &Path) -> Result<Vec<TimestampedEvent>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("{} line {}: {}", path.display(), i + 1, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vl015_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), 20);
    }

    #[test]
    fn test_vl015_format_timestamp_known_dates() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        // 2000-02-29 12:34:56 UTC
        assert_eq!(format_timestamp(951_827_696), "2000-02-29T12:34:56Z");
        // 2026-12-31 23:59:59 UTC
        assert_eq!(format_timestamp(1_798_761_599), "2026-12-31T23:59:59Z");
    }

    #[test]
    fn test_vl015_is_leap() {
        assert!(is_leap(2000));
        assert!(!is_leap(1900));
        assert!(!is_leap(2100));
        assert!(is_leap(2024));
        assert!(!is_leap(2026));
    }

    #[test]
    fn test_vl015_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = event_log_path(&dir.path().join("cache"));
        append_event(
            &path,
            BuildEvent::TemplateCompiled {
                template: "index".to_string(),
                dependencies: 3,
                diagnostics: 0,
            },
        )
        .unwrap();
        append_event(
            &path,
            BuildEvent::TemplateRebuilt {
                template: "index".to_string(),
                reason: "dependency changed".to_string(),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("template_compiled"));

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1].event,
            BuildEvent::TemplateRebuilt { reason, .. } if reason == "dependency changed"
        ));
    }

    #[test]
    fn test_vl015_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
