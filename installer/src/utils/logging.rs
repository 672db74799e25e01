// Logging utilities
// Structured logging with JSON and human-readable formats

use log::Level;
use serde_json::json;

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, cleaned) = extract_tag(message, "[PHASE:");
    let (step, cleaned) = extract_tag(&cleaned, "[STEP:");
    (phase, step, cleaned)
}

fn extract_tag(message: &str, tag: &str) -> (Option<String>, String) {
    let Some(start) = message.find(tag) else {
        return (None, message.to_string());
    };
    let Some(end) = message[start..].find(']') else {
        return (None, message.to_string());
    };
    let value = message[start + tag.len()..start + end].trim().to_string();
    let cleaned = format!("{} {}", &message[..start], &message[start + end + 1..])
        .trim()
        .to_string();
    (Some(value), cleaned)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
    run_id: &str,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
        "run_id": run_id,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }

    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }

    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}

/// Last `max_lines` non-empty lines of a command's output, joined with " | ".
///
/// Package managers print pages of progress; a failure log only needs the tail.
pub fn output_tail(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let skip = lines.len().saturating_sub(max_lines);
    lines[skip..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_metadata_extracts_phase_and_step() {
        let (phase, step, msg) =
            parse_log_metadata("[PHASE: install] [STEP: os_packages] Installing 42 packages");
        assert_eq!(phase.as_deref(), Some("install"));
        assert_eq!(step.as_deref(), Some("os_packages"));
        assert_eq!(msg, "Installing 42 packages");
    }

    #[test]
    fn parse_log_metadata_without_tags_keeps_message() {
        let (phase, step, msg) = parse_log_metadata("plain message");
        assert!(phase.is_none());
        assert!(step.is_none());
        assert_eq!(msg, "plain message");
    }

    #[test]
    fn parse_log_metadata_unterminated_tag_is_left_alone() {
        let (phase, _, msg) = parse_log_metadata("[PHASE: install oops");
        assert!(phase.is_none());
        assert_eq!(msg, "[PHASE: install oops");
    }

    #[test]
    fn format_json_log_includes_run_id_and_tags() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Warn,
            "koozic_installer::platform",
            "apt-get failed",
            Some("install"),
            Some("os_packages"),
            "run-1",
        );
        let v: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(v["level"], "WARN");
        assert_eq!(v["phase"], "install");
        assert_eq!(v["step"], "os_packages");
        assert_eq!(v["run_id"], "run-1");
    }

    #[test]
    fn format_json_log_omits_missing_tags() {
        let line = format_json_log("t", Level::Info, "x", "m", None, None, "r");
        let v: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert!(v.get("phase").is_none());
        assert!(v.get("step").is_none());
    }

    #[test]
    fn format_human_readable_log_layout() {
        let line = format_human_readable_log(
            "2026-01-01 00:00:00.000",
            Level::Info,
            "koozic_installer",
            "done",
            Some("upgrade"),
            None,
        );
        assert_eq!(
            line,
            "[2026-01-01 00:00:00.000] [INFO] [PHASE: upgrade] [koozic_installer] done"
        );
    }

    #[test]
    fn output_tail_keeps_last_lines() {
        let out = "a\n\nb\nc\nd\n";
        assert_eq!(output_tail(out, 2), "c | d");
        assert_eq!(output_tail(out, 10), "a | b | c | d");
        assert_eq!(output_tail("", 3), "");
    }
}
