use chrono::{SecondsFormat, Utc};

use crate::constants::{CHAT_MAX_CHARS, FULL_STATE_INTERVAL_TICKS};

/// Trimmed and capped chat text, or `None` when nothing is left to send.
pub fn sanitize_chat_message(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(CHAT_MAX_CHARS).collect())
}

pub fn chat_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Every `FULL_STATE_INTERVAL_TICKS`th tick resyncs everyone with a full
/// snapshot.
pub fn should_send_full_state(tick: u64) -> bool {
    tick % FULL_STATE_INTERVAL_TICKS == 0
}

pub fn spectator_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.chars().take(16).collect(),
        _ => "Spectator".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[test]
    fn chat_messages_are_trimmed_and_capped() {
        assert_eq!(sanitize_chat_message("  hello  "), Some("hello".to_string()));
        assert_eq!(sanitize_chat_message("   "), None);
        let long = "x".repeat(500);
        assert_eq!(
            sanitize_chat_message(&long).map(|m| m.chars().count()),
            Some(CHAT_MAX_CHARS)
        );
    }

    #[test]
    fn chat_timestamp_is_rfc3339() {
        let stamp = chat_timestamp();
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok());
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn full_state_goes_out_once_per_second() {
        assert!(should_send_full_state(0));
        assert!(!should_send_full_state(1));
        assert!(!should_send_full_state(59));
        assert!(should_send_full_state(60));
        assert!(should_send_full_state(120));
    }

    #[test]
    fn spectator_name_defaults() {
        assert_eq!(spectator_name(None), "Spectator");
        assert_eq!(spectator_name(Some("  ")), "Spectator");
        assert_eq!(spectator_name(Some(" Eve ")), "Eve");
    }
}
