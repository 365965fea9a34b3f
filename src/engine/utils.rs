use crate::constants::NAME_MAX_CHARS;

pub(super) fn lerp(from: f64, to: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    from + (to - from) * t
}

pub(super) fn default_name(player_id: &str) -> String {
    let prefix: String = player_id.chars().take(4).collect();
    format!("Player{prefix}")
}

/// Trims, truncates and strips anything but letters, digits, whitespace,
/// `_` and `-`. Falls back to the default name when nothing survives.
pub(super) fn sanitize_player_name(raw: &str, player_id: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .take(NAME_MAX_CHARS)
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace() || *ch == '_' || *ch == '-')
        .collect();
    if cleaned.is_empty() {
        default_name(player_id)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_clamps_progress() {
        assert_eq!(lerp(0.0, 48.0, 0.5), 24.0);
        assert_eq!(lerp(0.0, 48.0, 1.5), 48.0);
        assert_eq!(lerp(96.0, 48.0, -1.0), 96.0);
    }

    #[test]
    fn default_name_uses_id_prefix() {
        assert_eq!(default_name("abcdef"), "Playerabcd");
        assert_eq!(default_name("xy"), "Playerxy");
    }

    #[test]
    fn sanitize_truncates_before_filtering() {
        assert_eq!(sanitize_player_name("  Alexandria  ", "p1"), "Alexandri");
        assert_eq!(sanitize_player_name("<b>bold</b>", "p1"), "bbold");
        assert_eq!(sanitize_player_name("a_b-c d!", "p1"), "a_b-c d");
    }

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_player_name("Zoë", "p1"), "Zoë");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_survives() {
        assert_eq!(sanitize_player_name("<<>>!!", "abcd1234"), "Playerabcd");
        assert_eq!(sanitize_player_name("   ", "abcd1234"), "Playerabcd");
    }
}
