//! Display helpers for CLI output: colour, relative time, truncation.

use tankmon_core::Tone;

/// Resolve --color flag to bool.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Wrap `text` in an ANSI SGR sequence when colour is on.
pub fn paint(text: &str, sgr: &str, use_color: bool) -> String {
    if use_color && !sgr.is_empty() {
        format!("\x1b[{sgr}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// SGR code for a tone.
pub fn tone_sgr(tone: Tone) -> &'static str {
    match tone {
        Tone::Normal => "",
        Tone::Muted => "2",
        Tone::Good => "32",
        Tone::Bad => "31",
        Tone::Warn => "1;33",
    }
}

/// Relative-time helper: seconds -> human string.
pub fn relative_time(seconds: i64) -> String {
    let s = seconds.unsigned_abs();
    if s < 5 {
        "just now".to_string()
    } else if s < 60 {
        format!("{s}s")
    } else if s < 3600 {
        format!("{}m", s / 60)
    } else if s < 86400 {
        format!("{}h", s / 3600)
    } else {
        format!("{}d", s / 86400)
    }
}

/// Right-truncate to `max_chars` characters, appending `…` if truncated.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{kept}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_color_explicit() {
        assert!(resolve_color("always"));
        assert!(!resolve_color("never"));
    }

    #[test]
    fn paint_only_with_color() {
        assert_eq!(paint("ok", "32", true), "\x1b[32mok\x1b[0m");
        assert_eq!(paint("ok", "32", false), "ok");
        assert_eq!(paint("ok", tone_sgr(Tone::Normal), true), "ok");
    }

    #[test]
    fn relative_time_buckets() {
        assert_eq!(relative_time(2), "just now");
        assert_eq!(relative_time(42), "42s");
        assert_eq!(relative_time(-125), "2m");
        assert_eq!(relative_time(7200), "2h");
        assert_eq!(relative_time(86400 * 3), "3d");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("Woodcutting", 20), "Woodcutting");
        assert_eq!(truncate("ééééé", 3), "éé\u{2026}");
    }
}
