// =============================================================================
// FitPulse Social Fitness Backend - Utilities
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

pub mod error;

/// Truncate a message body to a short preview for list views and push
/// notification text.
pub fn preview(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_owned()
    } else {
        let cut: String = body.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_body_unchanged() {
        assert_eq!(preview("hello", 80), "hello");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let truncated = preview("아주 긴 운동 인증 메시지입니다", 5);
        assert_eq!(truncated.chars().count(), 6); // 5 chars + ellipsis
        assert!(truncated.ends_with('…'));
    }
}
