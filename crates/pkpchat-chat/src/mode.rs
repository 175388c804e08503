//! Effective-mode detection for a turn.

use pkpchat_types::ChatMode;

// Keyword scan carried over from the original client behavior. This is a
// known false-positive surface (incidental "slide" or "deck" will trigger
// it); the list is kept as-is rather than attempting intent detection.
const PRESENTATION_KEYWORDS: &[&str] = &[
    "presentation",
    "slide",
    "slides",
    "slideshow",
    "deck",
    "powerpoint",
    "ppt",
];

/// Resolve the effective mode for a prompt. Image and presentation
/// selections are taken verbatim; a text selection auto-switches to
/// presentation when the prompt mentions a deck-building keyword.
pub fn detect_mode(selected: ChatMode, prompt: &str) -> ChatMode {
    if selected != ChatMode::Text {
        return selected;
    }

    let lower = prompt.to_lowercase();
    let mentions_deck = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| PRESENTATION_KEYWORDS.contains(&word));

    if mentions_deck {
        ChatMode::Presentation
    } else {
        ChatMode::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_switches_text_to_presentation() {
        assert_eq!(
            detect_mode(ChatMode::Text, "Make a presentation about volcanoes"),
            ChatMode::Presentation
        );
        assert_eq!(
            detect_mode(ChatMode::Text, "add a SLIDE about magma"),
            ChatMode::Presentation
        );
    }

    #[test]
    fn test_plain_text_stays_text() {
        assert_eq!(
            detect_mode(ChatMode::Text, "what do volcanoes eat"),
            ChatMode::Text
        );
    }

    #[test]
    fn test_explicit_selections_untouched() {
        assert_eq!(
            detect_mode(ChatMode::Image, "a presentation about cats"),
            ChatMode::Image
        );
        assert_eq!(
            detect_mode(ChatMode::Presentation, "hello"),
            ChatMode::Presentation
        );
    }

    #[test]
    fn test_known_false_positive_surface() {
        // Incidental keyword use still triggers the switch; accepted behavior.
        assert_eq!(
            detect_mode(ChatMode::Text, "the playground slide is wet"),
            ChatMode::Presentation
        );
    }
}
