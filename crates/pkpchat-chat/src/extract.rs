//! HTML document extraction from raw response buffers.
//!
//! Model output is unreliable about markdown fencing and often prepends
//! conversational text before a generated document. The extractor works on
//! exact text offsets rather than parsing, because the buffer is frequently
//! not well-formed HTML while a response is still streaming in.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

fn doc_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<!doctype html>|<html").unwrap())
}

fn doc_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</html>").unwrap())
}

// A trailing run of up to three backticks (optionally with an "html" language
// tag) means the model is about to close a fenced block around the document.
fn fence_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*`{1,3}(?:html)?\s*$").unwrap())
}

/// Locate the byte range of an embedded HTML document in `raw`.
///
/// The document starts at the first case-insensitive `<!doctype html>` or
/// `<html`. If a closing `</html>` follows, the document ends 7 characters
/// past that tag's start and trailing content is discarded. Otherwise the
/// remainder of the buffer is treated as a still-streaming document, minus
/// any trailing partial code-fence marker.
pub fn find_document_span(raw: &str) -> Option<Range<usize>> {
    let start = doc_start_re().find(raw)?.start();
    let rest = &raw[start..];

    let end = match doc_end_re().find(rest) {
        Some(close) => start + close.start() + "</html>".len(),
        None => {
            let tail = fence_tail_re()
                .find(rest)
                .map(|f| f.start())
                .unwrap_or(rest.len());
            start + tail
        }
    };

    Some(start..end)
}

/// Extract the embedded HTML document from `raw`, trimmed of surrounding
/// whitespace. Returns an empty string when no document is present; never
/// errors. Malformed or never-closed documents are returned best-effort.
///
/// Callers distinguish "a real document" from "a stray tag fragment" with a
/// minimum-length threshold; the extractor itself applies none.
pub fn extract_document(raw: &str) -> String {
    match find_document_span(raw) {
        Some(span) => raw[span].trim().to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<!DOCTYPE html>\n<html>\n<head><title>Volcanoes</title></head>\n<body><section>Magma</section></body>\n</html>";

    #[test]
    fn test_round_trip_with_noise() {
        let noisy = format!(
            "Sure! Here's your presentation:\n```html\n{}\n```\nLet me know what you think.",
            DOC
        );
        assert_eq!(extract_document(&noisy), DOC);
    }

    #[test]
    fn test_plain_document() {
        assert_eq!(extract_document(DOC), DOC);
    }

    #[test]
    fn test_no_document() {
        assert_eq!(extract_document("just plain text"), "");
        assert_eq!(extract_document(""), "");
    }

    #[test]
    fn test_every_prefix_is_tolerated() {
        // Streaming truncation at any char boundary must never panic and must
        // yield a prefix of the trimmed document (modulo fence stripping).
        let noisy = format!("Here it is:\n```html\n{}\n```", DOC);
        for (k, _) in noisy.char_indices() {
            let partial = &noisy[..k];
            let extracted = extract_document(partial);
            assert!(
                DOC.starts_with(extracted.trim_end()),
                "prefix at {} produced non-prefix output: {:?}",
                k,
                extracted
            );
        }
    }

    #[test]
    fn test_trailing_content_discarded() {
        let input = format!("{}\n\nWould you like any changes?", DOC);
        assert_eq!(extract_document(&input), DOC);
    }

    #[test]
    fn test_unclosed_document_returned_in_full() {
        let partial = "<html><body><section>Slide one</section>";
        assert_eq!(extract_document(partial), partial);
    }

    #[test]
    fn test_partial_fence_markers_stripped() {
        for tail in ["`", "``", "```", "```html", "\n```\n"] {
            let input = format!("<html><body>content</body>{}", tail);
            assert_eq!(
                extract_document(&input),
                "<html><body>content</body>",
                "tail {:?} not stripped",
                tail
            );
        }
    }

    #[test]
    fn test_lowercase_doctype_and_mixed_case_close() {
        let input = "intro <!doctype HTML><body>x</body></HTML> outro";
        assert_eq!(extract_document(input), "<!doctype HTML><body>x</body></HTML>");
    }

    #[test]
    fn test_span_covers_surrounding_text() {
        let input = format!("before {} after", DOC);
        let span = find_document_span(&input).unwrap();
        assert_eq!(&input[..span.start], "before ");
        assert_eq!(&input[span.end..], " after");
    }
}
