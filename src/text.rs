//! Input validation and best-effort decoding of model output.
//!
//! The model replies in free text; the decoders here extract structure when
//! recognizable patterns are present and degrade to empty fields when they
//! are not. A parse miss is expected behavior, never an error.

use regex_lite::Regex;

pub const MAX_PROMPT_LENGTH: usize = 10_000;

const INJECTION_PATTERNS: [&str; 4] = [
    r"(?i)<script",
    r"(?i)javascript:",
    r"(?i)eval\s*\(",
    r"(?i)exec\s*\(",
];

/// Whether a user-supplied prompt is acceptable: non-empty after trimming,
/// within bounds, and free of obvious script-injection patterns.
pub fn validate_prompt(prompt: &str) -> bool {
    if prompt.trim().is_empty() || prompt.len() > MAX_PROMPT_LENGTH {
        return false;
    }

    !INJECTION_PATTERNS.iter().any(|pattern| {
        Regex::new(pattern)
            .map(|re| re.is_match(prompt))
            .unwrap_or(false)
    })
}

/// Strip script fragments and normalize whitespace.
pub fn sanitize_input(text: &str) -> String {
    let mut cleaned = text.to_owned();
    for pattern in [r"(?is)<script.*?>.*?</script>", r"(?i)javascript:"] {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean up a free-text model reply for display.
pub fn format_response(response: &str) -> String {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return "No response generated.".to_owned();
    }

    let mut formatted = String::with_capacity(trimmed.len());
    let mut blank_run = 0usize;
    for line in trimmed.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !formatted.is_empty() {
            formatted.push('\n');
        }
        formatted.push_str(line);
    }

    if !formatted.ends_with(['.', '!', '?']) {
        formatted.push('.');
    }

    formatted
}

/// Extract a numerical score from text, clamped to 1..=10. `None` when no
/// score pattern is present.
pub fn extract_score(text: &str) -> Option<u8> {
    let patterns = [
        r"(?i)(?:score|rating):\s*(\d+)",
        r"(?i)(\d+)\s*(?:out\s*of\s*10|/10)",
        r"(?i)(\d+)\s*(?:points?|stars?)",
    ];

    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(captures) = re.captures(text) {
            if let Some(score) = captures.get(1).and_then(|m| m.as_str().parse::<i64>().ok())
            {
                return Some(score.clamp(1, 10) as u8);
            }
        }
    }

    None
}

/// Whether a line looks like a section header (`Strengths:`, `## Insights`).
fn is_header_line(line: &str) -> bool {
    let stripped = strip_decorations(line);
    !stripped.is_empty() && stripped.len() <= 60 && stripped.ends_with(':')
}

fn strip_decorations(line: &str) -> &str {
    line.trim().trim_start_matches(['#', '*', '-']).trim()
}

/// Collect the body of the first section whose header matches one of the
/// given aliases, stopping at the next header-looking line.
pub fn extract_section(text: &str, aliases: &[&str]) -> Option<String> {
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let stripped = strip_decorations(line);
        let lowered = stripped.to_lowercase();
        let matched = aliases.iter().find_map(|alias| {
            lowered
                .starts_with(&alias.to_lowercase())
                .then(|| stripped.len() >= alias.len())
        });
        if matched != Some(true) {
            continue;
        }

        // Inline content after the colon belongs to the section too.
        let mut body = Vec::new();
        if let Some((_, inline)) = stripped.split_once(':') {
            if !inline.trim().is_empty() {
                body.push(inline.trim().to_owned());
            }
        }

        for next in lines.by_ref() {
            if is_header_line(next) {
                break;
            }
            body.push(next.to_owned());
        }

        let joined = body.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_owned());
        }
        return None;
    }

    None
}

/// Split section text into list items, stripping bullets and numbering.
pub fn parse_list_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();

    for line in text.lines() {
        let mut line = line.trim();
        line = line.trim_start_matches(['-', '•', '*']).trim_start();
        // Numbered list indicator, e.g. "1. ".
        if let Some(rest) = line
            .split_once(". ")
            .filter(|(head, _)| head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty())
            .map(|(_, rest)| rest)
        {
            line = rest;
        }
        if !line.is_empty() {
            items.push(line.to_owned());
        }
    }

    if items.is_empty() && !text.trim().is_empty() {
        items.push(text.trim().to_owned());
    }

    items
}

/// Extract list items under the first matching section header; empty when
/// the section is absent.
pub fn extract_section_items(text: &str, aliases: &[&str]) -> Vec<String> {
    extract_section(text, aliases)
        .map(|body| parse_list_items(&body))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_prompt_rejects_empty_and_oversized() {
        assert!(!validate_prompt(""));
        assert!(!validate_prompt("   "));
        assert!(!validate_prompt(&"a".repeat(MAX_PROMPT_LENGTH + 1)));
        assert!(validate_prompt("Tell me about ownership in Rust"));
    }

    #[test]
    fn test_validate_prompt_rejects_injection() {
        assert!(!validate_prompt("<script>alert(1)</script>"));
        assert!(!validate_prompt("click javascript:void(0)"));
        assert!(!validate_prompt("eval (payload)"));
    }

    #[test]
    fn test_sanitize_strips_scripts_and_collapses_whitespace() {
        assert_eq!(
            sanitize_input("hello   <script>bad()</script>  world"),
            "hello world"
        );
        assert_eq!(sanitize_input("a\n\n  b"), "a b");
    }

    #[test]
    fn test_format_response_terminates_sentences() {
        assert_eq!(format_response("Looks good"), "Looks good.");
        assert_eq!(format_response("Done!"), "Done!");
        assert_eq!(format_response(""), "No response generated.");
    }

    #[test]
    fn test_extract_score_patterns() {
        assert_eq!(extract_score("Score: 8/10 overall"), Some(8));
        assert_eq!(extract_score("I'd give this 7 out of 10"), Some(7));
        assert_eq!(extract_score("rating: 9"), Some(9));
        assert_eq!(extract_score("solid answer, no numbers here"), None);
    }

    #[test]
    fn test_extract_score_is_clamped() {
        assert_eq!(extract_score("Score: 15/10"), Some(10));
        assert_eq!(extract_score("Score: 0/10"), Some(1));
    }

    #[test]
    fn test_extract_section_items() {
        let reply = "Overall a good answer.\n\
                     Strengths:\n- clear structure\n- concrete examples\n\
                     Areas for improvement:\n- too long\n\
                     Suggestions: practice brevity";

        assert_eq!(
            extract_section_items(reply, &["strengths"]),
            vec!["clear structure", "concrete examples"]
        );
        assert_eq!(
            extract_section_items(reply, &["improvements", "areas for improvement"]),
            vec!["too long"]
        );
        assert_eq!(
            extract_section_items(reply, &["suggestions"]),
            vec!["practice brevity"]
        );
    }

    #[test]
    fn test_missing_sections_degrade_to_empty() {
        let reply = "Just a plain paragraph with no headers at all.";
        assert!(extract_section_items(reply, &["insights"]).is_empty());
        assert!(extract_section_items(reply, &["recommendations"]).is_empty());
    }

    #[test]
    fn test_parse_list_items_strips_numbering() {
        let items = parse_list_items("1. first\n2. second\n• third");
        assert_eq!(items, vec!["first", "second", "third"]);
    }
}
