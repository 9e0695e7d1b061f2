//! Plain-text fallback for narrator output that never decoded as a document.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{error, warn};

use crate::model::narrative::{normalize_suggestions, StructuredNarrative};

/// Longest text an option line may carry.
const MAX_OPTION_CHARS: usize = 40;

/// Whole-line option shapes. `text` captures the choice itself.
const OPTION_PATTERNS: &[(&str, &str)] = &[
    ("bullet", r"^[-*•·]\s*(?P<text>\S.*)$"),
    ("numbered", r"^(?:[0-9]{1,2}|[A-Za-z])[.)、．]\s*(?P<text>\S.*)$"),
];

/// One or more bracketed tokens filling the whole line.
const BRACKET_LINE: &str = r"^(?:\s*(?:\[[^\[\]]+\]|【[^【】]+】|「[^「」]+」))+\s*$";
const BRACKET_TOKEN: &str = r"\[(?P<a>[^\[\]]+)\]|【(?P<b>[^【】]+)】|「(?P<c>[^「」]+)」";

/// A question put to the player right above the options.
const PROMPT_PATTERNS: &[&str] = &[
    r"[?？:：]\s*$",
    r"(?i)what (?:will|do|would) you do",
    r"你(?:要|想|会|打算)",
    r"请选择",
];

/// `"narrative": "..."` left behind in otherwise broken JSON.
const EMBEDDED_NARRATIVE: &str = r#""narrative"\s*:\s*"(?P<text>(?:[^"\\]|\\.)*)"#;

struct Patterns {
    options: Vec<Regex>,
    bracket_line: Option<Regex>,
    bracket_token: Option<Regex>,
    prompts: Vec<Regex>,
    embedded: Option<Regex>,
}

fn compile(label: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            error!(label, error = %err, "fallback pattern failed to compile, skipping");
            None
        }
    }
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        options: OPTION_PATTERNS
            .iter()
            .filter_map(|(label, p)| compile(label, p))
            .collect(),
        bracket_line: compile("bracket_line", BRACKET_LINE),
        bracket_token: compile("bracket_token", BRACKET_TOKEN),
        prompts: PROMPT_PATTERNS
            .iter()
            .filter_map(|p| compile("prompt", p))
            .collect(),
        embedded: compile("embedded_narrative", EMBEDDED_NARRATIVE),
    })
}

fn short(text: &str) -> bool {
    let n = text.trim().chars().count();
    n > 0 && n <= MAX_OPTION_CHARS
}

/// The choices on one line, or `None` when the line is not wholly options.
fn option_tokens(line: &str) -> Option<Vec<String>> {
    let p = patterns();

    if let (Some(line_re), Some(token_re)) = (&p.bracket_line, &p.bracket_token) {
        if line_re.is_match(line) {
            let tokens: Vec<String> = token_re
                .captures_iter(line)
                .filter_map(|c| c.name("a").or(c.name("b")).or(c.name("c")))
                .map(|m| m.as_str().trim().to_string())
                .collect();
            if !tokens.is_empty() && tokens.iter().all(|t| short(t)) {
                return Some(tokens);
            }
            return None;
        }
    }

    for re in &p.options {
        if let Some(text) = re.captures(line).and_then(|c| c.name("text")) {
            let text = text.as_str().trim();
            return short(text).then(|| vec![text.to_string()]);
        }
    }
    None
}

fn is_prompt(line: &str) -> bool {
    patterns().prompts.iter().any(|re| re.is_match(line))
}

fn embedded_narrative(raw: &str) -> Option<String> {
    let captured = patterns().embedded.as_ref()?.captures(raw)?.name("text")?;
    let text: String = serde_json::from_str(&format!("\"{}\"", captured.as_str())).ok()?;
    (!text.trim().is_empty()).then(|| text.trim().to_string())
}

/// Best-effort narrative from raw text. Only `None` for blank input.
///
/// Lines are scanned from the bottom: option lines are peeled into
/// suggestions, and a prompt line directly above them is dropped. The scan
/// stops at the first other line and everything above is the narrative.
pub fn extract_plain_text(raw: &str) -> Option<StructuredNarrative> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(narrative) = embedded_narrative(text) {
        warn!("recovered narrative field from malformed document");
        return Some(StructuredNarrative::plain(narrative));
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut options: Vec<String> = Vec::new();
    let mut keep = lines.len();
    let mut idx = lines.len();

    while idx > 0 {
        let line = lines[idx - 1].trim();
        if line.is_empty() {
            idx -= 1;
            continue;
        }
        if let Some(tokens) = option_tokens(line) {
            options.splice(0..0, tokens);
            idx -= 1;
            keep = idx;
            continue;
        }
        if !options.is_empty() && is_prompt(line) {
            keep = idx - 1;
        }
        break;
    }

    let suggestions = normalize_suggestions(options);
    if suggestions.is_none() {
        return Some(StructuredNarrative::plain(text));
    }

    let narrative = lines[..keep].join("\n").trim().to_string();
    let narrative = if narrative.is_empty() {
        text.to_string()
    } else {
        narrative
    };

    Some(StructuredNarrative {
        suggestions,
        ..StructuredNarrative::plain(narrative)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        let p = patterns();
        assert_eq!(p.options.len(), OPTION_PATTERNS.len());
        assert_eq!(p.prompts.len(), PROMPT_PATTERNS.len());
        assert!(p.bracket_line.is_some() && p.bracket_token.is_some() && p.embedded.is_some());
    }

    #[test]
    fn bracketed_options_and_prompt_are_peeled() {
        let raw = "The bridge sways above the gorge.\nWhat will you do?\n[Cross carefully]\n[Turn back]";
        let out = extract_plain_text(raw).unwrap();
        assert_eq!(out.narrative, "The bridge sways above the gorge.");
        assert_eq!(
            out.suggestions.unwrap(),
            vec!["Cross carefully", "Turn back"]
        );
    }

    #[test]
    fn options_on_one_line_and_cjk_brackets() {
        let out = extract_plain_text("风声渐紧。\n你要怎么做？\n【拔剑】【后退】「观察」").unwrap();
        assert_eq!(out.narrative, "风声渐紧。");
        assert_eq!(out.suggestions.unwrap(), vec!["拔剑", "后退", "观察"]);
    }

    #[test]
    fn numbered_list_is_capped() {
        let raw = "A fork in the road.\n1. Go left\n2. Go right\n3. Wait\n4. Camp\n5. Sing";
        let out = extract_plain_text(raw).unwrap();
        assert_eq!(out.narrative, "A fork in the road.");
        assert_eq!(out.suggestions.unwrap().len(), 4);
    }

    #[test]
    fn prompt_without_options_stays_in_narrative() {
        let raw = "The innkeeper eyes you.\nWhat will you do?";
        let out = extract_plain_text(raw).unwrap();
        assert_eq!(out.narrative, raw);
        assert!(out.suggestions.is_none());
    }

    #[test]
    fn a_single_option_is_not_peeled() {
        let raw = "You wait.\n- Keep waiting";
        let out = extract_plain_text(raw).unwrap();
        assert_eq!(out.narrative, raw);
        assert!(out.suggestions.is_none());
    }

    #[test]
    fn long_bullets_are_prose() {
        let raw = "Notes:\n- this bullet is much too long to be a choice offered to the player\n- so is this one, it keeps going well past the limit";
        let out = extract_plain_text(raw).unwrap();
        assert_eq!(out.narrative, raw);
    }

    #[test]
    fn narrative_field_is_recovered_from_broken_json() {
        let out = extract_plain_text(r#"{"narrative": "Snow falls.\nQuietly.", "mood": ??? }"#).unwrap();
        assert_eq!(out.narrative, "Snow falls.\nQuietly.");
    }

    #[test]
    fn blank_input_gives_nothing() {
        assert!(extract_plain_text("  \n ").is_none());
    }

    #[test]
    fn options_only_keep_full_text_as_narrative() {
        let out = extract_plain_text("[Fight]\n[Run]").unwrap();
        assert_eq!(out.narrative, "[Fight]\n[Run]");
        assert_eq!(out.suggestions.unwrap(), vec!["Fight", "Run"]);
    }
}
