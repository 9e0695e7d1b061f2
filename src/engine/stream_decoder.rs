//! Incremental decoder for the narrator's structured document.
//!
//! The narrator streams one JSON object (`thought`, `narrative`, `mood`,
//! `suggestions`, `metadata`) split at arbitrary points. After every chunk
//! the accumulated text is parsed, or syntactically closed when it is still
//! incomplete, and only the fields that changed are handed back.

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::narrative::{NarrativePatch, PartialNarrative, StructuredNarrative};

/// Upper bound on cut-back attempts per repair.
const MAX_REPAIR_ATTEMPTS: usize = 64;

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: String,
    emitted: PartialNarrative,
    last_valid: Option<PartialNarrative>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received since the last reset.
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.emitted = PartialNarrative::default();
        self.last_valid = None;
    }

    pub fn append(&mut self, chunk: &str) -> Option<NarrativePatch> {
        if chunk.is_empty() {
            return None;
        }
        self.buffer.push_str(chunk);

        let doc = document(&self.buffer)?;
        let value = parse_strict(doc).or_else(|| repair(doc))?;
        let partial = PartialNarrative::from_value(&value)?;

        let patch = self.diff(&partial);
        self.last_valid = Some(partial);
        (!patch.is_empty()).then_some(patch)
    }

    /// Strict parse of everything received, then a repair of it, then the
    /// last partial state that decoded. `None` when none of them carries a
    /// non-empty narrative.
    pub fn finalize(&self) -> Option<StructuredNarrative> {
        let doc = document(&self.buffer);

        if let Some(doc) = doc {
            if let Some(done) = parse_strict(doc).and_then(|v| structured(&v)) {
                return Some(done);
            }
            if let Some(done) = repair(doc).and_then(|v| structured(&v)) {
                warn!(bytes = self.buffer.len(), "narrator document was incomplete, repaired");
                return Some(done);
            }
        }

        let fallback = self.last_valid.clone().and_then(|p| p.into_structured());
        if fallback.is_some() {
            warn!("narrator document undecodable, using last partial state");
        }
        fallback
    }

    fn diff(&mut self, next: &PartialNarrative) -> NarrativePatch {
        let mut patch = NarrativePatch::default();

        // Narrative only ever grows on the wire.
        if let Some(text) = &next.narrative {
            let shown = self
                .emitted
                .narrative
                .as_ref()
                .map_or(0, |n| n.chars().count());
            if text.chars().count() > shown {
                patch.narrative = Some(text.clone());
                self.emitted.narrative = Some(text.clone());
            }
        }

        if next.thought.is_some() && next.thought != self.emitted.thought {
            patch.thought = next.thought.clone();
            self.emitted.thought = next.thought.clone();
        }
        if next.mood.is_some() && next.mood != self.emitted.mood {
            patch.mood = next.mood;
            self.emitted.mood = next.mood;
        }
        if next.suggestions.is_some() && next.suggestions != self.emitted.suggestions {
            patch.suggestions = next.suggestions.clone();
            self.emitted.suggestions = next.suggestions.clone();
        }
        if next.metadata.is_some() && next.metadata != self.emitted.metadata {
            patch.metadata = next.metadata.clone();
            self.emitted.metadata = next.metadata.clone();
        }

        if !patch.is_empty() {
            debug!(
                narrative_chars = self.emitted.narrative.as_ref().map_or(0, |n| n.chars().count()),
                "narrative patch"
            );
        }
        patch
    }
}

fn structured(value: &Value) -> Option<StructuredNarrative> {
    PartialNarrative::from_value(value)?.into_structured()
}

/// The document starts at the first `{`; code fences or chatter before it are ignored.
fn document(buffer: &str) -> Option<&str> {
    buffer.find('{').map(|start| &buffer[start..])
}

/// First complete JSON value in `doc`; trailing text such as a closing fence is ignored.
fn parse_strict(doc: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(doc)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

#[derive(Debug, Default)]
struct Scan {
    in_string: bool,
    /// Containers still open, innermost last.
    open: Vec<char>,
    /// Where to truncate so the text does not end inside an escape sequence.
    safe_end: usize,
    /// Byte offsets that are syntactically safe to cut back to: commas
    /// outside strings (cut before them) and just after an opening bracket.
    cuts: Vec<usize>,
}

fn scan(text: &str) -> Scan {
    let mut state = Scan {
        safe_end: text.len(),
        ..Default::default()
    };

    let mut escape_at: Option<usize> = None;
    let mut unicode_left = 0usize;
    let mut unicode_digits = String::new();
    // A lone high surrogate at the very end cannot be decoded yet.
    let mut high_surrogate_at: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if state.in_string {
            if unicode_left > 0 {
                unicode_digits.push(c);
                unicode_left -= 1;
                if unicode_left == 0 {
                    let start = escape_at.take().unwrap_or(i);
                    match u16::from_str_radix(&unicode_digits, 16) {
                        Ok(code) if (0xD800..=0xDBFF).contains(&code) => {
                            high_surrogate_at = Some(start);
                        }
                        _ => high_surrogate_at = None,
                    }
                    unicode_digits.clear();
                }
                continue;
            }
            if escape_at.is_some() {
                if c == 'u' {
                    unicode_left = 4;
                } else {
                    escape_at = None;
                    high_surrogate_at = None;
                }
                continue;
            }
            match c {
                '\\' => escape_at = Some(i),
                '"' => {
                    state.in_string = false;
                    high_surrogate_at = None;
                }
                _ => high_surrogate_at = None,
            }
            continue;
        }

        match c {
            '"' => state.in_string = true,
            '{' | '[' => {
                state.open.push(c);
                state.cuts.push(i + 1);
            }
            '}' | ']' => {
                state.open.pop();
            }
            ',' => state.cuts.push(i),
            _ => {}
        }
    }

    if state.in_string {
        if let Some(start) = high_surrogate_at.or(escape_at) {
            state.safe_end = start;
        }
    }
    state
}

/// Closes what is open at the end of `text`. Never invents a value.
fn close(text: &str, scan: &Scan) -> String {
    let mut out = text[..scan.safe_end].to_string();
    if scan.in_string {
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }

    for open in scan.open.iter().rev() {
        out.push(if *open == '{' { '}' } else { ']' });
    }
    out
}

/// Bounded syntactic repair: close the open string and containers, and when
/// the tail still does not parse (a dangling key, a half-written literal)
/// cut back to the previous safe point and try again.
fn repair(doc: &str) -> Option<Value> {
    let mut end = doc.len();
    let mut cuts: Option<Vec<usize>> = None;

    for _ in 0..MAX_REPAIR_ATTEMPTS {
        let text = &doc[..end];
        let state = scan(text);
        let candidate = close(text, &state);
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Some(value);
        }

        let points = cuts.get_or_insert_with(|| state.cuts.clone());
        loop {
            let next = points.pop()?;
            if next < end {
                end = next;
                break;
            }
        }
    }
    None
}
