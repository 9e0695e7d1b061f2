use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MIN_SUGGESTIONS: usize = 2;
pub const MAX_SUGGESTIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Calm,
    Tense,
    Excited,
    Mysterious,
    Sad,
    Joyful,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_prompt: Option<String>,
    /// Anything else the narrator attached, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded output of one narrator turn.
/// This does NOT mutate state; it only describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredNarrative {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NarrativeMetadata>,
}

impl StructuredNarrative {
    pub fn plain(narrative: impl Into<String>) -> Self {
        Self {
            thought: None,
            narrative: narrative.into(),
            mood: None,
            suggestions: None,
            metadata: None,
        }
    }
}

/// Best-effort view of a possibly incomplete narrator document.
/// Every field is read leniently; a malformed field is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialNarrative {
    pub thought: Option<String>,
    pub narrative: Option<String>,
    pub mood: Option<Mood>,
    pub suggestions: Option<Vec<String>>,
    pub metadata: Option<NarrativeMetadata>,
}

impl PartialNarrative {
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        let suggestions = object.get("suggestions").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        Some(Self {
            thought: text("thought"),
            narrative: text("narrative"),
            mood: object
                .get("mood")
                .and_then(|m| serde_json::from_value(m.clone()).ok()),
            suggestions,
            metadata: object
                .get("metadata")
                .filter(|m| m.is_object())
                .and_then(|m| serde_json::from_value(m.clone()).ok()),
        })
    }

    /// Validates into the wire shape: narrative must be non-empty,
    /// suggestions are trimmed and kept only when 2 to 4 remain.
    pub fn into_structured(self) -> Option<StructuredNarrative> {
        let narrative = self.narrative?;
        if narrative.trim().is_empty() {
            return None;
        }

        Some(StructuredNarrative {
            thought: self.thought.filter(|t| !t.trim().is_empty()),
            narrative,
            mood: self.mood,
            suggestions: self.suggestions.and_then(normalize_suggestions),
            metadata: self.metadata,
        })
    }
}

pub fn normalize_suggestions(raw: Vec<String>) -> Option<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for s in raw {
        let s = s.trim();
        if s.is_empty() || out.iter().any(|o| o == s) {
            continue;
        }
        out.push(s.to_string());
    }
    out.truncate(MAX_SUGGESTIONS);
    (out.len() >= MIN_SUGGESTIONS).then_some(out)
}

/// Only the fields that changed since the previous patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NarrativeMetadata>,
}

impl NarrativePatch {
    pub fn is_empty(&self) -> bool {
        self.thought.is_none()
            && self.narrative.is_none()
            && self.mood.is_none()
            && self.suggestions.is_none()
            && self.metadata.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_mood_is_dropped_not_fatal() {
        let partial = PartialNarrative::from_value(&json!({
            "narrative": "The gate creaks.",
            "mood": "furious"
        }))
        .unwrap();
        let structured = partial.into_structured().unwrap();
        assert_eq!(structured.mood, None);
        assert_eq!(structured.narrative, "The gate creaks.");
    }

    #[test]
    fn blank_narrative_is_rejected() {
        let partial = PartialNarrative::from_value(&json!({ "narrative": "   " })).unwrap();
        assert!(partial.into_structured().is_none());
    }

    #[test]
    fn suggestions_are_capped_and_deduplicated() {
        let out = normalize_suggestions(
            ["a", "b", "a", " ", "c", "d", "e"].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        assert_eq!(out, vec!["a", "b", "c", "d"]);
        assert!(normalize_suggestions(vec!["only".into()]).is_none());
    }

    #[test]
    fn metadata_keeps_unknown_keys() {
        let partial = PartialNarrative::from_value(&json!({
            "narrative": "x",
            "metadata": { "bgm": "rain", "scenePrompt": "a wet alley", "weather": "storm" }
        }))
        .unwrap();
        let meta = partial.metadata.unwrap();
        assert_eq!(meta.bgm.as_deref(), Some("rain"));
        assert_eq!(meta.scene_prompt.as_deref(), Some("a wet alley"));
        assert_eq!(meta.extra.get("weather"), Some(&json!("storm")));
    }
}
