//! Backend response parsing.
//!
//! Raw generator output is untrusted: it may be a well-formed JSON document,
//! a fenced or double-encoded one, a truncated fragment, or plain prose.
//! Parsing is an ordered chain of independent strategies; the first one that
//! produces a displayable narrative wins, and a fixed safe message covers
//! everything else.
//!
//! The one guarantee the rest of the system relies on absolutely: the
//! returned `narrative` never starts with a structural delimiter.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// The user-safe narrative substituted when no strategy can extract one.
pub const SAFE_FALLBACK_NARRATIVE: &str =
    "An error occurred generating your story. Please try again.";

// =============================================================================
// Schema Contract
// =============================================================================

/// Field names a backend response is expected to contain.
///
/// Handed to the generation port as a hint and to the parser as the
/// extraction contract; the parser defaults unknown fields to empty.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub narrative_field: String,
    pub state_updates_field: String,
    pub planning_block_field: String,
    pub entities_field: String,
    pub debug_field: String,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            narrative_field: "narrative".into(),
            state_updates_field: "state_updates".into(),
            planning_block_field: "planning_block".into(),
            entities_field: "entities_mentioned".into(),
            debug_field: "debug_info".into(),
        }
    }
}

impl ResponseSchema {
    pub fn field_names(&self) -> [&str; 5] {
        [
            &self.narrative_field,
            &self.state_updates_field,
            &self.planning_block_field,
            &self.entities_field,
            &self.debug_field,
        ]
    }
}

// =============================================================================
// Parsed Response
// =============================================================================

/// Which strategy produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole output was a well-formed document
    Document,
    /// A nested or double-encoded document was recovered
    NestedDocument,
    /// Only the narrative string was salvaged positionally
    Salvage,
    /// Nothing usable; the fixed safe message was substituted
    Fallback,
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseStrategy::Document => write!(f, "document"),
            ParseStrategy::NestedDocument => write!(f, "nested_document"),
            ParseStrategy::Salvage => write!(f, "salvage"),
            ParseStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

/// The parsed, trusted result of one backend reply.
#[derive(Debug, Clone)]
pub struct NarrativeResponse {
    /// Plain display text; never begins with `{` or `[`
    pub narrative: String,
    /// Proposed state deltas, field-path -> value, in deterministic order
    pub state_updates: BTreeMap<String, Value>,
    /// Raw choice text; never exposed past the engine
    pub planning_block: String,
    pub entities_mentioned: Vec<String>,
    pub debug_info: Option<BTreeMap<String, String>>,
    pub strategy: ParseStrategy,
}

impl NarrativeResponse {
    /// True when no strategy could extract real content.
    pub fn is_fallback(&self) -> bool {
        self.strategy == ParseStrategy::Fallback
    }
}

/// True when text would read as a raw data-interchange document.
pub fn starts_with_structural_delimiter(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

// =============================================================================
// Strategy Chain
// =============================================================================

/// Parse raw backend output against the schema contract.
///
/// Strategies run in order, first success wins; each is a pure function of
/// the text. Whatever path is taken, the returned narrative never starts
/// with a structural delimiter.
pub fn parse_backend_output(raw: &str, schema: &ResponseSchema) -> NarrativeResponse {
    let attempts: [(
        ParseStrategy,
        fn(&str, &ResponseSchema) -> Option<NarrativeResponse>,
    ); 3] = [
        (ParseStrategy::Document, parse_document),
        (ParseStrategy::NestedDocument, parse_nested_document),
        (ParseStrategy::Salvage, salvage_narrative),
    ];

    for (strategy, attempt) in attempts {
        if let Some(response) = attempt(raw, schema) {
            if starts_with_structural_delimiter(&response.narrative) {
                tracing::debug!(
                    strategy = %strategy,
                    "extracted narrative still structural, trying next strategy"
                );
                continue;
            }
            return response;
        }
    }

    // Raw output is diagnostic-only; it must never reach a user.
    tracing::debug!(raw = %raw, "all parse strategies failed, substituting safe narrative");
    NarrativeResponse {
        narrative: SAFE_FALLBACK_NARRATIVE.to_string(),
        state_updates: BTreeMap::new(),
        planning_block: String::new(),
        entities_mentioned: Vec::new(),
        debug_info: None,
        strategy: ParseStrategy::Fallback,
    }
}

/// Strategy 1: the entire output is a well-formed document.
fn parse_document(raw: &str, schema: &ResponseSchema) -> Option<NarrativeResponse> {
    let text = strip_code_fences(raw);
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;

    match obj.get(&schema.narrative_field) {
        // Missing narrative defaults to empty; a string narrative is the
        // well-formed case.
        None | Some(Value::String(_)) => {
            Some(extract_fields(obj, schema, ParseStrategy::Document))
        }
        // Structured narrative means double-encoding; let the nested
        // strategy take it apart.
        Some(_) => None,
    }
}

/// Strategy 2: a nested or double-encoded document.
fn parse_nested_document(raw: &str, schema: &ResponseSchema) -> Option<NarrativeResponse> {
    let text = strip_code_fences(raw);

    // Whole output is a JSON string that itself encodes a document.
    if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(text) {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(inner.trim()) {
            let response = extract_fields(&obj, schema, ParseStrategy::NestedDocument);
            if !starts_with_structural_delimiter(&response.narrative) {
                return Some(response);
            }
        }
    }

    // Outer object whose narrative field holds the real document.
    if let Ok(Value::Object(outer)) = serde_json::from_str::<Value>(text) {
        let inner = match outer.get(&schema.narrative_field) {
            Some(Value::Object(inner)) => Some(inner.clone()),
            Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded.trim()) {
                Ok(Value::Object(inner)) => Some(inner),
                _ => None,
            },
            _ => None,
        };
        if let Some(inner) = inner {
            let mut response = extract_fields(&inner, schema, ParseStrategy::NestedDocument);
            fill_missing_from_outer(&mut response, &outer, schema);
            if !starts_with_structural_delimiter(&response.narrative) {
                return Some(response);
            }
        }
    }

    // A document embedded in surrounding prose.
    if let Some(window) = brace_window(text) {
        if window.len() < text.len() {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(window) {
                let response = extract_fields(&obj, schema, ParseStrategy::NestedDocument);
                if !response.narrative.is_empty()
                    && !starts_with_structural_delimiter(&response.narrative)
                {
                    return Some(response);
                }
            }
        }
    }

    None
}

/// Strategy 3: positional salvage of the narrative string value only.
///
/// Handles truncated and near-miss output where the document as a whole no
/// longer parses but the narrative value is still recoverable.
fn salvage_narrative(raw: &str, schema: &ResponseSchema) -> Option<NarrativeResponse> {
    let narrative = extract_string_field(raw, &schema.narrative_field)?;
    let narrative = narrative.trim().to_string();
    if narrative.is_empty() || starts_with_structural_delimiter(&narrative) {
        return None;
    }

    Some(NarrativeResponse {
        narrative,
        state_updates: BTreeMap::new(),
        planning_block: String::new(),
        entities_mentioned: Vec::new(),
        debug_info: None,
        strategy: ParseStrategy::Salvage,
    })
}

// =============================================================================
// Extraction Helpers
// =============================================================================

fn extract_fields(
    obj: &Map<String, Value>,
    schema: &ResponseSchema,
    strategy: ParseStrategy,
) -> NarrativeResponse {
    let narrative = obj
        .get(&schema.narrative_field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let state_updates = obj
        .get(&schema.state_updates_field)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let planning_block = obj
        .get(&schema.planning_block_field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let entities_mentioned = obj
        .get(&schema.entities_field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let debug_info = obj.get(&schema.debug_field).and_then(Value::as_object).map(|map| {
        map.iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), rendered)
            })
            .collect::<BTreeMap<_, _>>()
    });

    NarrativeResponse {
        narrative,
        state_updates,
        planning_block,
        entities_mentioned,
        debug_info,
        strategy,
    }
}

/// Carry planning/updates/entities from the outer envelope when the inner
/// document lacks them.
fn fill_missing_from_outer(
    response: &mut NarrativeResponse,
    outer: &Map<String, Value>,
    schema: &ResponseSchema,
) {
    if response.planning_block.is_empty() {
        if let Some(Value::String(block)) = outer.get(&schema.planning_block_field) {
            response.planning_block = block.clone();
        }
    }
    if response.state_updates.is_empty() {
        if let Some(Value::Object(map)) = outer.get(&schema.state_updates_field) {
            response.state_updates = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
    }
    if response.entities_mentioned.is_empty() {
        if let Some(Value::Array(items)) = outer.get(&schema.entities_field) {
            response.entities_mentioned = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
    }
}

/// Strip a surrounding markdown code fence if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// The widest `{...}` window in the text, if any.
fn brace_window(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Positionally extract a JSON string value by field name, tolerating a
/// missing closing quote (truncated output). JSON escapes are decoded.
fn extract_string_field(raw: &str, field: &str) -> Option<String> {
    let needle = format!("\"{}\"", field);
    let at = raw.find(&needle)?;
    let rest = raw[at + needle.len()..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;

    let mut out = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('/') => out.push('/'),
                Some('u') => {
                    let code: String = chars.by_ref().take(4).collect();
                    if let Some(decoded) =
                        u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
                    {
                        out.push(decoded);
                    }
                }
                Some(other) => out.push(other),
                None => break,
            },
            _ => out.push(c),
        }
    }
    // No closing quote: the value was truncated mid-string.
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ResponseSchema {
        ResponseSchema::default()
    }

    // =========================================================================
    // Strategy 1: Well-Formed Documents
    // =========================================================================

    #[test]
    fn parses_well_formed_document() {
        let raw = r#"{
            "narrative": "The cell door groans open.",
            "state_updates": {"location": "Corridor"},
            "planning_block": "1. **Run** - Sprint for the stairs",
            "entities_mentioned": ["Knight"],
            "debug_info": {"dice": "14"}
        }"#;

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::Document);
        assert_eq!(response.narrative, "The cell door groans open.");
        assert_eq!(
            response.state_updates.get("location"),
            Some(&serde_json::json!("Corridor"))
        );
        assert!(response.planning_block.contains("**Run**"));
        assert_eq!(response.entities_mentioned, vec!["Knight".to_string()]);
        assert_eq!(
            response.debug_info.and_then(|d| d.get("dice").cloned()),
            Some("14".to_string())
        );
    }

    #[test]
    fn parses_fenced_document() {
        let raw = "```json\n{\"narrative\": \"Rain hammers the roof.\"}\n```";

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::Document);
        assert_eq!(response.narrative, "Rain hammers the roof.");
    }

    #[test]
    fn unknown_fields_default_to_empty() {
        let raw = r#"{"narrative": "A quiet moment."}"#;

        let response = parse_backend_output(raw, &schema());

        assert!(response.state_updates.is_empty());
        assert!(response.planning_block.is_empty());
        assert!(response.entities_mentioned.is_empty());
        assert!(response.debug_info.is_none());
    }

    // =========================================================================
    // Strategy 2: Nested / Double-Encoded Documents
    // =========================================================================

    #[test]
    fn parses_double_encoded_whole_document() {
        let inner = r#"{"narrative": "The torch gutters out."}"#;
        let raw = serde_json::to_string(inner).expect("encode test input");

        let response = parse_backend_output(&raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::NestedDocument);
        assert_eq!(response.narrative, "The torch gutters out.");
    }

    #[test]
    fn parses_document_nested_inside_narrative_field() {
        let raw = r#"{
            "narrative": {"narrative": "You hear footsteps above.", "planning_block": "1. Hide"},
            "entities_mentioned": ["Warden"]
        }"#;

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::NestedDocument);
        assert_eq!(response.narrative, "You hear footsteps above.");
        assert_eq!(response.planning_block, "1. Hide");
        // Outer envelope fills fields the inner document lacks.
        assert_eq!(response.entities_mentioned, vec!["Warden".to_string()]);
    }

    #[test]
    fn parses_string_encoded_narrative_field() {
        let raw = r#"{"narrative": "{\"narrative\": \"Dust swirls in the lantern light.\"}"}"#;

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::NestedDocument);
        assert_eq!(response.narrative, "Dust swirls in the lantern light.");
    }

    #[test]
    fn parses_document_embedded_in_prose() {
        let raw = concat!(
            "Here is the turn result you asked for:\n",
            "{\"narrative\": \"The guard waves you through.\"}\n",
            "Let me know if you need anything else."
        );

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::NestedDocument);
        assert_eq!(response.narrative, "The guard waves you through.");
    }

    // =========================================================================
    // Strategy 3: Positional Salvage
    // =========================================================================

    #[test]
    fn salvages_narrative_from_truncated_document() {
        let raw = r#"{"narrative": "The bridge sways under your we"#;

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::Salvage);
        assert_eq!(response.narrative, "The bridge sways under your we");
        assert!(response.state_updates.is_empty());
    }

    #[test]
    fn salvage_decodes_json_escapes() {
        let raw = r#"{"narrative": "She says: \"wait here\".\nThen silence.", "state_updates": {broken"#;

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::Salvage);
        assert_eq!(response.narrative, "She says: \"wait here\".\nThen silence.");
    }

    // =========================================================================
    // Strategy 4: Safe Fallback
    // =========================================================================

    #[test]
    fn plain_prose_falls_back_to_safe_message() {
        let raw = "The knight draws his sword and the scene continues.";

        let response = parse_backend_output(raw, &schema());

        assert_eq!(response.strategy, ParseStrategy::Fallback);
        assert_eq!(response.narrative, SAFE_FALLBACK_NARRATIVE);
        assert!(response.is_fallback());
    }

    #[test]
    fn empty_input_falls_back_to_safe_message() {
        let response = parse_backend_output("", &schema());
        assert!(response.is_fallback());
        assert_eq!(response.narrative, SAFE_FALLBACK_NARRATIVE);
    }

    // =========================================================================
    // The Delimiter Invariant
    // =========================================================================

    #[test]
    fn narrative_never_starts_with_structural_delimiter() {
        // Every shape the backend has been seen to produce, plus abuse.
        let inputs = [
            r#"{"narrative": "Safe text."}"#,
            r#"{"narrative": "{\"narrative\": \"inner\"}"}"#,
            r#"{"narrative": {"narrative": "deep"}}"#,
            r#"{"narrative": "[1, 2, 3]"}"#,
            r#"{"narrative": "truncat"#,
            r#"{"state_updates": {"location": "Hall"}}"#,
            r#"["not", "an", "object"]"#,
            "```json\n{\"narrative\": \"fenced\"}\n```",
            "plain prose with no structure at all",
            "",
            "   ",
            "{{{{",
            r#"{"narrative": ""}"#,
        ];

        for input in inputs {
            let response = parse_backend_output(input, &schema());
            assert!(
                !starts_with_structural_delimiter(&response.narrative),
                "invariant violated for input: {input:?} -> {:?}",
                response.narrative
            );
        }
    }

    #[test]
    fn structural_narrative_string_is_not_forwarded() {
        // The narrative value itself is a JSON array rendered as a string;
        // forwarding it would leak structure to the user.
        let raw = r#"{"narrative": "[\"a\", \"b\"]"}"#;

        let response = parse_backend_output(raw, &schema());

        assert!(!starts_with_structural_delimiter(&response.narrative));
        assert_eq!(response.narrative, SAFE_FALLBACK_NARRATIVE);
    }

    // =========================================================================
    // Custom Schema
    // =========================================================================

    #[test]
    fn honors_custom_field_names() {
        let custom = ResponseSchema {
            narrative_field: "story".into(),
            ..ResponseSchema::default()
        };
        let raw = r#"{"story": "A custom-keyed tale."}"#;

        let response = parse_backend_output(raw, &custom);

        assert_eq!(response.narrative, "A custom-keyed tale.");
    }
}
