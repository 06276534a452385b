//! Merge policy registry.
//!
//! Field-specific merge behavior is dispatched by field-path pattern from a
//! single auditable registry instead of special-cased branches scattered
//! through the merger. Patterns are dot-paths; `*` matches exactly one
//! segment.

/// How a proposed update is applied to its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Hard replace of the existing value
    Replace,
    /// Concatenate onto an existing list
    AppendList,
    /// Concatenate onto an existing string
    AppendString,
    /// Additive-only: an update that would shrink or replace is rejected
    ProtectedAdditive,
    /// Id-keyed coercion between dict and list record shapes
    ShapeCoerce,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::Replace => write!(f, "replace"),
            MergePolicy::AppendList => write!(f, "append_list"),
            MergePolicy::AppendString => write!(f, "append_string"),
            MergePolicy::ProtectedAdditive => write!(f, "protected_additive"),
            MergePolicy::ShapeCoerce => write!(f, "shape_coerce"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Wildcard,
}

/// A dot-path pattern such as `entities.*.inventory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPattern {
    segments: Vec<PatternSegment>,
}

impl FieldPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|segment| {
                if segment == "*" {
                    PatternSegment::Wildcard
                } else {
                    PatternSegment::Literal(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &[&str]) -> bool {
        if self.segments.len() != path.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(path.iter())
            .all(|(segment, part)| match segment {
                PatternSegment::Wildcard => true,
                PatternSegment::Literal(lit) => lit == part,
            })
    }
}

/// Ordered pattern -> policy rules; first match wins.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    rules: Vec<(FieldPattern, MergePolicy)>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, pattern: &str, policy: MergePolicy) -> Self {
        self.rules.push((FieldPattern::parse(pattern), policy));
        self
    }

    pub fn resolve(&self, path: &[&str]) -> Option<MergePolicy> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| *policy)
    }

    /// The campaign state policy table.
    ///
    /// Fields not listed here get the default behavior: recursive key-by-key
    /// merge for dict values, replace for scalars and lists, with dict/list
    /// shape drift coerced rather than overwritten.
    pub fn campaign_defaults() -> Self {
        Self::new()
            // Narrative memories are campaign history; they only ever grow.
            .with_rule("core_memories", MergePolicy::ProtectedAdditive)
            // Id-keyed record collections the generator renders as either a
            // dict keyed by id or a list of records, turn by turn.
            .with_rule("entities", MergePolicy::ShapeCoerce)
            .with_rule("missions", MergePolicy::ShapeCoerce)
            // Scene location and combat swap wholesale.
            .with_rule("location", MergePolicy::Replace)
            .with_rule("combat", MergePolicy::Replace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_exact_path() {
        let pattern = FieldPattern::parse("core_memories");
        assert!(pattern.matches(&["core_memories"]));
        assert!(!pattern.matches(&["core_memories", "0"]));
        assert!(!pattern.matches(&["missions"]));
    }

    #[test]
    fn wildcard_matches_exactly_one_segment() {
        let pattern = FieldPattern::parse("entities.*.inventory");
        assert!(pattern.matches(&["entities", "3", "inventory"]));
        assert!(pattern.matches(&["entities", "knight", "inventory"]));
        assert!(!pattern.matches(&["entities", "inventory"]));
        assert!(!pattern.matches(&["entities", "3", "status", "inventory"]));
    }

    #[test]
    fn first_matching_rule_wins() {
        let registry = PolicyRegistry::new()
            .with_rule("entities.*", MergePolicy::Replace)
            .with_rule("entities.0", MergePolicy::ShapeCoerce);
        assert_eq!(
            registry.resolve(&["entities", "0"]),
            Some(MergePolicy::Replace)
        );
    }

    #[test]
    fn campaign_defaults_protect_core_memories() {
        let registry = PolicyRegistry::campaign_defaults();
        assert_eq!(
            registry.resolve(&["core_memories"]),
            Some(MergePolicy::ProtectedAdditive)
        );
        assert_eq!(registry.resolve(&["entities"]), Some(MergePolicy::ShapeCoerce));
        assert_eq!(registry.resolve(&["relationships"]), None);
    }
}
