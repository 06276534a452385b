//! Planning block extraction.
//!
//! Converts the response's free-text choice section into structured,
//! clickable choices. Three text shapes are recognized, tried in order:
//!
//! 1. `1. **Label** - description`
//! 2. `1. Label`
//! 3. `**[Label]:** description`
//!
//! Risk classification is a keyword heuristic, not a correctness-critical
//! path; treat its output as a hint. Extraction is fixed server-side so the
//! no-raw-JSON guarantee holds regardless of client behavior.

use std::sync::LazyLock;

use regex_lite::Regex;

use taleweaver_shared::PlanningChoiceInfo;

// Compiled per-line shape matchers
static NUMBERED_BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)[.)]\s*\*\*([^*]+)\*\*\s*[-:]\s*(.+)$").expect("valid regex")
});
static NUMBERED_PLAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)]\s*(.+)$").expect("valid regex"));
static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*\*\[([^\]]+)\]:?\*\*:?\s*(.*)$").expect("valid regex"));

/// Description cues that raise a choice's risk level. Heuristic only.
const DANGEROUS_CUES: [&str; 7] = [
    "attack",
    "fight",
    "charge",
    "lethal",
    "deadly",
    "explos",
    "sacrifice",
];
const RISKY_CUES: [&str; 8] = [
    "sneak", "steal", "risk", "gamble", "bluff", "climb", "ambush", "distract",
];

// =============================================================================
// Planning Choice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskLevel {
    #[default]
    Safe,
    Risky,
    Dangerous,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Risky => "risky",
            RiskLevel::Dangerous => "dangerous",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured next-action choice with a stable, 1-based position id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningChoice {
    pub id: u32,
    pub label: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub is_custom: bool,
}

impl PlanningChoice {
    fn custom(id: u32) -> Self {
        Self {
            id,
            label: "Custom Action".into(),
            description: "Describe a different action in your own words.".into(),
            risk_level: RiskLevel::Safe,
            is_custom: true,
        }
    }

    /// Convert to protocol type for wire transmission.
    pub fn to_protocol(&self) -> PlanningChoiceInfo {
        PlanningChoiceInfo {
            id: self.id,
            label: self.label.clone(),
            description: self.description.clone(),
            risk_level: self.risk_level.to_string(),
            is_custom: self.is_custom,
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract an ordered choice sequence from planning block text.
///
/// Empty or whitespace-only input yields an empty sequence - a missing
/// planning block is a valid, common case. Non-empty but unrecognized text
/// yields exactly the synthetic custom choice. Any recognized shape gets the
/// custom choice appended last.
pub fn extract_planning_choices(block: &str) -> Vec<PlanningChoice> {
    let trimmed = block.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut choices = parse_numbered_bold(trimmed);
    if choices.is_empty() {
        choices = parse_numbered_plain(trimmed);
    }
    if choices.is_empty() {
        choices = parse_bracketed(trimmed);
    }

    for (index, choice) in choices.iter_mut().enumerate() {
        choice.id = index as u32 + 1;
    }
    let custom_id = choices.len() as u32 + 1;
    choices.push(PlanningChoice::custom(custom_id));
    choices
}

/// Re-serialize choices into one of the recognized text shapes.
///
/// The synthetic custom choice is omitted; extraction appends it again.
/// Choices with descriptions render in the numbered-bold shape, otherwise
/// the plain numbered shape is used for the whole block.
pub fn render_planning_block(choices: &[PlanningChoice]) -> String {
    let real: Vec<&PlanningChoice> = choices.iter().filter(|c| !c.is_custom).collect();
    let all_described = real.iter().all(|c| !c.description.trim().is_empty());

    real.iter()
        .map(|choice| {
            if all_described {
                format!("{}. **{}** - {}", choice.id, choice.label, choice.description)
            } else {
                format!("{}. {}", choice.id, choice.label)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_numbered_bold(block: &str) -> Vec<PlanningChoice> {
    block
        .lines()
        .filter_map(|line| {
            let caps = NUMBERED_BOLD_RE.captures(line)?;
            let label = caps[2].trim().to_string();
            let description = caps[3].trim().to_string();
            Some(build_choice(label, description))
        })
        .collect()
}

fn parse_numbered_plain(block: &str) -> Vec<PlanningChoice> {
    block
        .lines()
        .filter_map(|line| {
            let caps = NUMBERED_PLAIN_RE.captures(line)?;
            let label = caps[2].trim().trim_matches('*').trim().to_string();
            if label.is_empty() {
                return None;
            }
            Some(build_choice(label, String::new()))
        })
        .collect()
}

fn parse_bracketed(block: &str) -> Vec<PlanningChoice> {
    block
        .lines()
        .filter_map(|line| {
            let caps = BRACKETED_RE.captures(line)?;
            let label = caps[1].trim().to_string();
            let description = caps[2].trim().to_string();
            Some(build_choice(label, description))
        })
        .collect()
}

fn build_choice(label: String, description: String) -> PlanningChoice {
    let risk_level = classify_risk(&label, &description);
    PlanningChoice {
        id: 0, // renumbered by the caller
        label,
        description,
        risk_level,
        is_custom: false,
    }
}

/// Keyword-cue risk classifier. Best-effort; defaults to Safe.
fn classify_risk(label: &str, description: &str) -> RiskLevel {
    let haystack = format!("{} {}", label, description).to_lowercase();
    if DANGEROUS_CUES.iter().any(|cue| haystack.contains(cue)) {
        return RiskLevel::Dangerous;
    }
    if RISKY_CUES.iter().any(|cue| haystack.contains(cue)) {
        return RiskLevel::Risky;
    }
    RiskLevel::Safe
}
