//! Contribution plan parsing
//!
//! Splits free-form model output into ordered steps on `Step N: Title`
//! headers. The header shape is the only contract with the prompt; emphasis,
//! heading markers, and the author's own numbering are tolerated and ignored.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Word that opens every step header. The plan prompt is rendered from it.
pub const STEP_HEADER_WORD: &str = "Step";

/// Title of the single step produced when no header is recognized.
pub const FALLBACK_TITLE: &str = "Understand the Goal";

/// Header line: optional heading marker and emphasis around `Step <n>:`.
/// Group 1 is the rest of the line.
static STEP_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?mi)^[ \t]*(?:#{{1,6}}[ \t]*)?[*_]{{0,3}}[ \t]*{STEP_HEADER_WORD}[ \t]+\d+[ \t]*[*_]{{0,3}}[ \t]*:(.*)$"
    ))
    .expect("step header pattern is valid")
});

/// One step of a contribution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionStep {
    /// 1-based position in the plan.
    pub step: usize,
    pub title: String,
    pub details: String,
}

/// Parse outcome before projection to the public step list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPlan {
    /// At least one header was found.
    Parsed(Vec<ContributionStep>),
    /// No header was found; holds the raw response.
    Fallback(String),
}

impl ParsedPlan {
    pub fn from_response(raw: &str) -> Self {
        let headers: Vec<_> = STEP_HEADER.captures_iter(raw).collect();
        if headers.is_empty() {
            return Self::Fallback(raw.to_string());
        }

        let steps = headers
            .iter()
            .enumerate()
            .map(|(i, caps)| {
                let whole = caps.get(0).map_or(0..0, |m| m.range());
                let body_end = headers
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map_or(raw.len(), |m| m.start());
                let step = i + 1;
                let title = caps.get(1).map_or("", |m| clean_title(m.as_str()));
                ContributionStep {
                    step,
                    title: if title.is_empty() {
                        format!("{STEP_HEADER_WORD} {step}")
                    } else {
                        title.to_string()
                    },
                    details: raw[whole.end..body_end].trim().to_string(),
                }
            })
            .collect();

        Self::Parsed(steps)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Project to the never-empty step sequence.
    pub fn into_steps(self) -> Vec<ContributionStep> {
        match self {
            Self::Parsed(steps) => steps,
            Self::Fallback(raw) => vec![ContributionStep {
                step: 1,
                title: FALLBACK_TITLE.to_string(),
                details: raw,
            }],
        }
    }
}

fn clean_title(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '*' || c == '_').trim()
}

/// Parse a model response into an ordered, non-empty list of steps.
pub fn parse_plan(raw: &str) -> Vec<ContributionStep> {
    let parsed = ParsedPlan::from_response(raw);
    if parsed.is_fallback() {
        tracing::warn!(chars = raw.len(), "No steps parsed from model response, using fallback");
    }
    let steps = parsed.into_steps();
    tracing::debug!(steps = steps.len(), "Contribution plan parsed");
    steps
}
