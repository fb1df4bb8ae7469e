use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Direction implied by the sign of a score.
    pub fn from_score(score: f64) -> Self {
        if score > 0.0 {
            Action::Buy
        } else if score < 0.0 {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}

/// A trading decision in the shape the decision model is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredDecision {
    pub symbol: String,
    pub action: Action,
    /// 0 to 100.
    pub confidence: u8,
    /// Recommended portfolio weight in [-1.0, 1.0].
    pub target_weight: f64,
    pub thesis: String,
    pub risk_notes: String,
    #[serde(default)]
    pub analysis: Vec<String>,
}

/// The cycle's final decision: structured when a decision could be parsed,
/// otherwise the raw text the model produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Decision {
    Structured(StructuredDecision),
    Raw(String),
}

impl Decision {
    pub fn as_structured(&self) -> Option<&StructuredDecision> {
        match self {
            Decision::Structured(d) => Some(d),
            Decision::Raw(_) => None,
        }
    }
}
