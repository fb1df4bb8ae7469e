use ovt_models::decision::{Action, StructuredDecision};
use serde::Deserialize;

use crate::error::AgentError;

/// Extract the first JSON object from a model reply that may contain
/// surrounding text.
///
/// Handles the usual reply shapes:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the decision:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    let candidates = [
        trimmed.starts_with('{').then(|| trimmed.to_string()),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];
    for candidate in candidates.into_iter().flatten() {
        if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Body of the first ```json or bare ``` fence.
fn fenced_block(text: &str) -> Option<String> {
    const OPENERS: [&str; 4] = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    OPENERS.iter().find_map(|opener| {
        let body_start = text.find(opener)? + opener.len();
        let body_len = text[body_start..].find("```")?;
        Some(text[body_start..body_start + body_len].trim().to_string())
    })
}

/// First `{ ... }` span whose braces balance outside string literals.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// What the decision model is asked to return, parsed leniently.
#[derive(Deserialize)]
struct DecisionReply {
    symbol: String,
    action: String,
    confidence: f64,
    target_weight: f64,
    #[serde(default)]
    thesis: String,
    #[serde(default)]
    risk_notes: String,
    #[serde(default)]
    analysis: Vec<String>,
}

/// Parse a structured decision out of a raw decision-model reply.
///
/// Confidence is rounded into `0..=100` and the weight into `[-1, 1]`.
pub fn parse_decision(raw: &str) -> Result<StructuredDecision, AgentError> {
    let json_str = extract_json(raw)?;
    let reply: DecisionReply = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse decision: {e}")))?;

    let action = match reply.action.trim().to_ascii_lowercase().as_str() {
        "buy" | "long" => Action::Buy,
        "sell" | "short" => Action::Sell,
        "hold" | "flat" => Action::Hold,
        other => return Err(AgentError::Parse(format!("Unknown action: {other}"))),
    };
    if !reply.confidence.is_finite() || !reply.target_weight.is_finite() {
        return Err(AgentError::Parse("Non-finite number in decision".to_string()));
    }

    Ok(StructuredDecision {
        symbol: reply.symbol,
        action,
        confidence: reply.confidence.round().clamp(0.0, 100.0) as u8,
        target_weight: reply.target_weight.clamp(-1.0, 1.0),
        thesis: reply.thesis,
        risk_notes: reply.risk_notes,
        analysis: reply.analysis,
    })
}
