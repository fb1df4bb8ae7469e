use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Side;

pub const NEWS_SENTIMENT: &str = "NewsSentiment";
pub const FORECAST: &str = "Forecast";
pub const PORTFOLIO: &str = "Portfolio";
pub const EXECUTION: &str = "Execution";

/// Names reserved for the built-in agents. Each may only carry its own variant.
pub const BUILTIN_AGENTS: [&str; 4] = [NEWS_SENTIMENT, FORECAST, PORTFOLIO, EXECUTION];

/// Payload an agent writes into shared memory, tagged by agent identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum AgentOutput {
    NewsSentiment(NewsSummary),
    Forecast(ForecastOutput),
    Portfolio(PortfolioOutput),
    Execution(ExecutionOutput),
    /// Output of an appended agent outside the built-in four.
    Custom(serde_json::Value),
    /// Recorded in place of an agent's own output when it failed.
    Fault { error: String },
}

impl AgentOutput {
    /// The built-in agent name this variant belongs to. `None` for `Custom`.
    pub fn builtin_owner(&self) -> Option<&'static str> {
        match self {
            AgentOutput::NewsSentiment(_) => Some(NEWS_SENTIMENT),
            AgentOutput::Forecast(_) => Some(FORECAST),
            AgentOutput::Portfolio(_) => Some(PORTFOLIO),
            AgentOutput::Execution(_) => Some(EXECUTION),
            AgentOutput::Custom(_) | AgentOutput::Fault { .. } => None,
        }
    }

    /// Whether `agent` is allowed to write this variant.
    pub fn fits(&self, agent: &str) -> bool {
        match self {
            AgentOutput::Fault { .. } => true,
            AgentOutput::Custom(_) => !BUILTIN_AGENTS.contains(&agent),
            _ => self.builtin_owner() == Some(agent),
        }
    }
}

/// One transcript entry: which agent produced what.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub agent: String,
    pub output: AgentOutput,
}

/// Qualitative summary from the news agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsSummary {
    pub headlines: Vec<String>,
    pub summary: String,
    /// True when no real headlines or summary were available.
    pub placeholder: bool,
}

impl NewsSummary {
    pub fn placeholder() -> Self {
        Self {
            headlines: Vec::new(),
            summary: "No news sentiment summary available.".to_string(),
            placeholder: true,
        }
    }
}

/// Latest alpha scores and the features behind the strongest ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastOutput {
    pub scores: BTreeMap<String, f64>,
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub snapshot: BTreeMap<String, FeatureSnapshot>,
    #[serde(default)]
    pub commentary: Option<String>,
}

/// Technical features for one instrument on one date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureSnapshot {
    pub as_of: NaiveDate,
    pub close: f64,
    pub ma_5: f64,
    pub ma_10: f64,
    pub ma_21: f64,
    pub momentum_5: f64,
    pub momentum_10: f64,
    pub momentum_21: f64,
    pub volatility_21: f64,
}

/// Target allocation for one instrument after risk limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetPosition {
    /// Normalized weight before any limit was applied.
    pub raw_weight: f64,
    /// Weight after position and leverage limits.
    pub weight: f64,
    pub clamped: bool,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioOutput {
    pub targets: BTreeMap<String, TargetPosition>,
    /// Sum of absolute target weights.
    pub gross_exposure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderStatus {
    Accepted { broker_id: String },
    Rejected { reason: String },
}

/// Acknowledgement or failure for one submitted order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReport {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    #[serde(flatten)]
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutput {
    pub bridge_available: bool,
    pub reports: Vec<OrderReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builtin_variants_fit_only_their_owner() {
        let news = AgentOutput::NewsSentiment(NewsSummary::placeholder());
        assert!(news.fits(NEWS_SENTIMENT));
        assert!(!news.fits(FORECAST));
        assert!(!news.fits("Sentinel"));
    }

    #[test]
    fn custom_output_cannot_claim_builtin_name() {
        let custom = AgentOutput::Custom(serde_json::json!({"note": "extra"}));
        assert!(custom.fits("Sentinel"));
        assert!(!custom.fits(PORTFOLIO));
    }

    #[test]
    fn fault_fits_any_agent() {
        let fault = AgentOutput::Fault {
            error: "timed out".to_string(),
        };
        assert!(fault.fits(FORECAST));
        assert!(fault.fits("Sentinel"));
    }

    #[test]
    fn order_report_flattens_status() {
        let report = OrderReport {
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            quantity: dec!(0.1),
            status: OrderStatus::Rejected {
                reason: "market closed".to_string(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "market closed");

        let back: OrderReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn memory_entry_carries_type_tag() {
        let entry = MemoryEntry {
            agent: EXECUTION.to_string(),
            output: AgentOutput::Execution(ExecutionOutput {
                bridge_available: false,
                reports: vec![],
            }),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["output"]["type"], "Execution");
        assert_eq!(json["output"]["data"]["bridge_available"], false);
    }
}
