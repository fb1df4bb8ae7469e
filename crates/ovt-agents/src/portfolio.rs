use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ovt_models::agent_output::{
    AgentOutput, FeatureSnapshot, ForecastOutput, PortfolioOutput, TargetPosition, FORECAST,
    PORTFOLIO,
};
use ovt_models::config::RiskConfig;
use ovt_models::decision::{Action, Decision, StructuredDecision};
use ovt_models::market::{Order, Side};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::collaborators::{with_timeout, LanguageModel};
use crate::context::SharedContext;
use crate::error::AgentError;
use crate::parser::parse_decision;
use crate::prompts::{decision_prompt, decision_system_prompt};

/// Deltas smaller than this are not worth an order.
const MIN_TRADE: f64 = 1e-9;

/// Order quantities are rounded to this many decimal places.
const QUANTITY_DP: u32 = 6;

/// Turns alpha scores into risk-limited target weights, the orders that
/// reach them and the cycle's decision.
pub struct PortfolioAgent {
    decision_model: Option<Arc<dyn LanguageModel>>,
}

impl PortfolioAgent {
    pub fn new(decision_model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { decision_model }
    }

    async fn decide(
        &self,
        ctx: &mut SharedContext,
        forecast: &ForecastOutput,
        targets: &BTreeMap<String, TargetPosition>,
    ) -> Option<Decision> {
        let risk = ctx.config().risk.clone();
        let Some(model) = &self.decision_model else {
            return fallback_decision(&forecast.scores, targets, &risk).map(Decision::Structured);
        };

        let prompt = decision_prompt(
            ctx.timestamp(),
            &forecast.scores,
            &forecast.snapshot,
            ctx.news(),
            ctx.config().agents.top_n,
        );
        let limit = Duration::from_secs(ctx.config().llm_research.timeout_seconds);
        let reply = with_timeout(
            limit,
            "decision model",
            model.complete(&decision_system_prompt(), &prompt),
        )
        .await;

        match reply {
            Ok(raw) => match parse_decision(&raw) {
                Ok(mut decision) => {
                    decision.target_weight = decision
                        .target_weight
                        .clamp(-risk.position_limit, risk.position_limit);
                    Some(Decision::Structured(decision))
                }
                Err(e) => {
                    ctx.append_warning(format!(
                        "{PORTFOLIO}: decision reply was not structured: {e}"
                    ));
                    Some(Decision::Raw(raw))
                }
            },
            Err(e) => {
                warn!(model = model.model(), error = %e, "Decision model failed");
                ctx.append_warning(format!(
                    "{PORTFOLIO}: decision model failed, using alpha fallback: {e}"
                ));
                fallback_decision(&forecast.scores, targets, &risk).map(Decision::Structured)
            }
        }
    }
}

#[async_trait]
impl Agent for PortfolioAgent {
    fn name(&self) -> &str {
        PORTFOLIO
    }

    fn requires(&self) -> &[&str] {
        &[FORECAST]
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        let forecast = ctx
            .forecast()
            .cloned()
            .ok_or_else(|| AgentError::MissingInput("forecast alpha scores".to_string()))?;
        if forecast.scores.is_empty() {
            return Err(AgentError::MissingInput(
                "forecast produced no alpha scores".to_string(),
            ));
        }

        let risk = ctx.config().risk.clone();
        let targets = target_positions(&forecast.scores, &forecast.snapshot, &risk);
        let gross_exposure: f64 = targets.values().map(|t| t.weight.abs()).sum();

        let drawdown = ctx.market("drawdown").and_then(|v| v.as_f64());
        let halted = drawdown.is_some_and(|d| d >= risk.max_drawdown);

        if halted {
            ctx.append_warning(format!(
                "{PORTFOLIO}: drawdown {:.4} reached limit {:.4}, holding",
                drawdown.unwrap_or_default(),
                risk.max_drawdown
            ));
            ctx.set_decision(Decision::Structured(halt_decision(&forecast.scores, &risk)));
        } else {
            let positions = current_positions(ctx);
            for order in rebalance_orders(&targets, &positions, risk.target_gross_exposure) {
                ctx.append_order(order);
            }
            if let Some(decision) = self.decide(ctx, &forecast, &targets).await {
                ctx.set_decision(decision);
            }
        }

        info!(
            targets = targets.len(),
            orders = ctx.orders().len(),
            gross_exposure,
            halted,
            "Portfolio constructed"
        );
        ctx.write(
            PORTFOLIO,
            AgentOutput::Portfolio(PortfolioOutput {
                targets,
                gross_exposure,
            }),
        )?;
        Ok(())
    }
}

/// Normalize scores by their absolute sum, clamp each weight to the
/// position limit, then scale the book down if gross exposure exceeds the
/// leverage limit. All-zero scores give all-zero weights.
pub fn target_positions(
    scores: &BTreeMap<String, f64>,
    snapshot: &BTreeMap<String, FeatureSnapshot>,
    risk: &RiskConfig,
) -> BTreeMap<String, TargetPosition> {
    let abs_sum: f64 = scores.values().map(|s| s.abs()).sum();
    let limit = risk.position_limit;

    let mut targets: BTreeMap<String, TargetPosition> = scores
        .iter()
        .map(|(symbol, score)| {
            let raw_weight = if abs_sum > 0.0 { score / abs_sum } else { 0.0 };
            let weight = raw_weight.clamp(-limit, limit);
            let target = TargetPosition {
                raw_weight,
                weight,
                clamped: weight != raw_weight,
                stop_loss_price: None,
                take_profit_price: None,
            };
            (symbol.clone(), target)
        })
        .collect();

    let gross: f64 = targets.values().map(|t| t.weight.abs()).sum();
    if gross > risk.max_leverage {
        let scale = risk.max_leverage / gross;
        for target in targets.values_mut() {
            target.weight *= scale;
            target.clamped = true;
        }
    }

    for (symbol, target) in targets.iter_mut() {
        let Some(close) = snapshot.get(symbol).map(|f| f.close) else {
            continue;
        };
        let (stop, take) = if target.weight < 0.0 {
            (1.0 + risk.stop_loss_pct, 1.0 - risk.take_profit_pct)
        } else {
            (1.0 - risk.stop_loss_pct, 1.0 + risk.take_profit_pct)
        };
        target.stop_loss_price = Some(close * stop);
        target.take_profit_price = Some(close * take);
    }

    targets
}

/// Orders moving `positions` to `targets`, scaled by `exposure`. Positions
/// without a target are closed.
pub fn rebalance_orders(
    targets: &BTreeMap<String, TargetPosition>,
    positions: &BTreeMap<String, f64>,
    exposure: f64,
) -> Vec<Order> {
    let mut symbols: Vec<&String> = targets.keys().chain(positions.keys()).collect();
    symbols.sort();
    symbols.dedup();

    symbols
        .into_iter()
        .filter_map(|symbol| {
            let target = targets.get(symbol).map_or(0.0, |t| t.weight);
            let current = positions.get(symbol).copied().unwrap_or(0.0);
            let delta = (target - current) * exposure;
            if delta.abs() < MIN_TRADE {
                return None;
            }
            let quantity = Decimal::from_f64(delta.abs())?.round_dp(QUANTITY_DP);
            if quantity.is_zero() {
                return None;
            }
            let side = if delta > 0.0 { Side::Buy } else { Side::Sell };
            Some(Order::market(symbol.clone(), quantity, side))
        })
        .collect()
}

/// Long-only weights: negative scores are clipped to zero and the rest
/// normalized to sum to one. Equal weights when nothing is positive.
pub fn long_only_weights(scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let clipped: BTreeMap<String, f64> = scores
        .iter()
        .map(|(symbol, score)| (symbol.clone(), score.max(0.0)))
        .collect();
    let total: f64 = clipped.values().sum();
    if total > 0.0 {
        clipped.into_iter().map(|(s, w)| (s, w / total)).collect()
    } else {
        let equal = 1.0 / scores.len().max(1) as f64;
        clipped.into_keys().map(|s| (s, equal)).collect()
    }
}

/// Decision derived from the strongest absolute alpha score.
pub fn fallback_decision(
    scores: &BTreeMap<String, f64>,
    targets: &BTreeMap<String, TargetPosition>,
    risk: &RiskConfig,
) -> Option<StructuredDecision> {
    let (symbol, score) = strongest(scores)?;
    let target_weight = targets
        .get(symbol)
        .map_or(score, |t| t.weight)
        .clamp(-risk.position_limit, risk.position_limit);

    Some(StructuredDecision {
        symbol: symbol.to_string(),
        action: Action::from_score(score),
        confidence: (score.abs() * 100.0).min(100.0) as u8,
        target_weight,
        thesis: "Fallback derived from the quantitative alpha score without model reasoning."
            .to_string(),
        risk_notes: "Model reasoning unavailable; rely on systematic risk controls.".to_string(),
        analysis: vec![
            "Alpha score magnitude used as proxy for conviction.".to_string(),
            "No qualitative news incorporated.".to_string(),
        ],
    })
}

fn halt_decision(scores: &BTreeMap<String, f64>, risk: &RiskConfig) -> StructuredDecision {
    let symbol = strongest(scores).map(|(s, _)| s.to_string()).unwrap_or_default();
    StructuredDecision {
        symbol,
        action: Action::Hold,
        confidence: 100,
        target_weight: 0.0,
        thesis: "Drawdown limit reached; no new exposure.".to_string(),
        risk_notes: format!("Drawdown at or beyond {:.2}%.", risk.max_drawdown * 100.0),
        analysis: Vec::new(),
    }
}

fn strongest(scores: &BTreeMap<String, f64>) -> Option<(&str, f64)> {
    scores
        .iter()
        .fold(None::<(&str, f64)>, |best, (symbol, score)| match best {
            Some((_, b)) if score.abs() <= b.abs() => best,
            _ => Some((symbol.as_str(), *score)),
        })
}

fn current_positions(ctx: &SharedContext) -> BTreeMap<String, f64> {
    ctx.market("positions")
        .and_then(|v| v.as_object())
        .map(|positions| {
            positions
                .iter()
                .filter_map(|(symbol, w)| w.as_f64().map(|w| (symbol.clone(), w)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{forecast_output, ScriptedModel};
    use ovt_models::config::TraderConfig;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    fn ctx_with_forecast(pairs: &[(&str, f64)]) -> SharedContext {
        let mut ctx = SharedContext::new(TraderConfig::default());
        ctx.write(FORECAST, AgentOutput::Forecast(forecast_output(pairs)))
            .unwrap();
        ctx
    }

    #[test]
    fn weights_clamped_to_position_limit() {
        let risk = RiskConfig::default();
        let scores = scores(&[("A", 0.25), ("B", 0.75)]);
        let targets = target_positions(&scores, &BTreeMap::new(), &risk);
        assert_eq!(targets["A"].raw_weight, 0.25);
        assert_eq!(targets["A"].weight, 0.1);
        assert_eq!(targets["B"].weight, 0.1);
        assert!(targets.values().all(|t| t.clamped));
    }

    #[test]
    fn leverage_scales_gross_exposure() {
        let risk = RiskConfig {
            position_limit: 1.0,
            max_leverage: 0.5,
            ..RiskConfig::default()
        };
        let scores = scores(&[("A", 1.0), ("B", -1.0)]);
        let targets = target_positions(&scores, &BTreeMap::new(), &risk);
        let gross: f64 = targets.values().map(|t| t.weight.abs()).sum();
        assert!((gross - 0.5).abs() < 1e-12);
        assert!((targets["B"].weight + 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_scores_give_zero_weights() {
        let scores = scores(&[("A", 0.0), ("B", 0.0)]);
        let targets = target_positions(&scores, &BTreeMap::new(), &RiskConfig::default());
        assert!(targets.values().all(|t| t.weight == 0.0));
        assert!(rebalance_orders(&targets, &BTreeMap::new(), 1.0).is_empty());
    }

    #[test]
    fn stop_and_take_follow_direction() {
        let risk = RiskConfig::default();
        let forecast = forecast_output(&[("A", 0.5), ("B", -0.5)]);
        let targets = target_positions(&forecast.scores, &forecast.snapshot, &risk);
        let close = forecast.snapshot["A"].close;
        assert!((targets["A"].stop_loss_price.unwrap() - close * 0.95).abs() < 1e-9);
        assert!((targets["B"].stop_loss_price.unwrap() - close * 1.05).abs() < 1e-9);
        assert!((targets["B"].take_profit_price.unwrap() - close * 0.85).abs() < 1e-9);
    }

    #[test]
    fn orders_reach_targets_from_positions() {
        let risk = RiskConfig::default();
        let alpha = scores(&[("A", 1.0), ("B", -1.0)]);
        let targets = target_positions(&alpha, &BTreeMap::new(), &risk);
        let positions = scores(&[("A", 0.1), ("C", 0.05)]);
        let orders = rebalance_orders(&targets, &positions, 1.0);

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].symbol, "B");
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].quantity, dec!(0.1));
        assert_eq!(orders[1].symbol, "C");
        assert_eq!(orders[1].signed_quantity(), dec!(-0.05));
    }

    #[test]
    fn long_only_weights_clip_and_normalize() {
        let weights = long_only_weights(&scores(&[("A", 0.3), ("B", 0.1), ("C", -0.2)]));
        assert!((weights["A"] - 0.75).abs() < 1e-12);
        assert_eq!(weights["C"], 0.0);

        let equal = long_only_weights(&scores(&[("A", -0.3), ("B", -0.1)]));
        assert_eq!(equal["A"], 0.5);
    }

    #[test]
    fn fallback_uses_strongest_score() {
        let risk = RiskConfig::default();
        let s = scores(&[("A", 0.02), ("B", -0.5)]);
        let targets = target_positions(&s, &BTreeMap::new(), &risk);
        let decision = fallback_decision(&s, &targets, &risk).unwrap();
        assert_eq!(decision.symbol, "B");
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.confidence, 50);
        assert_eq!(decision.target_weight, -0.1);
        assert!(fallback_decision(&BTreeMap::new(), &BTreeMap::new(), &risk).is_none());
    }

    #[tokio::test]
    async fn missing_forecast_is_missing_input() {
        let agent = PortfolioAgent::new(None);
        let mut ctx = SharedContext::new(TraderConfig::default());
        let err = agent.run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingInput(_)));
        assert!(ctx.orders().is_empty());
    }

    #[tokio::test]
    async fn structured_reply_becomes_decision() {
        let reply = r#"{"symbol": "A", "action": "buy", "confidence": 80,
            "target_weight": 0.9, "thesis": "t", "risk_notes": "r"}"#;
        let agent = PortfolioAgent::new(Some(Arc::new(ScriptedModel::replying(reply))));
        let mut ctx = ctx_with_forecast(&[("A", 0.4)]);
        agent.run(&mut ctx).await.unwrap();

        let decision = ctx.decision().unwrap().as_structured().unwrap().clone();
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.target_weight, 0.1);
        assert_eq!(ctx.orders().len(), 1);
    }

    #[tokio::test]
    async fn unstructured_reply_is_kept_raw() {
        let agent = PortfolioAgent::new(Some(Arc::new(ScriptedModel::replying("Buy everything."))));
        let mut ctx = ctx_with_forecast(&[("A", 0.4)]);
        agent.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.decision(), Some(&Decision::Raw("Buy everything.".to_string())));
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_falls_back() {
        let agent = PortfolioAgent::new(Some(Arc::new(ScriptedModel::failing())));
        let mut ctx = ctx_with_forecast(&[("A", 0.4)]);
        agent.run(&mut ctx).await.unwrap();

        let decision = ctx.decision().unwrap().as_structured().unwrap();
        assert_eq!(decision.symbol, "A");
        assert!(ctx.warnings()[0].contains("alpha fallback"));
    }

    #[tokio::test]
    async fn drawdown_limit_holds() {
        let mut ctx = SharedContext::resume(
            TraderConfig::default(),
            BTreeMap::from([("drawdown".to_string(), json!(0.25))]),
        );
        ctx.write(FORECAST, AgentOutput::Forecast(forecast_output(&[("A", 0.4)])))
            .unwrap();
        PortfolioAgent::new(None).run(&mut ctx).await.unwrap();

        assert!(ctx.orders().is_empty());
        let decision = ctx.decision().unwrap().as_structured().unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert!(ctx.warnings()[0].contains("drawdown"));
    }
}
