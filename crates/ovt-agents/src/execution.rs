use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ovt_models::agent_output::{
    AgentOutput, ExecutionOutput, OrderReport, OrderStatus, EXECUTION, PORTFOLIO,
};
use ovt_models::market::Side;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::collaborators::{with_timeout, ExecutionBridge};
use crate::context::SharedContext;
use crate::error::AgentError;

/// Forwards the cycle's orders to the execution bridge. A missing or
/// failing bridge is recorded in the context, never raised.
pub struct ExecutionAgent {
    bridge: Option<Arc<dyn ExecutionBridge>>,
}

impl ExecutionAgent {
    pub fn new(bridge: Option<Arc<dyn ExecutionBridge>>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Agent for ExecutionAgent {
    fn name(&self) -> &str {
        EXECUTION
    }

    fn requires(&self) -> &[&str] {
        &[PORTFOLIO]
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        let Some(bridge) = &self.bridge else {
            ctx.append_error(format!("{EXECUTION}: execution bridge unavailable"));
            ctx.write(
                EXECUTION,
                AgentOutput::Execution(ExecutionOutput {
                    bridge_available: false,
                    reports: Vec::new(),
                }),
            )?;
            return Ok(());
        };

        let orders = ctx.orders().to_vec();
        let limit = Duration::from_secs(ctx.config().execution.timeout_seconds);
        let mut reports = Vec::with_capacity(orders.len());

        if !orders.is_empty() {
            let connected = with_timeout(limit, "execution bridge connect", bridge.connect()).await;
            if let Err(e) = &connected {
                warn!(bridge = bridge.name(), error = %e, "Bridge connect failed");
                ctx.append_error(format!("{EXECUTION}: {e}"));
            }

            for order in &orders {
                let status = match &connected {
                    Err(e) => OrderStatus::Rejected {
                        reason: format!("not connected: {e}"),
                    },
                    Ok(()) => match with_timeout(limit, "order submission", bridge.submit(order))
                        .await
                    {
                        Ok(broker_id) => OrderStatus::Accepted { broker_id },
                        Err(e) => {
                            ctx.append_warning(format!(
                                "{EXECUTION}: {} order for {} rejected: {e}",
                                side_label(order.side),
                                order.symbol
                            ));
                            OrderStatus::Rejected {
                                reason: e.to_string(),
                            }
                        }
                    },
                };
                reports.push(OrderReport {
                    symbol: order.symbol.clone(),
                    side: order.side,
                    quantity: order.quantity,
                    status,
                });
            }
        }

        let accepted = reports
            .iter()
            .filter(|r| matches!(r.status, OrderStatus::Accepted { .. }))
            .count();
        info!(bridge = bridge.name(), orders = orders.len(), accepted, "Orders submitted");

        ctx.write(
            EXECUTION,
            AgentOutput::Execution(ExecutionOutput {
                bridge_available: true,
                reports,
            }),
        )?;
        Ok(())
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}
