use async_trait::async_trait;

use crate::context::SharedContext;
use crate::error::AgentError;

/// One stage of the trading cycle. Mockable for testing.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Names of agents whose output this one consumes. A failure in any of
    /// them stops the cycle before this agent runs.
    fn requires(&self) -> &[&str] {
        &[]
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError>;
}
