use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("{0} timed out after {1} seconds")]
    Timeout(String, u64),

    #[error("{0} unavailable")]
    Unavailable(String),

    /// An input the agent cannot work without is absent from the context.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Market data was present but unusable.
    #[error("data error: {0}")]
    Data(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("backtest error: {0}")]
    Backtest(String),

    #[error("cycle cancelled")]
    Cancelled,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Errors that stop a cycle regardless of which agent raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::MissingInput(_) | AgentError::Data(_) | AgentError::Cancelled
        )
    }
}

/// Rejected writes into the shared context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("{0} already wrote its shared memory entry")]
    DuplicateWrite(String),

    #[error("{agent} cannot write a {found} entry")]
    ShapeMismatch { agent: String, found: String },
}
