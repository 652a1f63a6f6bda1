/// The engine's error taxonomy, realized as one `thiserror` enum.
///
/// Only `Fatal` ever escapes the `IterationController` as a true
/// `Result::Err`; every other variant is caught at its origin, folded into
/// an `IterationRecord` or `WorkflowReport.warnings`, and logged — the
/// engine is "never fatal, always recovered" outside of this one variant.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("parse anomaly: {0}")]
    Parse(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("test execution error: {0}")]
    TestExecution(String),

    #[error("review error: {0}")]
    Review(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl ForgeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ForgeError::Fatal(_))
    }
}
