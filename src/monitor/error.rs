use thiserror::Error;

use crate::rules::RuleError;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// `start()` with an empty rule set. A user error, not a fault.
    #[error("add at least one rule before starting monitoring")]
    NoRulesConfigured,

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("failed to persist monitor state: {0}")]
    Store(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
