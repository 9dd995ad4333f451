use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// A parameter set field is out of its admissible range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// An inverse-solve target balance is not strictly positive.
    #[error("target value must be > 0, got {0}")]
    InvalidTarget(f64),

    /// A drawdown input (balance, withdrawal or years) is not strictly positive.
    #[error("invalid withdrawal input `{name}`: must be > 0, got {value}")]
    InvalidWithdrawalInput { name: &'static str, value: f64 },

    /// No admissible value of the solved quantity reaches the target.
    #[error("target {target} cannot be reached: {reason}")]
    TargetUnreachable { target: f64, reason: String },
}

impl ProjectionError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn unreachable(target: f64, reason: impl Into<String>) -> Self {
        Self::TargetUnreachable {
            target,
            reason: reason.into(),
        }
    }
}
