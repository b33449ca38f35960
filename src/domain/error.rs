//! Engine error types.
//!
//! Only structural problems surface as errors. Per-bar trading decisions
//! never fail: rejected orders and forced liquidations are recorded as
//! values on the ledger instead.

/// Top-level error type for stratbench.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("data integrity violation: {reason}")]
    DataIntegrity { reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid strategy: {reason}")]
    StrategyInvalid { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn integrity(reason: impl Into<String>) -> Self {
        EngineError::DataIntegrity {
            reason: reason.into(),
        }
    }

    pub fn strategy(reason: impl Into<String>) -> Self {
        EngineError::StrategyInvalid {
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::StrategyInvalid { .. } => 4,
            EngineError::DataIntegrity { .. } | EngineError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Replace NaN and infinities with zero.
///
/// Every ratio leaving the engine passes through here.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_finite() {
        assert_eq!(sanitize(f64::NAN), 0.0);
        assert_eq!(sanitize(f64::INFINITY), 0.0);
        assert_eq!(sanitize(f64::NEG_INFINITY), 0.0);
        assert_eq!(sanitize(1.5), 1.5);
    }

    #[test]
    fn display_messages() {
        let err = EngineError::InsufficientData {
            symbol: "600000".into(),
            bars: 3,
            minimum: 10,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for 600000: have 3 bars, need 10"
        );
        assert_eq!(
            EngineError::integrity("high < low").to_string(),
            "data integrity violation: high < low"
        );
    }
}
