//! Error kinds for network construction, simulation and calibration.

use thiserror::Error;

/// Errors raised by the kinetics core.
///
/// `Config` aborts a run before any simulation work starts.
/// `NumericDegeneracy` is scoped to a single fitness evaluation: the optimizer
/// records the particle as worst-possible and carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KineticsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),
    #[error("run cancelled")]
    Cancelled,
}

impl KineticsError {
    pub fn config(msg: impl Into<String>) -> Self {
        KineticsError::Config(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        KineticsError::NumericDegeneracy(msg.into())
    }

    /// True for errors that only invalidate one evaluation.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, KineticsError::NumericDegeneracy(_))
    }
}

pub type Result<T> = std::result::Result<T, KineticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = KineticsError::config("tail window 10 >= 10 buckets");
        assert_eq!(
            err.to_string(),
            "configuration error: tail window 10 >= 10 buckets"
        );
        assert_eq!(KineticsError::Cancelled.to_string(), "run cancelled");
    }

    #[test]
    fn test_degenerate_classification() {
        assert!(KineticsError::degenerate("NaN rate").is_degenerate());
        assert!(!KineticsError::config("bad").is_degenerate());
        assert!(!KineticsError::Cancelled.is_degenerate());
    }
}
