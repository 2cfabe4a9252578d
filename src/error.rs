// =============================================================================
// Pipeline error types
// =============================================================================
//
// Strategy/decode/store/publish errors are all caught at a component boundary
// and never unwind past it (see the propagation policy in the design doc).
// This enum exists so each boundary can log a structured, typed cause instead
// of a bare string, and so validation failures can carry a machine-readable
// code alongside the human message.
// =============================================================================

use thiserror::Error;

/// Machine-readable validation failure codes, reused by every validation call
/// site (there is exactly one `validate_parameters` function; see the config
/// manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    UnknownParameter,
    InvalidType,
    OutOfRange,
    ValidationError,
}

/// A single validation failure: a machine code, a human message, and
/// (optionally) a suggested value the caller could use instead.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub parameter: String,
    pub message: String,
    pub suggested_value: Option<serde_json::Value>,
}

impl ValidationIssue {
    pub fn new(code: ValidationCode, parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            parameter: parameter.into(),
            message: message.into(),
            suggested_value: None,
        }
    }
}

/// Top-level error type for the signal pipeline.
///
/// None of these propagate past the component boundary named in the variant
/// doc comment; each boundary catches its own kind, bumps a counter, and logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caught at the dispatcher boundary; message dropped, not retried.
    #[error("decode error: {0}")]
    Decode(String),

    /// Caught at the dispatcher boundary per-strategy; sibling strategies continue.
    #[error("strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: anyhow::Error,
    },

    /// Caught at the config manager boundary; reads fall through, writes fail.
    #[error("document store unavailable")]
    StoreUnavailable,

    /// Returned by `validate_parameters` / any mutating config-manager call;
    /// never unwinds, always returned as a value.
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// Security refusal: the supplied audit/config reference does not belong
    /// to the requesting strategy. Surfaced to admin callers as `NOT_FOUND`.
    #[error("not found for strategy")]
    NotFoundForStrategy,

    /// Caught at the publisher boundary; counted, never escalated.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The circuit breaker is open; the bus was not called.
    #[error("circuit breaker open")]
    BreakerOpen,
}

impl PipelineError {
    pub fn strategy(strategy: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            source: source.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_issue_display_includes_count() {
        let err = PipelineError::Validation(vec![ValidationIssue::new(
            ValidationCode::OutOfRange,
            "buy_threshold",
            "must be >= 1.0",
        )]);
        assert_eq!(format!("{err}"), "validation failed with 1 issue(s)");
    }

    #[test]
    fn not_found_for_strategy_is_distinct_variant() {
        let err = PipelineError::NotFoundForStrategy;
        assert!(matches!(err, PipelineError::NotFoundForStrategy));
    }
}
