use crate::conservation::ConservedQuantity;
use crate::field::{FieldTag, Time};
use thiserror::Error;

/// Error type for invalid coupler operations.
#[derive(Error, Debug)]
pub enum ESMCError {
    #[error("{0}")]
    Error(String),
    #[error("Field '{field}' is not supported by component '{model}'")]
    UnsupportedField { model: String, field: FieldTag },
    #[error("Field '{field}' is not registered with the coupler")]
    UnknownField { field: FieldTag },
    #[error("Shape mismatch for '{field}': expected {expected} columns, got {got}")]
    ShapeMismatch {
        field: FieldTag,
        expected: usize,
        got: usize,
    },
    #[error("Field '{field}' expects a {expected} value")]
    FieldKindMismatch {
        field: FieldTag,
        expected: &'static str,
    },
    #[error("Boundary space of component '{model}' does not match the coupler boundary space")]
    SpaceMismatch { model: String },
    #[error("Area fractions do not partition column {column}: sum = {sum}")]
    InvalidAreaFraction { column: usize, sum: f64 },
    #[error("Zero combined surface mask in column {column} while combining '{field}'")]
    ZeroMask { field: FieldTag, column: usize },
    #[error("Non-finite value in '{field}' at column {column}")]
    NonFiniteValue { field: FieldTag, column: usize },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Component '{component}' failed at coupling step {step} (t = {time} s): {source}")]
    ComponentFailure {
        component: String,
        step: usize,
        time: Time,
        #[source]
        source: Box<ESMCError>,
    },
    #[error("Integration failed in '{component}': {details}")]
    Integration { component: String, details: String },
    #[error("Component '{component}' reports t = {actual} s after stepping to t = {expected} s")]
    ClockMismatch {
        component: String,
        expected: Time,
        actual: Time,
    },
    #[error("Extrapolation is not allowed. Target={target}, {name} data range=[{start}, {end}]")]
    ExtrapolationNotAllowed {
        name: String,
        target: String,
        start: String,
        end: String,
    },
    #[error("Conservation check failed for {quantity}: relative drift {drift:e} exceeds tolerance {tolerance:e}")]
    ConservationViolation {
        quantity: ConservedQuantity,
        drift: f64,
        tolerance: f64,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Serialisation failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ESMCError {
    fn from(e: serde_json::Error) -> Self {
        ESMCError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ESMCError {
    fn from(e: toml::de::Error) -> Self {
        ESMCError::Config(e.to_string())
    }
}

/// Convenience type for `Result<T, ESMCError>`.
pub type ESMCResult<T> = Result<T, ESMCError>;
