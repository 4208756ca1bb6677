use derive_more::{Display, Error};

/// Errors raised by the load-flow core.
///
/// Validation and classification errors abort a solve. Non-convergence is never reported here:
/// the orchestrator's power-balance check decides whether a result is usable.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum LoadFlowError {
    /// An admittance with a NaN or infinite component was stamped.
    #[display("invalid admittance {value} between nodes {row} and {column}")]
    InvalidAdmittance { row: usize, column: usize, value: num_complex::Complex64 },
    /// A port terminal carried a negative index that is not the ground sentinel.
    #[display("negative node index {index}")]
    NegativeDimension { index: i64 },
    /// A node index lies outside the matrix.
    #[display("node index {index} out of range for dimension {dimension}")]
    IndexOutOfRange { index: usize, dimension: usize },
    /// Two collaborating inputs disagree in size.
    #[display("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// A node is neither exactly slack, PQ nor PV.
    #[display("node {node} does not match exactly one bus type")]
    AmbiguousBusType { node: usize },
    /// The node list contains no slack bus.
    #[display("the network has no slack bus")]
    NoSlackBus,
    /// A factorization failed or a current-controlled bus has no usable pivot row.
    #[display("singular admittance matrix: {reason}")]
    SingularAdmittanceMatrix { reason: String },
    /// A node field that is not known was read.
    #[display("value {field} is unknown")]
    UnknownValue { field: &'static str },
    /// A solver option is outside its valid range.
    #[display("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    /// The HELM back end refused to create a calculator.
    #[display("HELM back end returned handle {handle}")]
    HelmConstruction { handle: i32 },
}

pub type Result<T> = std::result::Result<T, LoadFlowError>;

impl LoadFlowError {
    pub(crate) fn singular(reason: impl Into<String>) -> Self {
        LoadFlowError::SingularAdmittanceMatrix { reason: reason.into() }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        LoadFlowError::InvalidConfiguration { reason: reason.into() }
    }
}
