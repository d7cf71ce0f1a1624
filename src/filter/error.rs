use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter expression: {0}")]
    InvalidExpression(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operand for {operator}: {reason}")]
    InvalidOperand { operator: String, reason: String },

    #[error("Operator {0} must be nested under a field")]
    MissingField(String),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("Filter nesting exceeds maximum depth of {0}")]
    DepthExceeded(u32),
}
