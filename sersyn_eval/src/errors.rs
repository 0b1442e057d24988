use sersyn_gen::ExtRole;
use thiserror::Error;

/// Result alias used across the evaluator.
pub type EvalResult<T> = Result<T, EvalError>;

/// Failures raised while running a generated program.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unbound variable '{name}'")]
    UnboundVariable { name: String },

    /// An operation received a value of the wrong kind.
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A generated `Assert` failed: set-null on a non-nullable node or a sum
    /// label out of range.
    #[error("assertion failed: {message}")]
    AssertionFailed { message: String },

    #[error("procedure '{name}' not found")]
    UnknownProcedure { name: String },

    #[error("procedure '{name}' takes {expected} arguments but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// No procedure was linked for an external type.
    #[error("missing external type '{type_name}' ({role:?})")]
    MissingExternalType { type_name: String, role: ExtRole },

    #[error("unknown codec primitive '{prim}'")]
    UnknownPrimitive { prim: String },

    #[error("input truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("malformed input at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("{value} does not fit in {target}")]
    OutOfRange { value: String, target: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: u64, len: usize },

    #[error("record has no field '{name}'")]
    MissingField { name: String },

    #[error("arithmetic overflow in {op}")]
    Overflow { op: &'static str },
}

impl EvalError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: &crate::value::Value) -> Self {
        EvalError::TypeMismatch {
            expected: expected.into(),
            found: found.describe(),
        }
    }
}
