use thiserror::Error;

/// Result alias used by every generator.
pub type GenResult<T> = Result<T, GenError>;

/// Failures discovered while building a procedure, before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenError {
    /// The value type cannot be (de)serialized at all.
    #[error("unsupported value type {value_type} at {path}: {reason}")]
    UnsupportedShape {
        value_type: String,
        path: String,
        reason: &'static str,
    },

    /// A sum type without any variant has no possible wire label.
    #[error("sum type at {path} has no variants")]
    EmptySum { path: String },

    /// Procedure names are built from this name, so it must be a plain identifier.
    #[error("invalid type name {name:?}: expected ASCII letters, digits or '_'")]
    InvalidName { name: String },

    /// Two merged programs define a procedure of the same name.
    #[error("procedure {name} is already defined")]
    DuplicateProcedure { name: String },
}
