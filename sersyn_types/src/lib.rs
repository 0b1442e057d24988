//! Value Type Definitions
//!
//! This crate contains the value-type algebra shared by the generators and the
//! evaluator: scalar kinds, composite shapes, runtime field-mask values and the
//! YAML schema files that name types. It holds pure data structures and does
//! no code generation.

pub mod mask;
pub mod schema;
pub mod types;

// Re-export commonly used types at the crate root
pub use mask::*;
pub use schema::*;
pub use types::*;
