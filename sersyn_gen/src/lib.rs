//! Type-driven synthesis of serialization procedures.
//!
//! Given a [`ValueType`](sersyn_types::ValueType) and a format backend
//! implementing the [`codec`] traits, the generators emit IR procedures that
//! deserialize, serialize (optionally under a run-time field mask) and
//! compute the serialized size of values of that type.

pub mod codec;
mod common;
pub mod errors;
pub mod field_mask;
pub mod ir;
pub mod materializer;
pub mod path;
pub mod serializer;
pub mod size_estimator;
pub mod synth;

pub use codec::{Decoder, Encoder, Frame, ListOpening, Loc, SizeCodec};
pub use errors::{GenError, GenResult};
pub use field_mask::FieldMask;
pub use ir::{Expr, ExtRole, Procedure, Program};
pub use materializer::{make_deserializer, make_deserializer_with};
pub use path::{Path, PathStep};
pub use serializer::{make_serializer, make_serializer_with};
pub use size_estimator::{make_size_estimator, make_size_estimator_with};
pub use synth::{synthesize, synthesize_schema, synthesize_typedef, GenOptions, Generated, Synthesized};
