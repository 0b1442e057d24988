//! Evaluator for programs produced by `sersyn_gen`, plus two reference
//! format backends.
//!
//! # Example
//! ```
//! use sersyn_eval::{codecs::RowBinary, Interpreter, Value};
//! use sersyn_gen::{synthesize, GenOptions};
//! use sersyn_types::ValueType;
//!
//! let ty = ValueType::tup([ValueType::u8(), ValueType::string()]);
//! let procs = synthesize(&ty, &RowBinary, false, &GenOptions::default()).expect("generate");
//! let interp = Interpreter::with_program(&RowBinary, &procs.program());
//!
//! let value = Value::tup([Value::u8(7), Value::string("ok")]);
//! let bytes = interp.serialize(&procs.serializer, &value, None).expect("serialize");
//! assert_eq!(bytes, [7, 2, b'o', b'k']);
//! let (back, _) = interp.deserialize(&procs.deserializer, &bytes).expect("deserialize");
//! assert_eq!(back, value);
//! ```

pub mod codecs;
pub mod errors;
pub mod host;
pub mod interpreter;
pub mod mask;
pub mod value;

pub use errors::{EvalError, EvalResult};
pub use host::{CountingHost, Host};
pub use interpreter::{ExternalRegistry, Interpreter};
pub use mask::apply_mask;
pub use value::{ConsList, ReadCursor, Value, WriteCursor};
