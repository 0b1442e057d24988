//! Reference format backends. Each one is both a code generation backend
//! (`Decoder`, `Encoder`, `SizeCodec`) and the [`Host`](crate::Host) running the
//! primitives it emits.

pub mod rowbinary;
pub mod sexpr;

pub use rowbinary::RowBinary;
pub use sexpr::SExpr;

use crate::errors::{EvalError, EvalResult};
use crate::value::{fits_signed, fits_unsigned, Value};
use sersyn_types::{BaseKind, IntWidth};

/// Splits `read_u32` style operation names into the operation and the kind.
fn scalar_op(op: &str) -> Option<(&str, BaseKind)> {
    let (head, kind) = op.split_once('_')?;
    Some((head, kind.parse().ok()?))
}

fn unexpected_args(prim: &str, args: &[Value]) -> EvalError {
    EvalError::TypeMismatch {
        expected: format!("arguments of {prim}"),
        found: args
            .iter()
            .map(Value::describe)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Validates an integer value against the kind it is written as.
fn check_int(kind: BaseKind, value: &Value) -> EvalResult<()> {
    let ok = match (kind, value) {
        (
            BaseKind::Int {
                signed: false,
                width,
            },
            Value::Uint { width: w, value },
        ) if width == *w => {
            if !fits_unsigned(width, *value) {
                return Err(out_of_range(value, width, 'u'));
            }
            true
        }
        (
            BaseKind::Int {
                signed: true,
                width,
            },
            Value::Int { width: w, value },
        ) if width == *w => {
            if !fits_signed(width, *value) {
                return Err(out_of_range(value, width, 'i'));
            }
            true
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(EvalError::mismatch(kind.name(), value))
    }
}

fn out_of_range(value: impl ToString, width: IntWidth, sign: char) -> EvalError {
    EvalError::OutOfRange {
        value: value.to_string(),
        target: format!("{sign}{}", width.bits()),
    }
}

/// Builds the heap value of an integer kind from a wide parse.
fn int_value(kind: BaseKind, unsigned: Option<u128>, signed: Option<i128>) -> Option<Value> {
    match kind {
        BaseKind::Int {
            signed: false,
            width,
        } => unsigned
            .filter(|v| fits_unsigned(width, *v))
            .map(|v| Value::uint(width, v)),
        BaseKind::Int {
            signed: true,
            width,
        } => signed
            .filter(|v| fits_signed(width, *v))
            .map(|v| Value::int(width, v)),
        _ => None,
    }
}
