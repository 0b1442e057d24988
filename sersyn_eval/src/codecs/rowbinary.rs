//! Compact little-endian binary format.
//!
//! Fixed-width scalars are written as their little-endian bytes (`u24` takes
//! three bytes), floats as IEEE-754 doubles, chars as their 32-bit code point.
//! Strings and lists carry a LEB128 length prefix, sum labels are 16-bit and
//! nullable values start with a marker byte (`1` for null). Tuples, records
//! and vectors have no framing.
//!
//! A list count read from the input is checked before any element is read:
//! elements that take at least one byte cannot outnumber the remaining bytes,
//! and zero-width elements are capped at [`MAX_ZERO_WIDTH_COUNT`].

use super::{check_int, int_value, scalar_op, unexpected_args};
use crate::errors::{EvalError, EvalResult};
use crate::host::Host;
use crate::value::{ReadCursor, Value, WriteCursor};
use sersyn_gen::codec::{Decoder, Encoder, Frame, ListOpening, Loc, SizeCodec};
use sersyn_gen::ir::Expr;
use sersyn_types::{BaseKind, Field, Shape, ValueType};

const PREFIX: &str = "rowbinary.";
const NULL: u8 = 1;
const NOT_NULL: u8 = 0;

/// Largest count accepted for a list whose elements encode as zero bytes.
pub const MAX_ZERO_WIDTH_COUNT: u64 = 1 << 24;

#[derive(Debug, Clone, Copy, Default)]
pub struct RowBinary;

fn prim(op: &str, args: Vec<Expr>) -> Expr {
    Expr::codec(format!("{PREFIX}{op}"), args)
}

/// Whether some value of `ty` is written as zero bytes. `root` resolves `this`
/// once; a second level of recursion is taken to be non-empty.
fn may_be_empty(ty: &ValueType, root: Option<&ValueType>) -> bool {
    if ty.nullable {
        return false;
    }
    match &ty.shape {
        Shape::Void | Shape::Ext(_) => true,
        Shape::This => root.is_some_and(|root| may_be_empty(root, None)),
        Shape::Usr { underlying, .. } => may_be_empty(underlying, root),
        Shape::Vec { dim, element } => *dim == 0 || may_be_empty(element, root),
        Shape::Tup(elements) => elements.iter().all(|t| may_be_empty(t, root)),
        Shape::Rec(fields) => fields.iter().all(|f| may_be_empty(&f.value_type, root)),
        _ => false,
    }
}

impl Decoder for RowBinary {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, src: Expr) -> Expr {
        prim(&format!("read_{kind}"), vec![src])
    }

    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        src
    }

    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        src
    }

    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        src
    }

    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, src: Expr) -> Expr {
        prim("read_label", vec![src])
    }

    fn list_open(&self, element: &ValueType, at: Loc<'_>, src: Expr) -> ListOpening {
        if may_be_empty(element, Some(at.root)) {
            ListOpening::KnownSize(prim("read_count", vec![src]))
        } else {
            ListOpening::KnownSize(prim("read_bounded_count", vec![src]))
        }
    }

    fn is_end_of_list(&self, _element: &ValueType, _at: Loc<'_>, src: Expr) -> Expr {
        prim("at_end", vec![src])
    }

    fn is_null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("is_null", vec![src])
    }

    fn null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("skip_marker", vec![src])
    }

    fn not_null(&self, _ty: &ValueType, _at: Loc<'_>, src: Expr) -> Expr {
        prim("skip_marker", vec![src])
    }
}

impl Encoder for RowBinary {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, value: Expr, dst: Expr) -> Expr {
        prim(&format!("write_{kind}"), vec![value, dst])
    }

    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        dst
    }

    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        dst
    }

    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        dst
    }

    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, label: Expr, dst: Expr) -> Expr {
        prim("write_label", vec![label, dst])
    }

    fn list_open(&self, _element: &ValueType, _at: Loc<'_>, count: Expr, dst: Expr) -> Expr {
        prim("write_count", vec![count, dst])
    }

    fn null(&self, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_null", vec![dst])
    }

    fn not_null(&self, _ty: &ValueType, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_not_null", vec![dst])
    }
}

impl SizeCodec for RowBinary {
    fn scalar_size(&self, kind: BaseKind, _at: Loc<'_>, value: Expr) -> Expr {
        match kind {
            BaseKind::Float => Expr::U64(8),
            BaseKind::Bool => Expr::U64(1),
            BaseKind::Char => Expr::U64(4),
            BaseKind::Int { width, .. } => Expr::U64(width.bytes()),
            BaseKind::String => prim("sizeof_string", vec![value]),
        }
    }

    fn open_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(0)
    }

    fn sep_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(0)
    }

    fn close_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(0)
    }

    fn sum_open_size(&self, _variants: &[Field], _at: Loc<'_>, _label: Expr) -> Expr {
        Expr::U64(2)
    }

    fn list_open_size(&self, _element: &ValueType, _at: Loc<'_>, count: Expr) -> Expr {
        prim("sizeof_count", vec![count])
    }

    fn null_size(&self, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }

    fn not_null_size(&self, _ty: &ValueType, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
}

pub fn write_varint(mut n: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn varint_len(n: u64) -> u64 {
    let bits = 64 - u64::from(n.leading_zeros());
    bits.max(1).div_ceil(7)
}

fn read_varint(src: &ReadCursor) -> EvalResult<(u64, ReadCursor)> {
    let mut value: u64 = 0;
    for (i, byte) in src.rest().iter().enumerate() {
        let shift = 7 * i as u32;
        if shift >= 64 {
            return Err(src.malformed("varint longer than 64 bits"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, src.advance(i + 1)?));
        }
    }
    Err(src.truncated(src.rest().len() + 1))
}

fn read_scalar(kind: BaseKind, src: &ReadCursor) -> EvalResult<(Value, ReadCursor)> {
    match kind {
        BaseKind::Float => {
            let (bytes, next) = src.take(8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok((Value::Float(f64::from_le_bytes(raw)), next))
        }
        BaseKind::Bool => {
            let (bytes, next) = src.take(1)?;
            match bytes[0] {
                0 => Ok((Value::Bool(false), next)),
                1 => Ok((Value::Bool(true), next)),
                other => Err(src.malformed(format!("invalid bool byte {other}"))),
            }
        }
        BaseKind::Char => {
            let (bytes, next) = src.take(4)?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            let code = u32::from_le_bytes(raw);
            let c = char::from_u32(code)
                .ok_or_else(|| src.malformed(format!("invalid code point {code:#x}")))?;
            Ok((Value::Char(c), next))
        }
        BaseKind::String => {
            let (len, after_len) = read_varint(src)?;
            let len = usize::try_from(len).map_err(|_| src.malformed("string too long"))?;
            let (bytes, next) = after_len.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| after_len.malformed(format!("invalid utf-8: {e}")))?;
            Ok((Value::String(s.to_string()), next))
        }
        BaseKind::Int { signed, width } => {
            let n = width.bytes() as usize;
            let (bytes, next) = src.take(n)?;
            let mut raw = [0u8; 16];
            raw[..n].copy_from_slice(bytes);
            let unsigned = u128::from_le_bytes(raw);
            let value = if signed {
                let shift = 128 - width.bits();
                int_value(kind, None, Some(((unsigned as i128) << shift) >> shift))
            } else {
                int_value(kind, Some(unsigned), None)
            };
            let value = value.ok_or_else(|| src.malformed("integer out of range"))?;
            Ok((value, next))
        }
    }
}

fn write_scalar(kind: BaseKind, value: &Value, out: &mut Vec<u8>) -> EvalResult<()> {
    match (kind, value) {
        (BaseKind::Float, Value::Float(f)) => out.extend_from_slice(&f.to_le_bytes()),
        (BaseKind::Bool, Value::Bool(b)) => out.push(u8::from(*b)),
        (BaseKind::Char, Value::Char(c)) => out.extend_from_slice(&u32::from(*c).to_le_bytes()),
        (BaseKind::String, Value::String(s)) => {
            write_varint(s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        (BaseKind::Int { width, .. }, Value::Uint { value: n, .. }) => {
            check_int(kind, value)?;
            out.extend_from_slice(&n.to_le_bytes()[..width.bytes() as usize]);
        }
        (BaseKind::Int { width, .. }, Value::Int { value: n, .. }) => {
            check_int(kind, value)?;
            out.extend_from_slice(&n.to_le_bytes()[..width.bytes() as usize]);
        }
        (kind, other) => return Err(EvalError::mismatch(kind.name(), other)),
    }
    Ok(())
}

fn write(dst: &WriteCursor, bytes: &[u8]) -> Value {
    Value::Writer(dst.write(bytes))
}

impl Host for RowBinary {
    fn call(&self, prim: &str, args: Vec<Value>) -> EvalResult<Value> {
        let Some(op) = prim.strip_prefix(PREFIX) else {
            return Err(EvalError::UnknownPrimitive {
                prim: prim.to_string(),
            });
        };
        match (op, args.as_slice()) {
            ("read_label", [Value::Reader(src)]) => {
                let (bytes, next) = src.take(2)?;
                let label = u16::from_le_bytes([bytes[0], bytes[1]]);
                Ok(Value::pair(Value::U64(label.into()), Value::Reader(next)))
            }
            ("write_label", [Value::U64(label), Value::Writer(dst)]) => {
                let label = u16::try_from(*label).map_err(|_| EvalError::OutOfRange {
                    value: label.to_string(),
                    target: "u16 sum label".into(),
                })?;
                Ok(write(dst, &label.to_le_bytes()))
            }
            ("read_count", [Value::Reader(src)]) => {
                let (count, next) = read_varint(src)?;
                if count > MAX_ZERO_WIDTH_COUNT {
                    return Err(src.malformed(format!(
                        "list of {count} zero-width elements exceeds {MAX_ZERO_WIDTH_COUNT}"
                    )));
                }
                Ok(Value::pair(Value::U64(count), Value::Reader(next)))
            }
            ("read_bounded_count", [Value::Reader(src)]) => {
                let (count, next) = read_varint(src)?;
                let left = next.rest().len() as u64;
                if count > left {
                    return Err(src.malformed(format!(
                        "list of {count} elements with only {left} bytes left"
                    )));
                }
                Ok(Value::pair(Value::U64(count), Value::Reader(next)))
            }
            ("write_count", [Value::U64(count), Value::Writer(dst)]) => {
                let mut buf = Vec::new();
                write_varint(*count, &mut buf);
                Ok(write(dst, &buf))
            }
            ("sizeof_count", [Value::U64(count)]) => Ok(Value::U64(varint_len(*count))),
            ("sizeof_string", [Value::String(s)]) => {
                let len = s.len() as u64;
                Ok(Value::U64(varint_len(len) + len))
            }
            ("at_end", [Value::Reader(src)]) => Ok(Value::Bool(src.rest().is_empty())),
            ("is_null", [Value::Reader(src)]) => match src.peek() {
                Some(NULL) => Ok(Value::Bool(true)),
                Some(NOT_NULL) => Ok(Value::Bool(false)),
                Some(other) => Err(src.malformed(format!("invalid null marker {other}"))),
                None => Err(src.truncated(1)),
            },
            ("skip_marker", [Value::Reader(src)]) => Ok(Value::Reader(src.advance(1)?)),
            ("write_null", [Value::Writer(dst)]) => Ok(write(dst, &[NULL])),
            ("write_not_null", [Value::Writer(dst)]) => Ok(write(dst, &[NOT_NULL])),
            _ => match (scalar_op(op), args.as_slice()) {
                (Some(("read", kind)), [Value::Reader(src)]) => {
                    let (value, next) = read_scalar(kind, src)?;
                    Ok(Value::pair(value, Value::Reader(next)))
                }
                (Some(("write", kind)), [value, Value::Writer(dst)]) => {
                    let mut buf = Vec::new();
                    write_scalar(kind, value, &mut buf)?;
                    Ok(write(dst, &buf))
                }
                (Some(_), _) => Err(unexpected_args(prim, &args)),
                (None, _) => Err(EvalError::UnknownPrimitive {
                    prim: prim.to_string(),
                }),
            },
        }
    }
}
