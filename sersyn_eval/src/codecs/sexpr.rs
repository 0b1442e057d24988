//! Text s-expressions.
//!
//! Composites are parenthesised with single spaces between members, sums are
//! written as `(label payload)`, a null value is the word `null` and strings
//! and chars are quoted with backslash escapes. Lists do not announce their
//! length: the reader stops at the closing parenthesis.
//!
//! Two cases need more than that. A present value whose own text may begin
//! with `null` (a nullable user type, a nullable recursive root, an external
//! type) is prefixed with `some `. A list whose elements may be written as
//! nothing starts with its count, `(2  )` for two voids.

use super::{check_int, int_value, scalar_op, unexpected_args};
use crate::errors::{EvalError, EvalResult};
use crate::host::Host;
use crate::value::{ReadCursor, Value, WriteCursor};
use sersyn_gen::codec::{Decoder, Encoder, Frame, ListOpening, Loc, SizeCodec};
use sersyn_gen::ir::Expr;
use sersyn_types::{BaseKind, Field, Shape, ValueType};

const PREFIX: &str = "sexpr.";
const NULL: &[u8] = b"null";
const SOME: &[u8] = b"some ";

#[derive(Debug, Clone, Copy, Default)]
pub struct SExpr;

fn prim(op: &str, args: Vec<Expr>) -> Expr {
    Expr::codec(format!("{PREFIX}{op}"), args)
}

/// Whether the text of a present value of `ty` may itself start with `null`.
fn may_begin_with_null(ty: &ValueType, root: Option<&ValueType>) -> bool {
    match &ty.shape {
        Shape::Ext(_) => true,
        Shape::This => {
            root.is_some_and(|root| root.nullable || may_begin_with_null(root, None))
        }
        Shape::Usr { underlying, .. } => {
            underlying.nullable || may_begin_with_null(underlying, root)
        }
        _ => false,
    }
}

/// Whether a value of `ty` may be written as no text at all.
fn may_be_empty(ty: &ValueType, root: Option<&ValueType>) -> bool {
    match &ty.shape {
        Shape::Void | Shape::Ext(_) => true,
        Shape::This => root.is_some_and(|root| may_be_empty(root, None)),
        Shape::Usr { underlying, .. } => may_be_empty(underlying, root),
        _ => false,
    }
}

fn list_count_text(count: u64) -> String {
    format!("({count} ")
}

impl Decoder for SExpr {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, src: Expr) -> Expr {
        prim(&format!("read_{kind}"), vec![src])
    }

    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("expect_open", vec![src])
    }

    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("expect_sep", vec![src])
    }

    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("expect_close", vec![src])
    }

    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, src: Expr) -> Expr {
        prim("read_label", vec![src])
    }

    fn list_open(&self, element: &ValueType, at: Loc<'_>, src: Expr) -> ListOpening {
        if may_be_empty(element, Some(at.root)) {
            ListOpening::KnownSize(prim("read_list_count", vec![src]))
        } else {
            ListOpening::UnknownSize(prim("expect_open", vec![src]))
        }
    }

    fn is_end_of_list(&self, _element: &ValueType, _at: Loc<'_>, src: Expr) -> Expr {
        prim("is_end", vec![src])
    }

    fn is_null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("is_null", vec![src])
    }

    fn null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("expect_null", vec![src])
    }

    fn not_null(&self, ty: &ValueType, at: Loc<'_>, src: Expr) -> Expr {
        if may_begin_with_null(ty, Some(at.root)) {
            prim("expect_some", vec![src])
        } else {
            src
        }
    }
}

impl Encoder for SExpr {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, value: Expr, dst: Expr) -> Expr {
        prim(&format!("write_{kind}"), vec![value, dst])
    }

    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_open", vec![dst])
    }

    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_sep", vec![dst])
    }

    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_close", vec![dst])
    }

    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, label: Expr, dst: Expr) -> Expr {
        prim("write_label", vec![label, dst])
    }

    fn list_open(&self, element: &ValueType, at: Loc<'_>, count: Expr, dst: Expr) -> Expr {
        if may_be_empty(element, Some(at.root)) {
            prim("write_list_count", vec![count, dst])
        } else {
            prim("write_open", vec![dst])
        }
    }

    fn null(&self, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_null", vec![dst])
    }

    fn not_null(&self, ty: &ValueType, at: Loc<'_>, dst: Expr) -> Expr {
        if may_begin_with_null(ty, Some(at.root)) {
            prim("write_some", vec![dst])
        } else {
            dst
        }
    }
}

impl SizeCodec for SExpr {
    fn scalar_size(&self, kind: BaseKind, _at: Loc<'_>, value: Expr) -> Expr {
        prim(&format!("sizeof_{kind}"), vec![value])
    }

    fn open_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }

    fn sep_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }

    fn close_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }

    fn sum_open_size(&self, _variants: &[Field], _at: Loc<'_>, label: Expr) -> Expr {
        prim("sizeof_label", vec![label])
    }

    fn list_open_size(&self, element: &ValueType, at: Loc<'_>, count: Expr) -> Expr {
        if may_be_empty(element, Some(at.root)) {
            prim("sizeof_list_count", vec![count])
        } else {
            Expr::U64(1)
        }
    }

    fn null_size(&self, _at: Loc<'_>) -> Expr {
        Expr::U64(NULL.len() as u64)
    }

    fn not_null_size(&self, ty: &ValueType, at: Loc<'_>) -> Expr {
        if may_begin_with_null(ty, Some(at.root)) {
            Expr::U64(SOME.len() as u64)
        } else {
            Expr::U64(0)
        }
    }
}

fn quote(s: &str, delim: char, out: &mut String) {
    out.push(delim);
    for c in s.chars() {
        if c == delim || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(delim);
}

fn format_scalar(kind: BaseKind, value: &Value) -> EvalResult<String> {
    let text = match (kind, value) {
        (BaseKind::Float, Value::Float(f)) => format!("{f:?}"),
        (BaseKind::Bool, Value::Bool(b)) => b.to_string(),
        (BaseKind::Char, Value::Char(c)) => {
            let mut out = String::new();
            quote(c.encode_utf8(&mut [0; 4]), '\'', &mut out);
            out
        }
        (BaseKind::String, Value::String(s)) => {
            let mut out = String::with_capacity(s.len() + 2);
            quote(s, '"', &mut out);
            out
        }
        (BaseKind::Int { .. }, Value::Uint { value: n, .. }) => {
            check_int(kind, value)?;
            n.to_string()
        }
        (BaseKind::Int { .. }, Value::Int { value: n, .. }) => {
            check_int(kind, value)?;
            n.to_string()
        }
        (kind, other) => return Err(EvalError::mismatch(kind.name(), other)),
    };
    Ok(text)
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b' ' | b'(' | b')')
}

/// Bare token up to the next delimiter.
fn token(src: &ReadCursor) -> EvalResult<(&str, ReadCursor)> {
    let len = src
        .rest()
        .iter()
        .position(|b| is_delimiter(*b))
        .unwrap_or(src.rest().len());
    if len == 0 {
        return Err(src.malformed("expected a token"));
    }
    let (bytes, next) = src.take(len)?;
    let text = std::str::from_utf8(bytes).map_err(|e| src.malformed(format!("invalid utf-8: {e}")))?;
    Ok((text, next))
}

/// Quoted text delimited by `delim`, unescaped.
fn quoted(src: &ReadCursor, delim: u8) -> EvalResult<(String, ReadCursor)> {
    let rest = src.rest();
    if rest.first() != Some(&delim) {
        return Err(src.malformed(format!("expected {}", delim as char)));
    }
    let mut raw = Vec::new();
    let mut i = 1;
    loop {
        match rest.get(i) {
            None => return Err(src.truncated(i + 1)),
            Some(b'\\') => {
                let escaped = rest.get(i + 1).ok_or_else(|| src.truncated(i + 2))?;
                raw.push(*escaped);
                i += 2;
            }
            Some(b) if *b == delim => break,
            Some(b) => {
                raw.push(*b);
                i += 1;
            }
        }
    }
    let text = String::from_utf8(raw).map_err(|e| src.malformed(format!("invalid utf-8: {e}")))?;
    Ok((text, src.advance(i + 1)?))
}

fn read_scalar(kind: BaseKind, src: &ReadCursor) -> EvalResult<(Value, ReadCursor)> {
    match kind {
        BaseKind::String => {
            let (text, next) = quoted(src, b'"')?;
            Ok((Value::String(text), next))
        }
        BaseKind::Char => {
            let (text, next) = quoted(src, b'\'')?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok((Value::Char(c), next)),
                _ => Err(src.malformed(format!("expected one char, found '{text}'"))),
            }
        }
        BaseKind::Bool => {
            let (text, next) = token(src)?;
            let b = text
                .parse()
                .map_err(|_| src.malformed(format!("invalid bool '{text}'")))?;
            Ok((Value::Bool(b), next))
        }
        BaseKind::Float => {
            let (text, next) = token(src)?;
            let f = text
                .parse()
                .map_err(|_| src.malformed(format!("invalid float '{text}'")))?;
            Ok((Value::Float(f), next))
        }
        BaseKind::Int { .. } => {
            let (text, next) = token(src)?;
            int_value(kind, text.parse().ok(), text.parse().ok())
                .map(|value| (value, next))
                .ok_or_else(|| src.malformed(format!("invalid {kind} '{text}'")))
        }
    }
}

fn expect(src: &ReadCursor, byte: u8) -> EvalResult<ReadCursor> {
    match src.peek() {
        Some(b) if b == byte => src.advance(1),
        Some(b) => Err(src.malformed(format!(
            "expected '{}', found '{}'",
            byte as char, b as char
        ))),
        None => Err(src.truncated(1)),
    }
}

fn write(dst: &WriteCursor, bytes: &[u8]) -> Value {
    Value::Writer(dst.write(bytes))
}

fn label_text(label: u64) -> String {
    format!("({label} ")
}

impl Host for SExpr {
    fn call(&self, prim: &str, args: Vec<Value>) -> EvalResult<Value> {
        let Some(op) = prim.strip_prefix(PREFIX) else {
            return Err(EvalError::UnknownPrimitive {
                prim: prim.to_string(),
            });
        };
        match (op, args.as_slice()) {
            ("expect_open", [Value::Reader(src)]) => Ok(Value::Reader(expect(src, b'(')?)),
            ("expect_sep", [Value::Reader(src)]) => Ok(Value::Reader(expect(src, b' ')?)),
            ("expect_close", [Value::Reader(src)]) => Ok(Value::Reader(expect(src, b')')?)),
            ("write_open", [Value::Writer(dst)]) => Ok(write(dst, b"(")),
            ("write_sep", [Value::Writer(dst)]) => Ok(write(dst, b" ")),
            ("write_close", [Value::Writer(dst)]) => Ok(write(dst, b")")),
            ("read_label", [Value::Reader(src)]) => {
                let src = expect(src, b'(')?;
                let (text, next) = token(&src)?;
                let label = text
                    .parse()
                    .map_err(|_| src.malformed(format!("invalid sum label '{text}'")))?;
                let next = expect(&next, b' ')?;
                Ok(Value::pair(Value::U64(label), Value::Reader(next)))
            }
            ("write_label", [Value::U64(label), Value::Writer(dst)]) => {
                Ok(write(dst, label_text(*label).as_bytes()))
            }
            ("sizeof_label", [Value::U64(label)]) => Ok(Value::U64(label_text(*label).len() as u64)),
            ("read_list_count", [Value::Reader(src)]) => {
                let src = expect(src, b'(')?;
                let (text, next) = token(&src)?;
                let count = text
                    .parse()
                    .map_err(|_| src.malformed(format!("invalid list count '{text}'")))?;
                let next = expect(&next, b' ')?;
                Ok(Value::pair(Value::U64(count), Value::Reader(next)))
            }
            ("write_list_count", [Value::U64(count), Value::Writer(dst)]) => {
                Ok(write(dst, list_count_text(*count).as_bytes()))
            }
            ("sizeof_list_count", [Value::U64(count)]) => {
                Ok(Value::U64(list_count_text(*count).len() as u64))
            }
            ("is_end", [Value::Reader(src)]) => match src.peek() {
                Some(b) => Ok(Value::Bool(b == b')')),
                None => Err(src.truncated(1)),
            },
            ("is_null", [Value::Reader(src)]) => Ok(Value::Bool(src.rest().starts_with(NULL))),
            ("expect_null", [Value::Reader(src)]) => Ok(Value::Reader(src.advance(NULL.len())?)),
            ("write_null", [Value::Writer(dst)]) => Ok(write(dst, NULL)),
            ("expect_some", [Value::Reader(src)]) => {
                if !src.rest().starts_with(SOME) {
                    return Err(src.malformed("expected 'some '"));
                }
                Ok(Value::Reader(src.advance(SOME.len())?))
            }
            ("write_some", [Value::Writer(dst)]) => Ok(write(dst, SOME)),
            _ => match (scalar_op(op), args.as_slice()) {
                (Some(("read", kind)), [Value::Reader(src)]) => {
                    let (value, next) = read_scalar(kind, src)?;
                    Ok(Value::pair(value, Value::Reader(next)))
                }
                (Some(("write", kind)), [value, Value::Writer(dst)]) => {
                    Ok(write(dst, format_scalar(kind, value)?.as_bytes()))
                }
                (Some(("sizeof", kind)), [value]) => {
                    Ok(Value::U64(format_scalar(kind, value)?.len() as u64))
                }
                (Some(_), _) => Err(unexpected_args(prim, &args)),
                (None, _) => Err(EvalError::UnknownPrimitive {
                    prim: prim.to_string(),
                }),
            },
        }
    }
}
