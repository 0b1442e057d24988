//! Capability interface of a wire format.
//!
//! A format backend never sees heap values directly: every method receives IR
//! expressions for the cursor (and value, where relevant) and returns the IR
//! expression performing its part of the job. Generators stay format agnostic
//! and only decide *where* primitives are called.

use crate::ir::Expr;
use crate::path::Path;
use sersyn_types::{BaseKind, Field, ValueType};

/// Where a primitive is invoked: the root type being processed and the path
/// to the current node.
#[derive(Debug, Clone, Copy)]
pub struct Loc<'a> {
    pub root: &'a ValueType,
    pub path: &'a Path,
}

/// Composite shape whose framing is being read or written. Sets are framed as
/// lists.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    Tup(&'a [ValueType]),
    Rec(&'a [Field]),
    Vec { dim: u32, element: &'a ValueType },
    Lst(&'a ValueType),
    Sum(&'a [Field]),
}

/// How a list header is decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOpening {
    /// The element count is read up front; the expression yields `(count, src)`.
    KnownSize(Expr),
    /// Elements are read until [`Decoder::is_end_of_list`] holds; the
    /// expression yields the advanced `src`.
    UnknownSize(Expr),
}

pub trait Decoder {
    fn start(&self, _root: &ValueType, src: Expr) -> Expr {
        src
    }

    fn stop(&self, _root: &ValueType, src: Expr) -> Expr {
        src
    }

    /// Yields `(value, src)`.
    fn scalar(&self, kind: BaseKind, at: Loc<'_>, src: Expr) -> Expr;

    /// Opening of a tuple, record or vector.
    fn open(&self, frame: Frame<'_>, at: Loc<'_>, src: Expr) -> Expr;

    fn sep(&self, frame: Frame<'_>, at: Loc<'_>, src: Expr) -> Expr;

    fn close(&self, frame: Frame<'_>, at: Loc<'_>, src: Expr) -> Expr;

    /// Yields `(label, src)`.
    fn sum_open(&self, variants: &[Field], at: Loc<'_>, src: Expr) -> Expr;

    fn list_open(&self, element: &ValueType, at: Loc<'_>, src: Expr) -> ListOpening;

    /// Boolean test, only used after an [`ListOpening::UnknownSize`] opening.
    fn is_end_of_list(&self, element: &ValueType, at: Loc<'_>, src: Expr) -> Expr;

    fn is_null(&self, at: Loc<'_>, src: Expr) -> Expr;

    /// Consumes the null marker.
    fn null(&self, at: Loc<'_>, src: Expr) -> Expr;

    /// Consumes the not-null marker in front of a present value of `ty`.
    fn not_null(&self, ty: &ValueType, at: Loc<'_>, src: Expr) -> Expr;
}

pub trait Encoder {
    fn start(&self, _root: &ValueType, dst: Expr) -> Expr {
        dst
    }

    fn stop(&self, _root: &ValueType, dst: Expr) -> Expr {
        dst
    }

    fn scalar(&self, kind: BaseKind, at: Loc<'_>, value: Expr, dst: Expr) -> Expr;

    fn open(&self, frame: Frame<'_>, at: Loc<'_>, dst: Expr) -> Expr;

    fn sep(&self, frame: Frame<'_>, at: Loc<'_>, dst: Expr) -> Expr;

    fn close(&self, frame: Frame<'_>, at: Loc<'_>, dst: Expr) -> Expr;

    fn sum_open(&self, variants: &[Field], at: Loc<'_>, label: Expr, dst: Expr) -> Expr;

    fn list_open(&self, element: &ValueType, at: Loc<'_>, count: Expr, dst: Expr) -> Expr;

    fn null(&self, at: Loc<'_>, dst: Expr) -> Expr;

    /// Writes the not-null marker in front of a present value of `ty`.
    fn not_null(&self, ty: &ValueType, at: Loc<'_>, dst: Expr) -> Expr;
}

/// Byte cost of every [`Encoder`] primitive, without writing anything. Each
/// method must agree exactly with what its `Encoder` counterpart writes.
pub trait SizeCodec {
    fn start_size(&self, _root: &ValueType) -> Expr {
        Expr::U64(0)
    }

    fn stop_size(&self, _root: &ValueType) -> Expr {
        Expr::U64(0)
    }

    fn scalar_size(&self, kind: BaseKind, at: Loc<'_>, value: Expr) -> Expr;

    fn open_size(&self, frame: Frame<'_>, at: Loc<'_>) -> Expr;

    fn sep_size(&self, frame: Frame<'_>, at: Loc<'_>) -> Expr;

    fn close_size(&self, frame: Frame<'_>, at: Loc<'_>) -> Expr;

    fn sum_open_size(&self, variants: &[Field], at: Loc<'_>, label: Expr) -> Expr;

    fn list_open_size(&self, element: &ValueType, at: Loc<'_>, count: Expr) -> Expr;

    fn null_size(&self, at: Loc<'_>) -> Expr;

    fn not_null_size(&self, ty: &ValueType, at: Loc<'_>) -> Expr;
}
