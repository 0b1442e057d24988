//! Compile-time view of the field mask threaded through the generators.

use crate::ir::Expr;
use sersyn_types::MaskAction;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldMask {
    /// Copy everything. Emits no masking code at all.
    CompileTime,
    /// Mask value only known when the generated procedure runs.
    Runtime(Expr),
}

impl FieldMask {
    /// Mask of tuple element / record field `idx`.
    pub fn project(&self, idx: usize) -> FieldMask {
        match self {
            FieldMask::CompileTime => FieldMask::CompileTime,
            FieldMask::Runtime(mask) => FieldMask::Runtime(Expr::MaskProject {
                mask: Box::new(mask.clone()),
                index: idx,
            }),
        }
    }

    /// Mask for the interior of a vector, list, set or sum: once the single
    /// entry governing the container has been honoured, nothing below it is
    /// addressable, so everything is copied.
    pub fn degrade_to_copy(&self) -> FieldMask {
        FieldMask::CompileTime
    }

    /// Mask argument for a procedure taking a mask parameter.
    pub fn to_arg(&self) -> Expr {
        match self {
            FieldMask::CompileTime => Expr::MaskConst(MaskAction::Copy),
            FieldMask::Runtime(mask) => mask.clone(),
        }
    }
}
