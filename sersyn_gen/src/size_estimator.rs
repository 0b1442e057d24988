//! Size estimator generation: `(mask, value) -> bytes` or `(value) -> bytes`.
//!
//! The generated procedure follows the serializer step by step and adds up the
//! byte cost the [`SizeCodec`] reports for each primitive the serializer would
//! call, so its result is exactly the number of bytes written.

use crate::codec::{Frame, Loc, SizeCodec};
use crate::common::{cascade, empty_sum, is_zero, sum_sizes, unsupported};
use crate::errors::GenResult;
use crate::field_mask::FieldMask;
use crate::ir::{Block, Expr, ExtRole, NameGen, Procedure, Program};
use crate::path::Path;
use crate::synth::{GenOptions, Generated};
use sersyn_types::{MaskAction, SetSemantics, Shape, ValueType};
use tracing::debug;

pub fn make_size_estimator<C: SizeCodec + ?Sized>(
    ty: &ValueType,
    with_mask: bool,
    codec: &C,
) -> GenResult<Generated> {
    make_size_estimator_with(ty, with_mask, codec, &GenOptions::default())
}

pub fn make_size_estimator_with<C: SizeCodec + ?Sized>(
    ty: &ValueType,
    with_mask: bool,
    codec: &C,
    options: &GenOptions,
) -> GenResult<Generated> {
    let prefix = if with_mask { "sersize_masked" } else { "sersize" };
    let (entry, body_name) = options.procedure_names(prefix)?;
    debug!("generating size estimator {} for {}", entry, ty);

    let params: Vec<String> = if with_mask {
        vec!["mask".into(), "v".into()]
    } else {
        vec!["v".into()]
    };
    let mask = if with_mask {
        FieldMask::Runtime(Expr::ident("mask"))
    } else {
        FieldMask::CompileTime
    };

    let mut estimator = SizeEstimator {
        codec,
        root: ty,
        names: NameGen::default(),
        body_name: body_name.clone(),
        with_mask,
    };
    let body = estimator.size(ty, &mask, &Path::root(), Expr::ident("v"))?;

    let call = Expr::CallProc {
        name: body_name.clone(),
        args: params.iter().map(|p| Expr::ident(p.as_str())).collect(),
    };
    let entry_body = sum_sizes([codec.start_size(ty), call, codec.stop_size(ty)]);

    let mut program = Program::default();
    program.insert(Procedure::new(body_name.clone(), params.clone(), body));
    program.insert(Procedure::new(entry.clone(), params, entry_body));
    Ok(Generated {
        program,
        entry,
        body: body_name,
    })
}

struct SizeEstimator<'a, C: SizeCodec + ?Sized> {
    codec: &'a C,
    root: &'a ValueType,
    names: NameGen,
    body_name: String,
    with_mask: bool,
}

impl<'a, C: SizeCodec + ?Sized> SizeEstimator<'a, C> {
    fn loc<'p>(&self, path: &'p Path) -> Loc<'p>
    where
        'a: 'p,
    {
        Loc {
            root: self.root,
            path,
        }
    }

    /// Binds a non-constant size so later terms are evaluated after it.
    fn bind_size(&mut self, block: &mut Block, size: Expr) -> Expr {
        match size {
            Expr::U64(_) => size,
            other => block.bind(&mut self.names, "s", other),
        }
    }

    fn size(&mut self, ty: &ValueType, mask: &FieldMask, path: &Path, v: Expr) -> GenResult<Expr> {
        match mask {
            FieldMask::CompileTime => self.size_nullable(ty, mask, path, v),
            FieldMask::Runtime(m) => {
                let counted = self.size_unless_set_null(ty, m, mask, path, v)?;
                Ok(Expr::if_(
                    Expr::mask_is(m.clone(), MaskAction::Skip),
                    Expr::U64(0),
                    counted,
                ))
            }
        }
    }

    fn size_unless_set_null(
        &mut self,
        ty: &ValueType,
        m: &Expr,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
    ) -> GenResult<Expr> {
        let forced = if ty.nullable {
            self.codec.null_size(self.loc(path))
        } else {
            Expr::Seq(vec![
                Expr::assert(
                    Expr::Bool(false),
                    format!("set-null mask on non-nullable {ty} at {path}"),
                ),
                Expr::U64(0),
            ])
        };
        let normal = self.size_nullable(ty, mask, path, v)?;
        Ok(Expr::if_(
            Expr::mask_is(m.clone(), MaskAction::SetNull),
            forced,
            normal,
        ))
    }

    fn size_nullable(
        &mut self,
        ty: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
    ) -> GenResult<Expr> {
        if !ty.nullable {
            return self.size_shape(ty, mask, path, v);
        }
        let at = self.loc(path);
        let null_branch = self.codec.null_size(at);

        let mut block = Block::new();
        let value = block.bind(&mut self.names, "v", Expr::ForceNotNull(Box::new(v.clone())));
        let shape = self.size_shape(ty, mask, path, value)?;
        let marker = self.codec.not_null_size(ty, at);
        let not_null_branch = block.finish(sum_sizes([marker, shape]));

        Ok(Expr::if_(Expr::IsNull(Box::new(v)), null_branch, not_null_branch))
    }

    fn size_shape(
        &mut self,
        ty: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        match &ty.shape {
            Shape::Void => Ok(Expr::U64(0)),
            Shape::Base(kind) => Ok(self.codec.scalar_size(*kind, at, v)),
            Shape::This => {
                let args = if self.with_mask {
                    vec![mask.to_arg(), v]
                } else {
                    vec![v]
                };
                Ok(Expr::CallProc {
                    name: self.body_name.clone(),
                    args,
                })
            }
            Shape::Ext(name) => {
                let (role, args) = match mask {
                    FieldMask::Runtime(m) => (ExtRole::SizeMasked, vec![m.clone(), v]),
                    FieldMask::CompileTime => (ExtRole::Size, vec![v]),
                };
                Ok(Expr::CallExternal {
                    type_name: name.clone(),
                    role,
                    args,
                })
            }
            Shape::Usr { underlying, .. } => {
                self.size_nullable(underlying, mask, path, Expr::Unwrap(Box::new(v)))
            }
            Shape::Vec { dim, element } => {
                let frame = Frame::Vec {
                    dim: *dim,
                    element,
                };
                let inner = mask.degrade_to_copy();
                let mut terms = vec![self.codec.open_size(frame, at)];
                for idx in 0..*dim as usize {
                    if idx > 0 {
                        terms.push(self.codec.sep_size(frame, at));
                    }
                    let item = Expr::get_item(v.clone(), idx);
                    terms.push(self.size(element, &inner, &path.index(idx), item)?);
                }
                terms.push(self.codec.close_size(frame, at));
                Ok(sum_sizes(terms))
            }
            Shape::Lst(element) => self.size_list(element, mask, path, v),
            Shape::Set {
                semantics: SetSemantics::Simple,
                element,
            } => self.size_list(element, mask, path, v),
            Shape::Set { .. } => Err(unsupported(ty, path, "only simple sets are supported")),
            Shape::Tup(elements) => {
                let items: Vec<(Expr, &ValueType)> = elements
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| (Expr::get_item(v.clone(), idx), ty))
                    .collect();
                self.size_items(Frame::Tup(elements), &items, mask, path)
            }
            Shape::Rec(fields) => {
                let items: Vec<(Expr, &ValueType)> = fields
                    .iter()
                    .map(|f| (Expr::get_field(v.clone(), f.name.as_str()), &f.value_type))
                    .collect();
                self.size_items(Frame::Rec(fields), &items, mask, path)
            }
            Shape::Sum(variants) => {
                if variants.is_empty() {
                    return Err(empty_sum(path));
                }
                let inner = mask.degrade_to_copy();
                let mut block = Block::new();
                let label = block.bind(&mut self.names, "label", Expr::SumLabel(Box::new(v.clone())));
                let payload = Expr::SumPayload(Box::new(v));
                let mut branches = Vec::with_capacity(variants.len());
                for (idx, variant) in variants.iter().enumerate() {
                    branches.push(self.size(
                        &variant.value_type,
                        &inner,
                        &path.index(idx),
                        payload.clone(),
                    )?);
                }
                let total = sum_sizes([
                    self.codec.sum_open_size(variants, at, label.clone()),
                    cascade(&label, branches),
                    self.codec.close_size(Frame::Sum(variants), at),
                ]);
                Ok(block.finish(total))
            }
            Shape::Map { .. } => Err(unsupported(ty, path, "maps cannot be serialized")),
        }
    }

    fn size_items(
        &mut self,
        frame: Frame<'_>,
        items: &[(Expr, &ValueType)],
        mask: &FieldMask,
        path: &Path,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let mut block = Block::new();
        let mut terms = vec![self.codec.open_size(frame, at)];

        match mask {
            FieldMask::CompileTime => {
                for (idx, (value, ty)) in items.iter().enumerate() {
                    if idx > 0 {
                        terms.push(self.codec.sep_size(frame, at));
                    }
                    let size = self.size(ty, mask, &path.index(idx), value.clone())?;
                    terms.push(size);
                }
            }
            FieldMask::Runtime(_) => {
                let wrote = block.bind(&mut self.names, "wrote", Expr::make_ref(Expr::Bool(false)));
                let sep = self.codec.sep_size(frame, at);
                for (idx, (value, ty)) in items.iter().enumerate() {
                    let field_mask = mask.project(idx);
                    let entry = field_mask.to_arg();

                    let mut field = Block::new();
                    let sep_cost = match &sep {
                        Expr::U64(0) => Expr::U64(0),
                        sep => Expr::if_(Expr::get_ref(wrote.clone()), sep.clone(), Expr::U64(0)),
                    };
                    let sep_cost = self.bind_size(&mut field, sep_cost);
                    field.effect(Expr::set_ref(wrote.clone(), Expr::Bool(true)));
                    let size =
                        self.size_unless_set_null(ty, &entry, &field_mask, &path.index(idx), value.clone())?;
                    let field = field.finish(sum_sizes([sep_cost, size]));

                    let counted = Expr::if_(Expr::mask_is(entry, MaskAction::Skip), Expr::U64(0), field);
                    terms.push(self.bind_size(&mut block, counted));
                }
            }
        }
        terms.push(self.codec.close_size(frame, at));
        Ok(block.finish(sum_sizes(terms)))
    }

    fn size_list(
        &mut self,
        element: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let frame = Frame::Lst(element);
        let inner = mask.degrade_to_copy();
        let mut block = Block::new();
        let count = block.bind(&mut self.names, "n", Expr::Cardinality(Box::new(v.clone())));

        let idx_name = self.names.fresh("i");
        let acc_name = self.names.fresh("acc");
        let idx = Expr::ident(idx_name.as_str());
        let sep_cost = match self.codec.sep_size(frame, at) {
            Expr::U64(0) => Expr::U64(0),
            sep => Expr::if_(is_zero(idx.clone()), Expr::U64(0), sep),
        };
        let item = Expr::nth(v, idx.clone());
        let elem = self.size(element, &inner, &path.runtime(idx), item)?;
        let step = sum_sizes([Expr::ident(acc_name.as_str()), sep_cost, elem]);

        let fold = Expr::repeat(
            Expr::U64(0),
            count.clone(),
            Expr::U64(0),
            Expr::lambda([idx_name, acc_name], step),
        );
        let total = sum_sizes([
            self.codec.list_open_size(element, at, count),
            fold,
            self.codec.close_size(frame, at),
        ]);
        Ok(block.finish(total))
    }
}
