//! Serializer generation: `(mask, value, dst) -> dst` or `(value, dst) -> dst`.

use crate::codec::{Encoder, Frame, Loc};
use crate::common::{cascade, empty_sum, is_zero, sep_unless_first, unsupported};
use crate::errors::GenResult;
use crate::field_mask::FieldMask;
use crate::ir::{Block, Expr, ExtRole, NameGen, Procedure, Program};
use crate::path::Path;
use crate::synth::{GenOptions, Generated};
use sersyn_types::{MaskAction, SetSemantics, Shape, ValueType};
use tracing::debug;

pub fn make_serializer<C: Encoder + ?Sized>(
    ty: &ValueType,
    with_mask: bool,
    codec: &C,
) -> GenResult<Generated> {
    make_serializer_with(ty, with_mask, codec, &GenOptions::default())
}

pub fn make_serializer_with<C: Encoder + ?Sized>(
    ty: &ValueType,
    with_mask: bool,
    codec: &C,
    options: &GenOptions,
) -> GenResult<Generated> {
    let prefix = if with_mask { "ser_masked" } else { "ser" };
    let (entry, body_name) = options.procedure_names(prefix)?;
    debug!("generating serializer {} for {}", entry, ty);

    let params: Vec<String> = if with_mask {
        vec!["mask".into(), "v".into(), "dst".into()]
    } else {
        vec!["v".into(), "dst".into()]
    };
    let mask = if with_mask {
        FieldMask::Runtime(Expr::ident("mask"))
    } else {
        FieldMask::CompileTime
    };

    let mut serializer = Serializer {
        codec,
        root: ty,
        names: NameGen::default(),
        body_name: body_name.clone(),
        with_mask,
    };
    let body = serializer.ser(ty, &mask, &Path::root(), Expr::ident("v"), Expr::ident("dst"))?;

    let mut names = NameGen::default();
    let mut block = Block::new();
    let dst = block.bind(&mut names, "dst", codec.start(ty, Expr::ident("dst")));
    let mut args: Vec<Expr> = params.iter().map(|p| Expr::ident(p.as_str())).collect();
    if let Some(last) = args.last_mut() {
        *last = dst;
    }
    let dst = block.bind(
        &mut names,
        "dst",
        Expr::CallProc {
            name: body_name.clone(),
            args,
        },
    );
    let entry_body = block.finish(codec.stop(ty, dst));

    let mut program = Program::default();
    program.insert(Procedure::new(body_name.clone(), params.clone(), body));
    program.insert(Procedure::new(entry.clone(), params, entry_body));
    Ok(Generated {
        program,
        entry,
        body: body_name,
    })
}

struct Serializer<'a, C: Encoder + ?Sized> {
    codec: &'a C,
    root: &'a ValueType,
    names: NameGen,
    body_name: String,
    with_mask: bool,
}

impl<'a, C: Encoder + ?Sized> Serializer<'a, C> {
    fn loc<'p>(&self, path: &'p Path) -> Loc<'p>
    where
        'a: 'p,
    {
        Loc {
            root: self.root,
            path,
        }
    }

    /// Writes `v` to `dst` honouring `mask`; yields the advanced cursor.
    fn ser(
        &mut self,
        ty: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
        dst: Expr,
    ) -> GenResult<Expr> {
        match mask {
            FieldMask::CompileTime => self.ser_nullable(ty, mask, path, v, dst),
            FieldMask::Runtime(m) => {
                let written = self.ser_unless_set_null(ty, m, mask, path, v, dst.clone())?;
                Ok(Expr::if_(Expr::mask_is(m.clone(), MaskAction::Skip), dst, written))
            }
        }
    }

    /// Runtime-masked write once `Skip` has been ruled out.
    fn ser_unless_set_null(
        &mut self,
        ty: &ValueType,
        m: &Expr,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
        dst: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let forced = if ty.nullable {
            self.codec.null(at, dst.clone())
        } else {
            Expr::Seq(vec![
                Expr::assert(
                    Expr::Bool(false),
                    format!("set-null mask on non-nullable {ty} at {path}"),
                ),
                dst.clone(),
            ])
        };
        let normal = self.ser_nullable(ty, mask, path, v, dst)?;
        Ok(Expr::if_(
            Expr::mask_is(m.clone(), MaskAction::SetNull),
            forced,
            normal,
        ))
    }

    fn ser_nullable(
        &mut self,
        ty: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
        dst: Expr,
    ) -> GenResult<Expr> {
        if !ty.nullable {
            return self.ser_shape(ty, mask, path, v, dst);
        }
        let at = self.loc(path);
        let null_branch = self.codec.null(at, dst.clone());

        let mut block = Block::new();
        let dst = block.bind(&mut self.names, "dst", self.codec.not_null(ty, at, dst));
        let value = block.bind(&mut self.names, "v", Expr::ForceNotNull(Box::new(v.clone())));
        let written = self.ser_shape(ty, mask, path, value, dst)?;
        let not_null_branch = block.finish(written);

        Ok(Expr::if_(Expr::IsNull(Box::new(v)), null_branch, not_null_branch))
    }

    fn ser_shape(
        &mut self,
        ty: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
        dst: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        match &ty.shape {
            Shape::Void => Ok(dst),
            Shape::Base(kind) => Ok(self.codec.scalar(*kind, at, v, dst)),
            Shape::This => {
                let args = if self.with_mask {
                    vec![mask.to_arg(), v, dst]
                } else {
                    vec![v, dst]
                };
                Ok(Expr::CallProc {
                    name: self.body_name.clone(),
                    args,
                })
            }
            Shape::Ext(name) => {
                let (role, args) = match mask {
                    FieldMask::Runtime(m) => (ExtRole::SerializeMasked, vec![m.clone(), v, dst]),
                    FieldMask::CompileTime => (ExtRole::Serialize, vec![v, dst]),
                };
                Ok(Expr::CallExternal {
                    type_name: name.clone(),
                    role,
                    args,
                })
            }
            Shape::Usr { underlying, .. } => {
                self.ser_nullable(underlying, mask, path, Expr::Unwrap(Box::new(v)), dst)
            }
            Shape::Vec { dim, element } => {
                let frame = Frame::Vec {
                    dim: *dim,
                    element,
                };
                let inner = mask.degrade_to_copy();
                let mut block = Block::new();
                let mut dst = block.bind(&mut self.names, "dst", self.codec.open(frame, at, dst));
                for idx in 0..*dim as usize {
                    if idx > 0 {
                        dst = block.bind(&mut self.names, "dst", self.codec.sep(frame, at, dst));
                    }
                    let item = Expr::get_item(v.clone(), idx);
                    let written = self.ser(element, &inner, &path.index(idx), item, dst)?;
                    dst = block.bind(&mut self.names, "dst", written);
                }
                Ok(block.finish(self.codec.close(frame, at, dst)))
            }
            Shape::Lst(element) => self.ser_list(element, mask, path, v, dst),
            Shape::Set {
                semantics: SetSemantics::Simple,
                element,
            } => self.ser_list(element, mask, path, v, dst),
            Shape::Set { .. } => Err(unsupported(ty, path, "only simple sets are supported")),
            Shape::Tup(elements) => {
                let items: Vec<(Expr, &ValueType)> = elements
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| (Expr::get_item(v.clone(), idx), ty))
                    .collect();
                self.ser_items(Frame::Tup(elements), &items, mask, path, dst)
            }
            Shape::Rec(fields) => {
                let items: Vec<(Expr, &ValueType)> = fields
                    .iter()
                    .map(|f| (Expr::get_field(v.clone(), f.name.as_str()), &f.value_type))
                    .collect();
                self.ser_items(Frame::Rec(fields), &items, mask, path, dst)
            }
            Shape::Sum(variants) => {
                if variants.is_empty() {
                    return Err(empty_sum(path));
                }
                let inner = mask.degrade_to_copy();
                let mut block = Block::new();
                let label = block.bind(&mut self.names, "label", Expr::SumLabel(Box::new(v.clone())));
                let dst = block.bind(
                    &mut self.names,
                    "dst",
                    self.codec.sum_open(variants, at, label.clone(), dst),
                );
                let payload = Expr::SumPayload(Box::new(v));
                let mut branches = Vec::with_capacity(variants.len());
                for (idx, variant) in variants.iter().enumerate() {
                    branches.push(self.ser(
                        &variant.value_type,
                        &inner,
                        &path.index(idx),
                        payload.clone(),
                        dst.clone(),
                    )?);
                }
                let dst = block.bind(&mut self.names, "dst", cascade(&label, branches));
                Ok(block.finish(self.codec.close(Frame::Sum(variants), at, dst)))
            }
            Shape::Map { .. } => Err(unsupported(ty, path, "maps cannot be serialized")),
        }
    }

    /// Writes the members of a tuple or record. Under a runtime mask a member
    /// may be skipped, so separators are only written once something has been
    /// written before.
    fn ser_items(
        &mut self,
        frame: Frame<'_>,
        items: &[(Expr, &ValueType)],
        mask: &FieldMask,
        path: &Path,
        dst: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let mut block = Block::new();
        let mut dst = block.bind(&mut self.names, "dst", self.codec.open(frame, at, dst));

        match mask {
            FieldMask::CompileTime => {
                for (idx, (value, ty)) in items.iter().enumerate() {
                    if idx > 0 {
                        dst = block.bind(&mut self.names, "dst", self.codec.sep(frame, at, dst));
                    }
                    let written = self.ser(ty, mask, &path.index(idx), value.clone(), dst)?;
                    dst = block.bind(&mut self.names, "dst", written);
                }
            }
            FieldMask::Runtime(_) => {
                let wrote = block.bind(&mut self.names, "wrote", Expr::make_ref(Expr::Bool(false)));
                for (idx, (value, ty)) in items.iter().enumerate() {
                    let field_mask = mask.project(idx);
                    let entry = field_mask.to_arg();
                    let field_path = path.index(idx);

                    let mut field = Block::new();
                    let sep = self.codec.sep(frame, at, dst.clone());
                    let first = Expr::not(Expr::get_ref(wrote.clone()));
                    let field_dst = field.bind(
                        &mut self.names,
                        "dst",
                        sep_unless_first(first, sep, dst.clone()),
                    );
                    field.effect(Expr::set_ref(wrote.clone(), Expr::Bool(true)));
                    let written = self.ser_unless_set_null(
                        ty,
                        &entry,
                        &field_mask,
                        &field_path,
                        value.clone(),
                        field_dst,
                    )?;
                    let field = field.finish(written);

                    dst = block.bind(
                        &mut self.names,
                        "dst",
                        Expr::if_(Expr::mask_is(entry, MaskAction::Skip), dst, field),
                    );
                }
            }
        }
        Ok(block.finish(self.codec.close(frame, at, dst)))
    }

    fn ser_list(
        &mut self,
        element: &ValueType,
        mask: &FieldMask,
        path: &Path,
        v: Expr,
        dst: Expr,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let frame = Frame::Lst(element);
        let inner = mask.degrade_to_copy();
        let mut block = Block::new();
        let count = block.bind(&mut self.names, "n", Expr::Cardinality(Box::new(v.clone())));
        let dst = block.bind(
            &mut self.names,
            "dst",
            self.codec.list_open(element, at, count.clone(), dst),
        );

        let idx_name = self.names.fresh("i");
        let acc_name = self.names.fresh("dst");
        let idx = Expr::ident(idx_name.as_str());
        let acc = Expr::ident(acc_name.as_str());
        let mut step = Block::new();
        let sep = self.codec.sep(frame, at, acc.clone());
        let elem_dst = step.bind(
            &mut self.names,
            "dst",
            sep_unless_first(is_zero(idx.clone()), sep, acc),
        );
        let item = Expr::nth(v, idx.clone());
        let written = self.ser(element, &inner, &path.runtime(idx), item, elem_dst)?;
        let step = step.finish(written);

        let fold = Expr::repeat(
            Expr::U64(0),
            count,
            dst,
            Expr::lambda([idx_name, acc_name], step),
        );
        let dst = block.bind(&mut self.names, "dst", fold);
        Ok(block.finish(self.codec.close(frame, at, dst)))
    }
}
