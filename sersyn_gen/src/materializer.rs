//! Deserializer generation: `src -> (value, src)`.

use crate::codec::{Decoder, Frame, ListOpening, Loc};
use crate::common::{cascade, empty_sum, is_zero, sep_unless_first, unsupported};
use crate::errors::GenResult;
use crate::ir::{Block, Expr, ExtRole, NameGen, Procedure, Program};
use crate::path::Path;
use crate::synth::{GenOptions, Generated};
use sersyn_types::{SetSemantics, Shape, ValueType};
use tracing::debug;

/// Builds a deserializer for `ty` using the default procedure names.
pub fn make_deserializer<C: Decoder + ?Sized>(ty: &ValueType, codec: &C) -> GenResult<Generated> {
    make_deserializer_with(ty, codec, &GenOptions::default())
}

pub fn make_deserializer_with<C: Decoder + ?Sized>(
    ty: &ValueType,
    codec: &C,
    options: &GenOptions,
) -> GenResult<Generated> {
    let (entry, body_name) = options.procedure_names("des")?;
    debug!("generating deserializer {} for {}", entry, ty);

    let mut materializer = Materializer {
        codec,
        root: ty,
        names: NameGen::default(),
        body_name: body_name.clone(),
    };
    let body = materializer.des(ty, &Path::root(), Expr::ident("src"))?;

    let mut names = NameGen::default();
    let mut block = Block::new();
    let src = block.bind(&mut names, "src", codec.start(ty, Expr::ident("src")));
    let (value, src) = block.bind_pair(
        &mut names,
        "v",
        "src",
        Expr::CallProc {
            name: body_name.clone(),
            args: vec![src],
        },
    );
    let src = block.bind(&mut names, "src", codec.stop(ty, src));
    let entry_body = block.finish(Expr::pair(value, src));

    let mut program = Program::default();
    program.insert(Procedure::new(body_name.clone(), vec!["src".into()], body));
    program.insert(Procedure::new(entry.clone(), vec!["src".into()], entry_body));
    Ok(Generated {
        program,
        entry,
        body: body_name,
    })
}

struct Materializer<'a, C: Decoder + ?Sized> {
    codec: &'a C,
    root: &'a ValueType,
    names: NameGen,
    body_name: String,
}

impl<'a, C: Decoder + ?Sized> Materializer<'a, C> {
    fn loc<'p>(&self, path: &'p Path) -> Loc<'p>
    where
        'a: 'p,
    {
        Loc {
            root: self.root,
            path,
        }
    }

    /// Yields `(value, src)` for a value of type `ty` read from `src`.
    fn des(&mut self, ty: &ValueType, path: &Path, src: Expr) -> GenResult<Expr> {
        if !ty.nullable {
            return self.des_shape(ty, path, src);
        }
        let at = self.loc(path);
        let is_null = self.codec.is_null(at, src.clone());
        let null_branch = Expr::pair(Expr::Null, self.codec.null(at, src.clone()));

        let mut block = Block::new();
        let src = block.bind(&mut self.names, "src", self.codec.not_null(ty, at, src));
        let read = self.des_shape(ty, path, src)?;
        let (value, src) = block.bind_pair(&mut self.names, "v", "src", read);
        let not_null_branch = block.finish(Expr::pair(Expr::NotNull(Box::new(value)), src));

        Ok(Expr::if_(is_null, null_branch, not_null_branch))
    }

    fn des_shape(&mut self, ty: &ValueType, path: &Path, src: Expr) -> GenResult<Expr> {
        let at = self.loc(path);
        match &ty.shape {
            Shape::Void => Ok(Expr::pair(Expr::Unit, src)),
            Shape::Base(kind) => Ok(self.codec.scalar(*kind, at, src)),
            Shape::This => Ok(Expr::CallProc {
                name: self.body_name.clone(),
                args: vec![src],
            }),
            Shape::Ext(name) => Ok(Expr::CallExternal {
                type_name: name.clone(),
                role: ExtRole::Deserialize,
                args: vec![src],
            }),
            Shape::Usr { name, underlying } => {
                let read = self.des(underlying, path, src)?;
                let mut block = Block::new();
                let (value, src) = block.bind_pair(&mut self.names, "v", "src", read);
                let wrapped = Expr::Wrap {
                    name: name.clone(),
                    value: Box::new(value),
                };
                Ok(block.finish(Expr::pair(wrapped, src)))
            }
            Shape::Vec { dim, element } => {
                let frame = Frame::Vec {
                    dim: *dim,
                    element,
                };
                let items: Vec<&ValueType> = (0..*dim).map(|_| element.as_ref()).collect();
                let (block, values, src) = self.des_items(frame, &items, path, src)?;
                Ok(block.finish(Expr::pair(Expr::MakeVec(values), src)))
            }
            Shape::Lst(element) => self.des_list(element, path, src, false),
            Shape::Set {
                semantics: SetSemantics::Simple,
                element,
            } => self.des_list(element, path, src, true),
            Shape::Set { .. } => Err(unsupported(ty, path, "only simple sets are supported")),
            Shape::Tup(elements) => {
                let items: Vec<&ValueType> = elements.iter().collect();
                let (block, values, src) = self.des_items(Frame::Tup(elements), &items, path, src)?;
                Ok(block.finish(Expr::pair(Expr::MakeTup(values), src)))
            }
            Shape::Rec(fields) => {
                let items: Vec<&ValueType> = fields.iter().map(|f| &f.value_type).collect();
                let (block, values, src) = self.des_items(Frame::Rec(fields), &items, path, src)?;
                let named = fields
                    .iter()
                    .map(|f| f.name.clone())
                    .zip(values)
                    .collect();
                Ok(block.finish(Expr::pair(Expr::MakeRec(named), src)))
            }
            Shape::Sum(variants) => {
                if variants.is_empty() {
                    return Err(empty_sum(path));
                }
                let mut block = Block::new();
                let opened = self.codec.sum_open(variants, at, src);
                let (label, src) = block.bind_pair(&mut self.names, "label", "src", opened);

                let mut branches = Vec::with_capacity(variants.len());
                for (idx, variant) in variants.iter().enumerate() {
                    let read = self.des(&variant.value_type, &path.index(idx), src.clone())?;
                    let mut branch = Block::new();
                    let (payload, src) = branch.bind_pair(&mut self.names, "v", "src", read);
                    let tagged = Expr::MakeSum {
                        index: idx as u64,
                        name: variant.name.clone(),
                        payload: Box::new(payload),
                    };
                    branches.push(branch.finish(Expr::pair(tagged, src)));
                }
                let dispatch = cascade(&label, branches);
                let (value, src) = block.bind_pair(&mut self.names, "v", "src", dispatch);
                let src = block.bind(
                    &mut self.names,
                    "src",
                    self.codec.close(Frame::Sum(variants), at, src),
                );
                Ok(block.finish(Expr::pair(value, src)))
            }
            Shape::Map { .. } => Err(unsupported(ty, path, "maps cannot be deserialized")),
        }
    }

    /// Reads the elements of a tuple, record or vector. Returns the pending
    /// bindings, one variable per element and the final cursor.
    fn des_items(
        &mut self,
        frame: Frame<'_>,
        items: &[&ValueType],
        path: &Path,
        src: Expr,
    ) -> GenResult<(Block, Vec<Expr>, Expr)> {
        let at = self.loc(path);
        let mut block = Block::new();
        let mut src = block.bind(&mut self.names, "src", self.codec.open(frame, at, src));
        let mut values = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                src = block.bind(&mut self.names, "src", self.codec.sep(frame, at, src));
            }
            let read = self.des(item, &path.index(idx), src)?;
            let (value, next) = block.bind_pair(&mut self.names, "v", "src", read);
            values.push(value);
            src = next;
        }
        let src = block.bind(&mut self.names, "src", self.codec.close(frame, at, src));
        Ok((block, values, src))
    }

    fn des_list(
        &mut self,
        element: &ValueType,
        path: &Path,
        src: Expr,
        as_set: bool,
    ) -> GenResult<Expr> {
        let at = self.loc(path);
        let finish = |list: Expr| {
            let ordered = Expr::Reverse(Box::new(list));
            if as_set {
                Expr::ToSet(Box::new(ordered))
            } else {
                ordered
            }
        };
        match self.codec.list_open(element, at, src) {
            ListOpening::KnownSize(opened) => {
                let mut block = Block::new();
                let (count, src) = block.bind_pair(&mut self.names, "n", "src", opened);

                let idx_name = self.names.fresh("i");
                let acc_name = self.names.fresh("acc");
                let idx = Expr::ident(idx_name.as_str());
                let mut step = Block::new();
                let (list, elem_src) =
                    step.bind_pair(&mut self.names, "lst", "src", Expr::ident(acc_name.as_str()));
                let sep = self.codec.sep(Frame::Lst(element), at, elem_src.clone());
                let elem_src = step.bind(
                    &mut self.names,
                    "src",
                    sep_unless_first(is_zero(idx.clone()), sep, elem_src),
                );
                let read = self.des(element, &path.runtime(idx), elem_src)?;
                let (value, elem_src) = step.bind_pair(&mut self.names, "v", "src", read);
                let step = step.finish(Expr::pair(Expr::cons(value, list), elem_src));

                let fold = Expr::repeat(
                    Expr::U64(0),
                    count,
                    Expr::pair(Expr::EmptyList, src),
                    Expr::lambda([idx_name, acc_name], step),
                );
                let (list, src) = block.bind_pair(&mut self.names, "lst", "src", fold);
                let src = block.bind(
                    &mut self.names,
                    "src",
                    self.codec.close(Frame::Lst(element), at, src),
                );
                Ok(block.finish(Expr::pair(finish(list), src)))
            }
            ListOpening::UnknownSize(opened) => {
                let mut block = Block::new();
                let src = block.bind(&mut self.names, "src", opened);
                let count = block.bind(&mut self.names, "n", Expr::make_ref(Expr::U64(0)));
                let acc = block.bind(&mut self.names, "acc", Expr::make_ref(Expr::EmptyList));

                let cond_src = self.names.fresh("src");
                let cond = Expr::not(self.codec.is_end_of_list(
                    element,
                    at,
                    Expr::ident(cond_src.as_str()),
                ));

                let step_src_name = self.names.fresh("src");
                let step_src = Expr::ident(step_src_name.as_str());
                let current = Expr::get_ref(count.clone());
                let mut step = Block::new();
                let sep = self.codec.sep(Frame::Lst(element), at, step_src.clone());
                let step_src = step.bind(
                    &mut self.names,
                    "src",
                    sep_unless_first(is_zero(current.clone()), sep, step_src),
                );
                let read = self.des(element, &path.runtime(current.clone()), step_src)?;
                let (value, step_src) = step.bind_pair(&mut self.names, "v", "src", read);
                step.effect(Expr::set_ref(
                    acc.clone(),
                    Expr::cons(value, Expr::get_ref(acc.clone())),
                ));
                step.effect(Expr::set_ref(
                    count.clone(),
                    Expr::add(current, Expr::U64(1)),
                ));
                let step = step.finish(step_src);

                let looped = Expr::while_(
                    src,
                    Expr::lambda([cond_src], cond),
                    Expr::lambda([step_src_name], step),
                );
                let src = block.bind(&mut self.names, "src", looped);
                let src = block.bind(
                    &mut self.names,
                    "src",
                    self.codec.close(Frame::Lst(element), at, src),
                );
                Ok(block.finish(Expr::pair(finish(Expr::get_ref(acc)), src)))
            }
        }
    }
}
