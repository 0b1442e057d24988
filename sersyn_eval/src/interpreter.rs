use crate::errors::{EvalError, EvalResult};
use crate::host::Host;
use crate::value::{ConsList, ReadCursor, Value, WriteCursor};
use sersyn_gen::codec::{Decoder, Encoder, SizeCodec};
use sersyn_gen::ir::{Expr, ExtRole, Procedure, Program};
use sersyn_gen::{
    make_serializer_with, make_size_estimator_with, synthesize, GenOptions, GenResult, Generated,
};
use sersyn_types::{MaskValue, ValueType};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// Procedures bound to external type names, per calling convention.
#[derive(Debug, Clone, Default)]
pub struct ExternalRegistry {
    procedures: BTreeMap<(String, ExtRole), String>,
}

impl ExternalRegistry {
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        role: ExtRole,
        procedure: impl Into<String>,
    ) {
        self.procedures
            .insert((type_name.into(), role), procedure.into());
    }

    pub fn resolve(&self, type_name: &str, role: ExtRole) -> EvalResult<&str> {
        self.procedures
            .get(&(type_name.to_string(), role))
            .map(String::as_str)
            .ok_or_else(|| EvalError::MissingExternalType {
                type_name: type_name.to_string(),
                role,
            })
    }
}

/// Variables in scope, innermost last.
#[derive(Default)]
struct Env {
    slots: Vec<(String, Value)>,
}

impl Env {
    fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.slots
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::UnboundVariable {
                name: name.to_string(),
            })
    }

    fn push(&mut self, name: &str, value: Value) {
        self.slots.push((name.to_string(), value));
    }

    fn mark(&self) -> usize {
        self.slots.len()
    }

    fn reset(&mut self, mark: usize) {
        self.slots.truncate(mark);
    }
}

/// Evaluates generated programs against a codec [`Host`].
pub struct Interpreter<'h, H: Host + ?Sized> {
    host: &'h H,
    program: Program,
    externals: ExternalRegistry,
}

impl<'h, H: Host + ?Sized> Interpreter<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self {
            host,
            program: Program::default(),
            externals: ExternalRegistry::default(),
        }
    }

    pub fn with_program(host: &'h H, program: &Program) -> Self {
        let mut interpreter = Self::new(host);
        interpreter.load(program);
        interpreter
    }

    /// Adds the procedures of `program`; a procedure of an already loaded
    /// name replaces the old one.
    pub fn load(&mut self, program: &Program) {
        debug!("loading {} procedures", program.procedures.len());
        self.program.extend(program.clone());
    }

    /// Generates every procedure of `ty` under the name `type_name`, loads them
    /// and binds all five external roles of `type_name` to them. Fails without
    /// loading anything if one of the names is already taken.
    pub fn link_type<C>(&mut self, type_name: &str, ty: &ValueType, codec: &C) -> GenResult<()>
    where
        C: Decoder + Encoder + SizeCodec + ?Sized,
    {
        debug!("linking external type {}", type_name);
        let options = GenOptions::named(type_name);
        let plain = synthesize(ty, codec, false, &options)?;
        let masked_serializer = make_serializer_with(ty, true, codec, &options)?;
        let masked_size = make_size_estimator_with(ty, true, codec, &options)?;
        let mut linked = plain.program();
        linked.merge(masked_serializer.program)?;
        linked.merge(masked_size.program)?;
        self.program.merge(linked)?;

        let bindings = [
            (ExtRole::Deserialize, &plain.deserializer.body),
            (ExtRole::Serialize, &plain.serializer.body),
            (ExtRole::SerializeMasked, &masked_serializer.body),
            (ExtRole::Size, &plain.size_estimator.body),
            (ExtRole::SizeMasked, &masked_size.body),
        ];
        for (role, procedure) in bindings {
            self.externals.register(type_name, role, procedure.as_str());
        }
        Ok(())
    }

    /// Checks that every external type referenced by the loaded program is
    /// bound, and every bound procedure exists.
    pub fn verify_links(&self) -> EvalResult<()> {
        for type_name in &self.program.externals {
            for role in ExtRole::ALL {
                let procedure = self.externals.resolve(type_name, role)?;
                self.procedure(procedure)?;
            }
        }
        Ok(())
    }

    fn procedure(&self, name: &str) -> EvalResult<&Procedure> {
        self.program
            .get(name)
            .ok_or_else(|| EvalError::UnknownProcedure {
                name: name.to_string(),
            })
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let procedure = self.procedure(name)?;
        if procedure.params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected: procedure.params.len(),
                found: args.len(),
            });
        }
        let mut env = Env::default();
        for (param, arg) in procedure.params.iter().zip(args) {
            env.push(param, arg);
        }
        self.eval(&procedure.body, &mut env)
    }

    /// Runs a deserializer over `bytes`; returns the value and the number of
    /// bytes consumed.
    pub fn deserialize(&self, generated: &Generated, bytes: &[u8]) -> EvalResult<(Value, usize)> {
        let out = self.call(&generated.entry, vec![Value::Reader(ReadCursor::new(bytes))])?;
        let (value, src) = out.into_pair()?;
        Ok((value, src.into_reader()?.pos()))
    }

    /// Runs a serializer. `mask` is required exactly when the serializer was
    /// generated with a mask parameter.
    pub fn serialize(
        &self,
        generated: &Generated,
        value: &Value,
        mask: Option<&MaskValue>,
    ) -> EvalResult<Vec<u8>> {
        let mut args: Vec<Value> = mask.map(|m| Value::Mask(m.clone())).into_iter().collect();
        args.push(value.clone());
        args.push(Value::Writer(WriteCursor::new()));
        let dst = self.call(&generated.entry, args)?.into_writer()?;
        Ok(dst.bytes())
    }

    pub fn size(
        &self,
        generated: &Generated,
        value: &Value,
        mask: Option<&MaskValue>,
    ) -> EvalResult<u64> {
        let mut args: Vec<Value> = mask.map(|m| Value::Mask(m.clone())).into_iter().collect();
        args.push(value.clone());
        self.call(&generated.entry, args)?.as_u64()
    }

    fn eval_all(&self, exprs: &[Expr], env: &mut Env) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, env)).collect()
    }

    fn eval(&self, expr: &Expr, env: &mut Env) -> EvalResult<Value> {
        match expr {
            Expr::Unit => Ok(Value::Unit),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::U64(n) => Ok(Value::U64(*n)),
            Expr::Ident(name) => env.lookup(name),

            Expr::Let { name, value, body } => {
                let value = self.eval(value, env)?;
                let mark = env.mark();
                env.push(name, value);
                let out = self.eval(body, env);
                env.reset(mark);
                out
            }
            Expr::LetPair {
                first,
                second,
                value,
                body,
            } => {
                let (a, b) = self.eval(value, env)?.into_pair()?;
                let mark = env.mark();
                env.push(first, a);
                env.push(second, b);
                let out = self.eval(body, env);
                env.reset(mark);
                out
            }
            Expr::Pair(a, b) => {
                let a = self.eval(a, env)?;
                let b = self.eval(b, env)?;
                Ok(Value::pair(a, b))
            }
            Expr::First(e) => Ok(self.eval(e, env)?.into_pair()?.0),
            Expr::Second(e) => Ok(self.eval(e, env)?.into_pair()?.1),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env)?.as_bool()? {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Seq(items) => {
                let mut last = Value::Unit;
                for item in items {
                    last = self.eval(item, env)?;
                }
                Ok(last)
            }
            Expr::Repeat {
                from,
                to,
                init,
                body,
            } => {
                let from = self.eval(from, env)?.as_u64()?;
                let to = self.eval(to, env)?.as_u64()?;
                let mut acc = self.eval(init, env)?;
                let (params, body) = lambda(body, 2)?;
                for idx in from..to {
                    let mark = env.mark();
                    env.push(&params[0], Value::U64(idx));
                    env.push(&params[1], acc);
                    let next = self.eval(body, env);
                    env.reset(mark);
                    acc = next?;
                }
                Ok(acc)
            }
            Expr::Loop { init, cond, body } => {
                let mut state = self.eval(init, env)?;
                let (cond_params, cond) = lambda(cond, 1)?;
                let (body_params, body) = lambda(body, 1)?;
                loop {
                    let mark = env.mark();
                    env.push(&cond_params[0], state.clone());
                    let go = self.eval(cond, env);
                    env.reset(mark);
                    if !go?.as_bool()? {
                        return Ok(state);
                    }
                    env.push(&body_params[0], state);
                    let next = self.eval(body, env);
                    env.reset(mark);
                    state = next?;
                }
            }
            Expr::Lambda { .. } => Err(EvalError::TypeMismatch {
                expected: "loop".into(),
                found: "lambda outside of a loop".into(),
            }),
            Expr::MakeRef(e) => Ok(Value::Cell(Rc::new(RefCell::new(self.eval(e, env)?)))),
            Expr::GetRef(e) => match self.eval(e, env)? {
                Value::Cell(cell) => Ok(cell.borrow().clone()),
                other => Err(EvalError::mismatch("cell", &other)),
            },
            Expr::SetRef(cell, value) => {
                let cell = self.eval(cell, env)?;
                let value = self.eval(value, env)?;
                match cell {
                    Value::Cell(cell) => {
                        *cell.borrow_mut() = value;
                        Ok(Value::Unit)
                    }
                    other => Err(EvalError::mismatch("cell", &other)),
                }
            }
            Expr::Assert { cond, message } => {
                if self.eval(cond, env)?.as_bool()? {
                    Ok(Value::Unit)
                } else {
                    Err(EvalError::AssertionFailed {
                        message: message.clone(),
                    })
                }
            }
            Expr::CallProc { name, args } => {
                let args = self.eval_all(args, env)?;
                self.call(name, args)
            }
            Expr::CallExternal {
                type_name,
                role,
                args,
            } => {
                let procedure = self.externals.resolve(type_name, *role)?;
                let args = self.eval_all(args, env)?;
                self.call(procedure, args)
            }
            Expr::Codec { prim, args } => {
                let args = self.eval_all(args, env)?;
                trace!(prim = prim.as_str(), "codec primitive");
                self.host.call(prim, args)
            }

            Expr::Add(a, b) => {
                let a = self.eval(a, env)?.as_u64()?;
                let b = self.eval(b, env)?.as_u64()?;
                a.checked_add(b)
                    .map(Value::U64)
                    .ok_or(EvalError::Overflow { op: "add" })
            }
            Expr::Eq(a, b) => {
                let a = self.eval(a, env)?;
                let b = self.eval(b, env)?;
                Ok(Value::Bool(a == b))
            }
            Expr::Not(e) => Ok(Value::Bool(!self.eval(e, env)?.as_bool()?)),

            Expr::MakeTup(items) => Ok(Value::Tup(self.eval_all(items, env)?)),
            Expr::MakeVec(items) => Ok(Value::Vec(self.eval_all(items, env)?)),
            Expr::MakeRec(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, e) in fields {
                    out.push((name.clone(), self.eval(e, env)?));
                }
                Ok(Value::Rec(out))
            }
            Expr::GetItem { value, index } => {
                let (item, len) = match self.eval(value, env)? {
                    Value::Tup(items) | Value::Vec(items) => {
                        let len = items.len();
                        (items.into_iter().nth(*index), len)
                    }
                    Value::Rec(fields) => {
                        let len = fields.len();
                        (fields.into_iter().nth(*index).map(|(_, v)| v), len)
                    }
                    other => return Err(EvalError::mismatch("tuple, record or vector", &other)),
                };
                item.ok_or(EvalError::IndexOutOfRange {
                    index: *index as u64,
                    len,
                })
            }
            Expr::GetField { value, name } => match self.eval(value, env)? {
                Value::Rec(fields) => fields
                    .into_iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| EvalError::MissingField { name: name.clone() }),
                other => Err(EvalError::mismatch("record", &other)),
            },
            Expr::Nth { value, index } => {
                let value = self.eval(value, env)?;
                let index = self.eval(index, env)?.as_u64()?;
                let items = value.elements()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or(EvalError::IndexOutOfRange {
                        index,
                        len: items.len(),
                    })
            }
            Expr::Cardinality(e) => {
                let value = self.eval(e, env)?;
                Ok(Value::U64(value.elements()?.len() as u64))
            }
            Expr::EmptyList => Ok(Value::Stack(ConsList::new())),
            Expr::Cons { head, tail } => {
                let head = self.eval(head, env)?;
                match self.eval(tail, env)? {
                    Value::Stack(items) => Ok(Value::Stack(items.push(head))),
                    other => Err(EvalError::mismatch("list stack", &other)),
                }
            }
            Expr::Reverse(e) => match self.eval(e, env)? {
                Value::Stack(items) => Ok(Value::Lst(items.to_vec_in_push_order())),
                Value::Lst(mut items) => {
                    items.reverse();
                    Ok(Value::Lst(items))
                }
                other => Err(EvalError::mismatch("list", &other)),
            },
            Expr::ToSet(e) => match self.eval(e, env)? {
                Value::Lst(items) => Ok(Value::set(items)),
                other => Err(EvalError::mismatch("list", &other)),
            },
            Expr::MakeSum {
                index,
                name,
                payload,
            } => Ok(Value::sum(*index, name.clone(), self.eval(payload, env)?)),
            Expr::SumLabel(e) => match self.eval(e, env)? {
                Value::Sum { index, .. } => Ok(Value::U64(index)),
                other => Err(EvalError::mismatch("sum", &other)),
            },
            Expr::SumPayload(e) => match self.eval(e, env)? {
                Value::Sum { payload, .. } => Ok(*payload),
                other => Err(EvalError::mismatch("sum", &other)),
            },
            Expr::Null => Ok(Value::Null),
            Expr::NotNull(e) => Ok(Value::not_null(self.eval(e, env)?)),
            Expr::IsNull(e) => match self.eval(e, env)? {
                Value::Null => Ok(Value::Bool(true)),
                Value::NotNull(_) => Ok(Value::Bool(false)),
                other => Err(EvalError::mismatch("nullable value", &other)),
            },
            Expr::ForceNotNull(e) => match self.eval(e, env)? {
                Value::NotNull(inner) => Ok(*inner),
                other => Err(EvalError::mismatch("not-null", &other)),
            },
            Expr::Wrap { name, value } => Ok(Value::usr(name.clone(), self.eval(value, env)?)),
            Expr::Unwrap(e) => match self.eval(e, env)? {
                Value::Usr { value, .. } => Ok(*value),
                other => Err(EvalError::mismatch("user value", &other)),
            },

            Expr::MaskConst(action) => Ok(Value::Mask((*action).into())),
            Expr::MaskProject { mask, index } => match self.eval(mask, env)? {
                Value::Mask(mask) => Ok(Value::Mask(mask.project(*index))),
                other => Err(EvalError::mismatch("mask", &other)),
            },
            Expr::MaskIs { mask, action } => match self.eval(mask, env)? {
                Value::Mask(mask) => Ok(Value::Bool(mask.is(*action))),
                other => Err(EvalError::mismatch("mask", &other)),
            },
        }
    }
}

fn lambda(expr: &Expr, arity: usize) -> EvalResult<(&[String], &Expr)> {
    match expr {
        Expr::Lambda { params, body } if params.len() == arity => Ok((params.as_slice(), body.as_ref())),
        _ => Err(EvalError::TypeMismatch {
            expected: format!("lambda of {arity} parameters"),
            found: "other expression".into(),
        }),
    }
}
