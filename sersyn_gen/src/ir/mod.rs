//! Expression IR produced by the generators.
//!
//! Generated procedures are plain expression trees: a small functional core
//! (let, pairs, conditionals, loops, mutable cells) plus constructors and
//! accessors for heap values and field masks. Format-specific work is carried
//! by opaque [`Expr::Codec`] primitives whose names only the format backend and
//! its runtime understand.
//!
//! # Example
//! ```
//! use sersyn_gen::ir::*;
//!
//! let body = Expr::add(Expr::U64(4), Expr::ident("n"));
//! let proc = Procedure::new("sersize_word", vec!["n".into()], body);
//! let mut program = Program::default();
//! program.insert(proc);
//!
//! assert!(program.get("sersize_word").is_some());
//! ```

pub mod builder;

pub use builder::{Block, NameGen};

use crate::errors::{GenError, GenResult};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use sersyn_types::MaskAction;
use std::collections::BTreeSet;

/// Calling convention of a delegated external-type procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtRole {
    /// `(src) -> (value, src)`
    Deserialize,
    /// `(value, dst) -> dst`
    Serialize,
    /// `(mask, value, dst) -> dst`
    SerializeMasked,
    /// `(value) -> size`
    Size,
    /// `(mask, value) -> size`
    SizeMasked,
}

impl ExtRole {
    pub const ALL: [ExtRole; 5] = [
        ExtRole::Deserialize,
        ExtRole::Serialize,
        ExtRole::SerializeMasked,
        ExtRole::Size,
        ExtRole::SizeMasked,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expr {
    Unit,
    Bool(bool),
    /// Counters, labels, indices and sizes.
    U64(u64),
    Ident(String),

    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    LetPair {
        first: String,
        second: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    Pair(Box<Expr>, Box<Expr>),
    First(Box<Expr>),
    Second(Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Evaluates every expression in order, yields the last one.
    Seq(Vec<Expr>),
    /// Bounded loop: folds `body(index, acc)` for `index` in `from..to`.
    Repeat {
        from: Box<Expr>,
        to: Box<Expr>,
        init: Box<Expr>,
        body: Box<Expr>,
    },
    /// Unbounded loop: `state = body(state)` while `cond(state)` holds.
    Loop {
        init: Box<Expr>,
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    MakeRef(Box<Expr>),
    GetRef(Box<Expr>),
    SetRef(Box<Expr>, Box<Expr>),
    Assert {
        cond: Box<Expr>,
        message: String,
    },
    /// Call of a procedure of the same program, by name.
    CallProc {
        name: String,
        args: Vec<Expr>,
    },
    /// Call of a procedure supplied for an external type at link time.
    CallExternal {
        type_name: String,
        role: ExtRole,
        args: Vec<Expr>,
    },
    /// Format backend primitive.
    Codec {
        prim: String,
        args: Vec<Expr>,
    },

    Add(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    MakeTup(Vec<Expr>),
    MakeRec(Vec<(String, Expr)>),
    MakeVec(Vec<Expr>),
    /// Positional access into a tuple, record or vector.
    GetItem {
        value: Box<Expr>,
        index: usize,
    },
    GetField {
        value: Box<Expr>,
        name: String,
    },
    /// Run-time indexed access into a vector, list or set.
    Nth {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Cardinality(Box<Expr>),
    EmptyList,
    Cons {
        head: Box<Expr>,
        tail: Box<Expr>,
    },
    Reverse(Box<Expr>),
    ToSet(Box<Expr>),
    MakeSum {
        index: u64,
        name: String,
        payload: Box<Expr>,
    },
    SumLabel(Box<Expr>),
    SumPayload(Box<Expr>),
    Null,
    NotNull(Box<Expr>),
    IsNull(Box<Expr>),
    ForceNotNull(Box<Expr>),
    Wrap {
        name: String,
        value: Box<Expr>,
    },
    Unwrap(Box<Expr>),

    MaskConst(MaskAction),
    MaskProject {
        mask: Box<Expr>,
        index: usize,
    },
    MaskIs {
        mask: Box<Expr>,
        action: MaskAction,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn pair(first: Expr, second: Expr) -> Self {
        Expr::Pair(Box::new(first), Box::new(second))
    }

    pub fn if_(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::Add(Box::new(left), Box::new(right))
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Expr::Eq(Box::new(left), Box::new(right))
    }

    pub fn not(value: Expr) -> Self {
        Expr::Not(Box::new(value))
    }

    pub fn lambda<S: Into<String>>(params: impl IntoIterator<Item = S>, body: Expr) -> Self {
        Expr::Lambda {
            params: params.into_iter().map(Into::into).collect(),
            body: Box::new(body),
        }
    }

    pub fn repeat(from: Expr, to: Expr, init: Expr, body: Expr) -> Self {
        Expr::Repeat {
            from: Box::new(from),
            to: Box::new(to),
            init: Box::new(init),
            body: Box::new(body),
        }
    }

    pub fn while_(init: Expr, cond: Expr, body: Expr) -> Self {
        Expr::Loop {
            init: Box::new(init),
            cond: Box::new(cond),
            body: Box::new(body),
        }
    }

    pub fn make_ref(value: Expr) -> Self {
        Expr::MakeRef(Box::new(value))
    }

    pub fn get_ref(cell: Expr) -> Self {
        Expr::GetRef(Box::new(cell))
    }

    pub fn set_ref(cell: Expr, value: Expr) -> Self {
        Expr::SetRef(Box::new(cell), Box::new(value))
    }

    pub fn assert(cond: Expr, message: impl Into<String>) -> Self {
        Expr::Assert {
            cond: Box::new(cond),
            message: message.into(),
        }
    }

    pub fn codec(prim: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Codec {
            prim: prim.into(),
            args,
        }
    }

    pub fn get_item(value: Expr, index: usize) -> Self {
        Expr::GetItem {
            value: Box::new(value),
            index,
        }
    }

    pub fn get_field(value: Expr, name: impl Into<String>) -> Self {
        Expr::GetField {
            value: Box::new(value),
            name: name.into(),
        }
    }

    pub fn nth(value: Expr, index: Expr) -> Self {
        Expr::Nth {
            value: Box::new(value),
            index: Box::new(index),
        }
    }

    pub fn cons(head: Expr, tail: Expr) -> Self {
        Expr::Cons {
            head: Box::new(head),
            tail: Box::new(tail),
        }
    }

    pub fn mask_is(mask: Expr, action: MaskAction) -> Self {
        Expr::MaskIs {
            mask: Box::new(mask),
            action,
        }
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }

    /// True if any node of the tree satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= pred(e));
        found
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unit
            | Expr::Bool(_)
            | Expr::U64(_)
            | Expr::Ident(_)
            | Expr::EmptyList
            | Expr::Null
            | Expr::MaskConst(_) => {}
            Expr::Let { value, body, .. } | Expr::LetPair { value, body, .. } => {
                value.visit(f);
                body.visit(f);
            }
            Expr::Pair(a, b) | Expr::Add(a, b) | Expr::Eq(a, b) | Expr::SetRef(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::First(e)
            | Expr::Second(e)
            | Expr::Not(e)
            | Expr::MakeRef(e)
            | Expr::GetRef(e)
            | Expr::Cardinality(e)
            | Expr::Reverse(e)
            | Expr::ToSet(e)
            | Expr::SumLabel(e)
            | Expr::SumPayload(e)
            | Expr::NotNull(e)
            | Expr::IsNull(e)
            | Expr::ForceNotNull(e)
            | Expr::Unwrap(e) => e.visit(f),
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
            Expr::Seq(items) | Expr::MakeTup(items) | Expr::MakeVec(items) => {
                items.iter().for_each(|e| e.visit(f));
            }
            Expr::CallProc { args, .. }
            | Expr::CallExternal { args, .. }
            | Expr::Codec { args, .. } => args.iter().for_each(|e| e.visit(f)),
            Expr::MakeRec(fields) => fields.iter().for_each(|(_, e)| e.visit(f)),
            Expr::Repeat {
                from,
                to,
                init,
                body,
            } => {
                from.visit(f);
                to.visit(f);
                init.visit(f);
                body.visit(f);
            }
            Expr::Loop { init, cond, body } => {
                init.visit(f);
                cond.visit(f);
                body.visit(f);
            }
            Expr::Lambda { body, .. } => body.visit(f),
            Expr::Assert { cond, .. } => cond.visit(f),
            Expr::GetItem { value, .. }
            | Expr::GetField { value, .. }
            | Expr::MakeSum { payload: value, .. }
            | Expr::Wrap { value, .. } => value.visit(f),
            Expr::Nth { value, index } => {
                value.visit(f);
                index.visit(f);
            }
            Expr::Cons { head, tail } => {
                head.visit(f);
                tail.visit(f);
            }
            Expr::MaskProject { mask, .. } | Expr::MaskIs { mask, .. } => mask.visit(f),
        }
    }
}

/// A named procedure of a [`Program`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

impl Procedure {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Expr) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }
}

/// Arena of procedures addressed by name. Self-recursive types call back into
/// the arena by name instead of unrolling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub procedures: IndexMap<String, Procedure>,
    /// External types referenced by any procedure, to be resolved at link time.
    #[serde(default)]
    pub externals: BTreeSet<String>,
}

impl Program {
    /// Adds `procedure`, replacing any previous procedure of the same name.
    pub fn insert(&mut self, procedure: Procedure) {
        for ext in external_refs(&procedure.body) {
            self.externals.insert(ext);
        }
        self.procedures.insert(procedure.name.clone(), procedure);
    }

    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    /// Moves every procedure of `other` into this program.
    pub fn extend(&mut self, other: Program) {
        self.externals.extend(other.externals);
        self.procedures.extend(other.procedures);
    }

    /// Like [`Program::extend`], but refuses to replace an existing procedure.
    /// Nothing is moved when a name is already taken.
    pub fn merge(&mut self, other: Program) -> GenResult<()> {
        if let Some(name) = other.procedures.keys().find(|n| self.procedures.contains_key(*n)) {
            return Err(GenError::DuplicateProcedure { name: name.clone() });
        }
        self.extend(other);
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn external_refs(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    expr.visit(&mut |e| {
        if let Expr::CallExternal { type_name, .. } = e {
            names.insert(type_name.clone());
        }
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_records_external_references() {
        let body = Expr::CallExternal {
            type_name: "ip4".into(),
            role: ExtRole::Deserialize,
            args: vec![Expr::ident("src")],
        };
        let mut program = Program::default();
        program.insert(Procedure::new("des_host", vec!["src".into()], body));
        assert_eq!(program.externals.iter().collect::<Vec<_>>(), vec!["ip4"]);
    }

    #[test]
    fn program_exports_as_json() {
        let mut program = Program::default();
        program.insert(Procedure::new(
            "sersize_flag",
            vec!["v".into()],
            Expr::if_(
                Expr::IsNull(Box::new(Expr::ident("v"))),
                Expr::U64(1),
                Expr::U64(2),
            ),
        ));
        let json = program.to_json().expect("serialize program");
        let back: Program = serde_json::from_str(&json).expect("deserialize program");
        assert_eq!(back, program);
    }

    #[test]
    fn merge_refuses_to_replace_a_procedure() {
        let mut program = Program::default();
        program.insert(Procedure::new("des_a", vec!["src".into()], Expr::Unit));
        let mut other = Program::default();
        other.insert(Procedure::new("des_b", vec!["src".into()], Expr::Unit));
        other.insert(Procedure::new("des_a", vec!["src".into()], Expr::Null));

        assert_eq!(
            program.clone().merge(other.clone()),
            Err(GenError::DuplicateProcedure { name: "des_a".into() })
        );
        other.procedures.shift_remove("des_a");
        program.merge(other).expect("disjoint names");
        assert_eq!(program.get("des_a").map(|p| &p.body), Some(&Expr::Unit));
        assert!(program.get("des_b").is_some());
    }

    #[test]
    fn size_counts_every_node() {
        let e = Expr::add(Expr::U64(1), Expr::add(Expr::U64(2), Expr::ident("x")));
        assert_eq!(e.size(), 5);
        assert!(e.any(&|n| matches!(n, Expr::Ident(x) if x == "x")));
    }
}
