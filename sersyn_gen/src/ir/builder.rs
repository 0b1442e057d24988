use super::Expr;

/// Hands out unique variable names within one generated procedure.
#[derive(Debug, Default)]
pub struct NameGen {
    next: u32,
}

impl NameGen {
    pub fn fresh(&mut self, hint: &str) -> String {
        let idx = self.next;
        self.next += 1;
        format!("{hint}_{idx}")
    }
}

enum Binding {
    Let {
        name: String,
        value: Expr,
    },
    Pair {
        first: String,
        second: String,
        value: Expr,
    },
    Effect(Expr),
}

/// Straight-line sequence of bindings, folded into nested `Let`s once the
/// tail expression is known.
///
/// ```
/// use sersyn_gen::ir::{Block, Expr, NameGen};
///
/// let mut names = NameGen::default();
/// let mut block = Block::new();
/// let n = block.bind(&mut names, "n", Expr::U64(2));
/// let e = block.finish(Expr::add(n.clone(), n));
/// assert!(matches!(e, Expr::Let { .. }));
/// ```
#[derive(Default)]
pub struct Block {
    bindings: Vec<Binding>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to a fresh variable and returns a reference to it.
    /// Variables are returned as-is without introducing a new binding.
    pub fn bind(&mut self, names: &mut NameGen, hint: &str, value: Expr) -> Expr {
        if let Expr::Ident(_) = value {
            return value;
        }
        let name = names.fresh(hint);
        self.bindings.push(Binding::Let {
            name: name.clone(),
            value,
        });
        Expr::Ident(name)
    }

    /// Destructures a pair-valued expression into two fresh variables.
    pub fn bind_pair(
        &mut self,
        names: &mut NameGen,
        first_hint: &str,
        second_hint: &str,
        value: Expr,
    ) -> (Expr, Expr) {
        let first = names.fresh(first_hint);
        let second = names.fresh(second_hint);
        self.bindings.push(Binding::Pair {
            first: first.clone(),
            second: second.clone(),
            value,
        });
        (Expr::Ident(first), Expr::Ident(second))
    }

    /// Evaluates `expr` for its side effect only.
    pub fn effect(&mut self, expr: Expr) {
        self.bindings.push(Binding::Effect(expr));
    }

    pub fn finish(self, tail: Expr) -> Expr {
        self.bindings
            .into_iter()
            .rev()
            .fold(tail, |body, binding| match binding {
                Binding::Let { name, value } => Expr::Let {
                    name,
                    value: Box::new(value),
                    body: Box::new(body),
                },
                Binding::Pair {
                    first,
                    second,
                    value,
                } => Expr::LetPair {
                    first,
                    second,
                    value: Box::new(value),
                    body: Box::new(body),
                },
                Binding::Effect(effect) => match body {
                    Expr::Seq(mut rest) => {
                        rest.insert(0, effect);
                        Expr::Seq(rest)
                    }
                    other => Expr::Seq(vec![effect, other]),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_nest_in_order() {
        let mut names = NameGen::default();
        let mut block = Block::new();
        let a = block.bind(&mut names, "a", Expr::U64(1));
        let (x, y) = block.bind_pair(&mut names, "x", "y", Expr::pair(a.clone(), Expr::Unit));
        block.effect(Expr::Unit);
        let e = block.finish(Expr::pair(x, y));

        let Expr::Let { name, body, .. } = e else {
            panic!("expected let");
        };
        assert_eq!(name, "a_0");
        let Expr::LetPair {
            first,
            second,
            body,
            ..
        } = *body
        else {
            panic!("expected let-pair");
        };
        assert_eq!((first.as_str(), second.as_str()), ("x_1", "y_2"));
        assert!(matches!(*body, Expr::Seq(ref items) if items.len() == 2));
    }

    #[test]
    fn binding_a_variable_is_free() {
        let mut names = NameGen::default();
        let mut block = Block::new();
        let v = block.bind(&mut names, "v", Expr::ident("src"));
        assert_eq!(v, Expr::ident("src"));
        assert_eq!(block.finish(Expr::Unit), Expr::Unit);
    }
}
