//! Pieces shared by the three generators.

use crate::errors::GenError;
use crate::ir::Expr;
use crate::path::Path;
use sersyn_types::ValueType;

pub(crate) fn unsupported(ty: &ValueType, path: &Path, reason: &'static str) -> GenError {
    GenError::UnsupportedShape {
        value_type: ty.to_string(),
        path: path.to_string(),
        reason,
    }
}

pub(crate) fn empty_sum(path: &Path) -> GenError {
    GenError::EmptySum {
        path: path.to_string(),
    }
}

/// Linear dispatch on a sum label: compares against `0..n-1` in order, and
/// takes the last branch unconditionally behind an assertion that the label is
/// `n-1`.
pub(crate) fn cascade(label: &Expr, branches: Vec<Expr>) -> Expr {
    let n = branches.len() as u64;
    let mut rev = branches.into_iter().rev();
    let Some(last) = rev.next() else {
        return Expr::assert(Expr::Bool(false), "sum has no variants");
    };
    let fallback = Expr::Seq(vec![
        Expr::assert(
            Expr::equals(label.clone(), Expr::U64(n - 1)),
            format!("sum label out of range (expected below {n})"),
        ),
        last,
    ]);
    rev.enumerate().fold(fallback, |otherwise, (k, branch)| {
        let idx = n - 2 - k as u64;
        Expr::if_(
            Expr::equals(label.clone(), Expr::U64(idx)),
            branch,
            otherwise,
        )
    })
}

/// `sep` unless `is_first` holds. Formats without separators cost nothing.
pub(crate) fn sep_unless_first(is_first: Expr, sep: Expr, cursor: Expr) -> Expr {
    if sep == cursor {
        cursor
    } else {
        Expr::if_(is_first, cursor, sep)
    }
}

/// Loop-index test for the first iteration.
pub(crate) fn is_zero(idx: Expr) -> Expr {
    Expr::equals(idx, Expr::U64(0))
}

/// Sum of `terms` in evaluation order, with constants folded together.
pub(crate) fn sum_sizes(terms: impl IntoIterator<Item = Expr>) -> Expr {
    let mut constant = 0u64;
    let mut dynamic: Vec<Expr> = Vec::new();
    for term in terms {
        match term {
            Expr::U64(n) => constant += n,
            other => dynamic.push(other),
        }
    }
    let mut iter = dynamic.into_iter();
    let Some(first) = iter.next() else {
        return Expr::U64(constant);
    };
    let total = iter.fold(first, Expr::add);
    if constant == 0 {
        total
    } else {
        Expr::add(total, Expr::U64(constant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_compares_all_but_last_label() {
        let label = Expr::ident("label");
        let e = cascade(&label, vec![Expr::U64(10), Expr::U64(11), Expr::U64(12)]);
        let Expr::If {
            cond, otherwise, ..
        } = e
        else {
            panic!("expected if");
        };
        assert_eq!(*cond, Expr::equals(label.clone(), Expr::U64(0)));
        let Expr::If {
            cond, otherwise, ..
        } = *otherwise
        else {
            panic!("expected nested if");
        };
        assert_eq!(*cond, Expr::equals(label.clone(), Expr::U64(1)));
        let Expr::Seq(items) = *otherwise else {
            panic!("expected guarded fallback");
        };
        assert!(matches!(&items[0], Expr::Assert { cond, .. }
            if **cond == Expr::equals(label.clone(), Expr::U64(2))));
        assert_eq!(items[1], Expr::U64(12));
    }

    #[test]
    fn single_variant_is_only_guarded() {
        let e = cascade(&Expr::ident("l"), vec![Expr::Unit]);
        assert!(matches!(e, Expr::Seq(ref items) if items.len() == 2));
    }

    #[test]
    fn sizes_fold_constants() {
        assert_eq!(sum_sizes([Expr::U64(1), Expr::U64(2)]), Expr::U64(3));
        assert_eq!(
            sum_sizes([Expr::U64(1), Expr::ident("x"), Expr::U64(0)]),
            Expr::add(Expr::ident("x"), Expr::U64(1))
        );
        assert_eq!(sum_sizes([Expr::ident("x")]), Expr::ident("x"));
    }
}
