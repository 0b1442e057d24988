//! Location of the current recursion point inside the root type.

use crate::ir::Expr;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Statically known position in a tuple, record or vector.
    CompileTimeIndex(usize),
    /// Loop-carried index in a list or set.
    RuntimeIndex(Expr),
}

#[derive(Debug)]
struct Node {
    step: PathStep,
    parent: Path,
}

/// Persistent chain of steps, most specific step first. Appending shares the
/// parent chain, so every recursive call can extend its own copy cheaply.
#[derive(Debug, Clone, Default)]
pub struct Path(Option<Rc<Node>>);

impl Path {
    pub fn root() -> Self {
        Path(None)
    }

    pub fn append(&self, step: PathStep) -> Path {
        Path(Some(Rc::new(Node {
            step,
            parent: self.clone(),
        })))
    }

    pub fn index(&self, idx: usize) -> Path {
        self.append(PathStep::CompileTimeIndex(idx))
    }

    pub fn runtime(&self, idx: Expr) -> Path {
        self.append(PathStep::RuntimeIndex(idx))
    }

    /// Steps from the most specific to the outermost.
    pub fn steps(&self) -> impl Iterator<Item = &PathStep> {
        let mut cur = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = cur?;
            cur = node.parent.0.as_deref();
            Some(&node.step)
        })
    }

    /// Compile-time indices from the outermost step, or `None` if any step is
    /// only known at run time.
    pub fn static_indices(&self) -> Option<Vec<usize>> {
        let mut out: Vec<usize> = self
            .steps()
            .map(|step| match step {
                PathStep::CompileTimeIndex(idx) => Some(*idx),
                PathStep::RuntimeIndex(_) => None,
            })
            .collect::<Option<_>>()?;
        out.reverse();
        Some(out)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.steps().eq(other.steps())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps: Vec<&PathStep> = self.steps().collect();
        steps.reverse();
        f.write_str("<root>")?;
        for step in steps {
            match step {
                PathStep::CompileTimeIndex(idx) => write!(f, ".{idx}")?,
                PathStep::RuntimeIndex(_) => f.write_str(".*")?,
            }
        }
        Ok(())
    }
}
