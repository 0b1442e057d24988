use crate::errors::EvalResult;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Runtime side of a format backend: executes the codec primitives that the
/// generators embedded in the program.
pub trait Host {
    fn call(&self, prim: &str, args: Vec<Value>) -> EvalResult<Value>;
}

impl<H: Host + ?Sized> Host for &H {
    fn call(&self, prim: &str, args: Vec<Value>) -> EvalResult<Value> {
        (**self).call(prim, args)
    }
}

/// Forwards to another host and records how often each primitive ran.
pub struct CountingHost<'a, H: Host + ?Sized> {
    inner: &'a H,
    counts: RefCell<BTreeMap<String, usize>>,
}

impl<'a, H: Host + ?Sized> CountingHost<'a, H> {
    pub fn new(inner: &'a H) -> Self {
        Self {
            inner,
            counts: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn count(&self, prim: &str) -> usize {
        self.counts.borrow().get(prim).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts.borrow_mut().clear();
    }
}

impl<H: Host + ?Sized> Host for CountingHost<'_, H> {
    fn call(&self, prim: &str, args: Vec<Value>) -> EvalResult<Value> {
        *self.counts.borrow_mut().entry(prim.to_string()).or_default() += 1;
        self.inner.call(prim, args)
    }
}
