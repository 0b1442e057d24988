/* Values manipulated by generated procedures */

use crate::errors::{EvalError, EvalResult};
use sersyn_types::{IntWidth, MaskValue};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /* Heap values: what (de)serialization produces and consumes */
    Unit,
    Bool(bool),
    Float(f64),
    Char(char),
    String(String),
    Uint {
        width: IntWidth,
        value: u128,
    },
    Int {
        width: IntWidth,
        value: i128,
    },
    Null,
    NotNull(Box<Value>),
    Tup(Vec<Value>),
    Rec(Vec<(String, Value)>),
    Vec(Vec<Value>),
    Lst(Vec<Value>),
    /* Elements in insertion order, without duplicates */
    Set(Vec<Value>),
    Sum {
        index: u64,
        name: String,
        payload: Box<Value>,
    },
    Usr {
        name: String,
        value: Box<Value>,
    },

    /* Run-time only: counters, tuples of results, cells, masks and cursors */
    U64(u64),
    /* List under construction, most recent element first */
    Stack(ConsList),
    Pair(Box<Value>, Box<Value>),
    Cell(Rc<RefCell<Value>>),
    Mask(MaskValue),
    Reader(ReadCursor),
    Writer(WriteCursor),
}

impl Value {
    pub fn u8(value: u8) -> Self {
        Self::uint(IntWidth::W8, value.into())
    }

    pub fn u16(value: u16) -> Self {
        Self::uint(IntWidth::W16, value.into())
    }

    pub fn u32(value: u32) -> Self {
        Self::uint(IntWidth::W32, value.into())
    }

    pub fn u64(value: u64) -> Self {
        Self::uint(IntWidth::W64, value.into())
    }

    pub fn i32(value: i32) -> Self {
        Self::int(IntWidth::W32, value.into())
    }

    pub fn i64(value: i64) -> Self {
        Self::int(IntWidth::W64, value.into())
    }

    pub fn uint(width: IntWidth, value: u128) -> Self {
        Value::Uint { width, value }
    }

    pub fn int(width: IntWidth, value: i128) -> Self {
        Value::Int { width, value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn not_null(value: Value) -> Self {
        Value::NotNull(Box::new(value))
    }

    pub fn tup(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tup(items.into_iter().collect())
    }

    pub fn rec<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Value::Rec(fields.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    pub fn lst(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Lst(items.into_iter().collect())
    }

    /// Builds a set, keeping the first occurrence of duplicated elements.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    pub fn sum(index: u64, name: impl Into<String>, payload: Value) -> Self {
        Value::Sum {
            index,
            name: name.into(),
            payload: Box::new(payload),
        }
    }

    pub fn usr(name: impl Into<String>, value: Value) -> Self {
        Value::Usr {
            name: name.into(),
            value: Box::new(value),
        }
    }

    pub fn pair(first: Value, second: Value) -> Self {
        Value::Pair(Box::new(first), Box::new(second))
    }

    /// Short name of the variant, for error messages.
    pub fn describe(&self) -> String {
        let name = match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Uint { width, .. } => return format!("u{}", width.bits()),
            Value::Int { width, .. } => return format!("i{}", width.bits()),
            Value::Null => "null",
            Value::NotNull(_) => "not-null",
            Value::Tup(_) => "tuple",
            Value::Rec(_) => "record",
            Value::Vec(_) => "vector",
            Value::Lst(_) => "list",
            Value::Set(_) => "set",
            Value::Sum { .. } => "sum",
            Value::Usr { .. } => "user value",
            Value::U64(_) => "counter",
            Value::Stack(_) => "list stack",
            Value::Pair(..) => "pair",
            Value::Cell(_) => "cell",
            Value::Mask(_) => "mask",
            Value::Reader(_) => "reader",
            Value::Writer(_) => "writer",
        };
        name.to_string()
    }

    pub fn as_u64(&self) -> EvalResult<u64> {
        match self {
            Value::U64(n) => Ok(*n),
            other => Err(EvalError::mismatch("counter", other)),
        }
    }

    pub fn as_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::mismatch("bool", other)),
        }
    }

    pub fn into_pair(self) -> EvalResult<(Value, Value)> {
        match self {
            Value::Pair(a, b) => Ok((*a, *b)),
            other => Err(EvalError::mismatch("pair", &other)),
        }
    }

    pub fn into_reader(self) -> EvalResult<ReadCursor> {
        match self {
            Value::Reader(cursor) => Ok(cursor),
            other => Err(EvalError::mismatch("reader", &other)),
        }
    }

    pub fn into_writer(self) -> EvalResult<WriteCursor> {
        match self {
            Value::Writer(cursor) => Ok(cursor),
            other => Err(EvalError::mismatch("writer", &other)),
        }
    }

    /// Elements of a vector, list or set.
    pub fn elements(&self) -> EvalResult<&[Value]> {
        match self {
            Value::Vec(items) | Value::Lst(items) | Value::Set(items) => Ok(items),
            other => Err(EvalError::mismatch("vector, list or set", other)),
        }
    }
}

pub(crate) fn fits_unsigned(width: IntWidth, value: u128) -> bool {
    width.bits() >= 128 || value >> width.bits() == 0
}

pub(crate) fn fits_signed(width: IntWidth, value: i128) -> bool {
    if width.bits() >= 128 {
        return true;
    }
    let half = 1i128 << (width.bits() - 1);
    (-half..half).contains(&value)
}

/// Persistent singly linked list. Pushing shares the existing nodes, so both
/// pushing and cloning are constant time.
#[derive(Clone, Default)]
pub struct ConsList {
    head: Option<Rc<ConsNode>>,
    len: usize,
}

struct ConsNode {
    value: Value,
    next: Option<Rc<ConsNode>>,
}

impl ConsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: Value) -> ConsList {
        ConsList {
            head: Some(Rc::new(ConsNode {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements from the most recently pushed.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        let mut cur = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = cur?;
            cur = node.next.as_deref();
            Some(&node.value)
        })
    }

    /// Elements in the order they were pushed.
    pub fn to_vec_in_push_order(&self) -> Vec<Value> {
        let mut out: Vec<Value> = self.iter().cloned().collect();
        out.reverse();
        out
    }
}

impl Drop for ConsList {
    fn drop(&mut self) {
        // Unlink uniquely owned nodes one by one instead of recursing.
        let mut next = self.head.take();
        while let Some(node) = next {
            match Rc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl PartialEq for ConsList {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl fmt::Debug for ConsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Read position over an immutable input. Advancing yields a new cursor.
#[derive(Clone, PartialEq)]
pub struct ReadCursor {
    bytes: Rc<[u8]>,
    pos: usize,
}

impl ReadCursor {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
            pos: 0,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn rest(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }

    pub fn peek(&self) -> Option<u8> {
        self.rest().first().copied()
    }

    pub fn advance(&self, n: usize) -> EvalResult<ReadCursor> {
        if n > self.rest().len() {
            return Err(self.truncated(n));
        }
        Ok(ReadCursor {
            bytes: self.bytes.clone(),
            pos: self.pos + n,
        })
    }

    /// Next `n` bytes and the cursor after them.
    pub fn take(&self, n: usize) -> EvalResult<(&[u8], ReadCursor)> {
        let next = self.advance(n)?;
        Ok((&self.rest()[..n], next))
    }

    pub fn truncated(&self, needed: usize) -> EvalError {
        EvalError::Truncated {
            offset: self.pos,
            needed,
            available: self.rest().len(),
        }
    }

    pub fn malformed(&self, reason: impl Into<String>) -> EvalError {
        EvalError::Malformed {
            offset: self.pos,
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for ReadCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadCursor({}/{})", self.pos, self.bytes.len())
    }
}

/// Append-only output shared by every copy of the cursor.
#[derive(Clone, Default)]
pub struct WriteCursor {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl WriteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, bytes: &[u8]) -> WriteCursor {
        self.buf.borrow_mut().extend_from_slice(bytes);
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.buf.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf.borrow().clone()
    }
}

impl PartialEq for WriteCursor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.buf, &other.buf)
    }
}

impl fmt::Debug for WriteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteCursor({})", self.len())
    }
}
