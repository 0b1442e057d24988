use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bit widths available to integer scalars.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum IntWidth {
    W8,
    W16,
    W24,
    W32,
    W40,
    W48,
    W56,
    W64,
    W128,
}

impl IntWidth {
    pub const ALL: [IntWidth; 9] = [
        IntWidth::W8,
        IntWidth::W16,
        IntWidth::W24,
        IntWidth::W32,
        IntWidth::W40,
        IntWidth::W48,
        IntWidth::W56,
        IntWidth::W64,
        IntWidth::W128,
    ];

    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W24 => 24,
            IntWidth::W32 => 32,
            IntWidth::W40 => 40,
            IntWidth::W48 => 48,
            IntWidth::W56 => 56,
            IntWidth::W64 => 64,
            IntWidth::W128 => 128,
        }
    }

    pub fn bytes(self) -> u64 {
        u64::from(self.bits() / 8)
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.bits() == bits)
    }
}

/// Scalar leaf kinds. Integers are carried as (signedness, width) data so that
/// backends can drive their primitives from a table instead of one match arm
/// per width.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BaseKind {
    Float,
    Bool,
    Char,
    String,
    Int { signed: bool, width: IntWidth },
}

impl BaseKind {
    /// Every scalar kind, in a stable order.
    pub const ALL: [BaseKind; 22] = {
        const fn u(width: IntWidth) -> BaseKind {
            BaseKind::Int {
                signed: false,
                width,
            }
        }
        const fn i(width: IntWidth) -> BaseKind {
            BaseKind::Int {
                signed: true,
                width,
            }
        }
        [
            BaseKind::Float,
            BaseKind::Bool,
            BaseKind::Char,
            BaseKind::String,
            u(IntWidth::W8),
            u(IntWidth::W16),
            u(IntWidth::W24),
            u(IntWidth::W32),
            u(IntWidth::W40),
            u(IntWidth::W48),
            u(IntWidth::W56),
            u(IntWidth::W64),
            u(IntWidth::W128),
            i(IntWidth::W8),
            i(IntWidth::W16),
            i(IntWidth::W24),
            i(IntWidth::W32),
            i(IntWidth::W40),
            i(IntWidth::W48),
            i(IntWidth::W56),
            i(IntWidth::W64),
            i(IntWidth::W128),
        ]
    };

    pub const fn unsigned(width: IntWidth) -> Self {
        BaseKind::Int {
            signed: false,
            width,
        }
    }

    pub const fn signed(width: IntWidth) -> Self {
        BaseKind::Int {
            signed: true,
            width,
        }
    }

    /// Name used in schemas and in codec primitive names (`u32`, `string`, ...).
    pub fn name(&self) -> String {
        match self {
            BaseKind::Float => "float".to_string(),
            BaseKind::Bool => "bool".to_string(),
            BaseKind::Char => "char".to_string(),
            BaseKind::String => "string".to_string(),
            BaseKind::Int { signed, width } => {
                format!("{}{}", if *signed { 'i' } else { 'u' }, width.bits())
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown scalar kind '{0}'")]
pub struct ParseKindError(pub String);

impl FromStr for BaseKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" => return Ok(BaseKind::Float),
            "bool" => return Ok(BaseKind::Bool),
            "char" => return Ok(BaseKind::Char),
            "string" => return Ok(BaseKind::String),
            _ => {}
        }
        let signed = match s.as_bytes().first() {
            Some(b'u') => false,
            Some(b'i') => true,
            _ => return Err(ParseKindError(s.to_string())),
        };
        s[1..]
            .parse::<u32>()
            .ok()
            .and_then(IntWidth::from_bits)
            .map(|width| BaseKind::Int { signed, width })
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

impl TryFrom<String> for BaseKind {
    type Error = ParseKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BaseKind> for String {
    fn from(kind: BaseKind) -> Self {
        kind.name()
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Heap representation chosen for a set.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SetSemantics {
    #[default]
    Simple,
    Sampling {
        capacity: u32,
    },
    HashTable {
        initial_size: u32,
    },
    Heap,
}

/// Named member of a record or variant of a sum.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Void,
    Base(BaseKind),
    /// The type currently being defined.
    This,
    Ext(String),
    Usr {
        name: String,
        underlying: Box<ValueType>,
    },
    Vec {
        dim: u32,
        element: Box<ValueType>,
    },
    Lst(Box<ValueType>),
    Set {
        #[serde(default)]
        semantics: SetSemantics,
        element: Box<ValueType>,
    },
    Tup(Vec<ValueType>),
    Rec(Vec<Field>),
    Sum(Vec<Field>),
    Map {
        key: Box<ValueType>,
        value: Box<ValueType>,
    },
}

/// A shape together with its nullability.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ValueType {
    pub shape: Shape,
    #[serde(default)]
    pub nullable: bool,
}

impl From<Shape> for ValueType {
    fn from(shape: Shape) -> Self {
        Self {
            shape,
            nullable: false,
        }
    }
}

impl ValueType {
    pub fn to_nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub fn base(kind: BaseKind) -> Self {
        Shape::Base(kind).into()
    }

    pub fn void() -> Self {
        Shape::Void.into()
    }

    pub fn this() -> Self {
        Shape::This.into()
    }

    pub fn float() -> Self {
        Self::base(BaseKind::Float)
    }

    pub fn bool() -> Self {
        Self::base(BaseKind::Bool)
    }

    pub fn char() -> Self {
        Self::base(BaseKind::Char)
    }

    pub fn string() -> Self {
        Self::base(BaseKind::String)
    }

    pub fn u8() -> Self {
        Self::base(BaseKind::unsigned(IntWidth::W8))
    }

    pub fn u16() -> Self {
        Self::base(BaseKind::unsigned(IntWidth::W16))
    }

    pub fn u32() -> Self {
        Self::base(BaseKind::unsigned(IntWidth::W32))
    }

    pub fn u64() -> Self {
        Self::base(BaseKind::unsigned(IntWidth::W64))
    }

    pub fn i32() -> Self {
        Self::base(BaseKind::signed(IntWidth::W32))
    }

    pub fn i64() -> Self {
        Self::base(BaseKind::signed(IntWidth::W64))
    }

    pub fn ext(name: impl Into<String>) -> Self {
        Shape::Ext(name.into()).into()
    }

    pub fn usr(name: impl Into<String>, underlying: ValueType) -> Self {
        Shape::Usr {
            name: name.into(),
            underlying: Box::new(underlying),
        }
        .into()
    }

    pub fn vec(dim: u32, element: ValueType) -> Self {
        Shape::Vec {
            dim,
            element: Box::new(element),
        }
        .into()
    }

    pub fn lst(element: ValueType) -> Self {
        Shape::Lst(Box::new(element)).into()
    }

    pub fn set(element: ValueType) -> Self {
        Shape::Set {
            semantics: SetSemantics::Simple,
            element: Box::new(element),
        }
        .into()
    }

    pub fn tup(elements: impl IntoIterator<Item = ValueType>) -> Self {
        Shape::Tup(elements.into_iter().collect()).into()
    }

    pub fn rec<N: Into<String>>(fields: impl IntoIterator<Item = (N, ValueType)>) -> Self {
        Shape::Rec(named(fields)).into()
    }

    pub fn sum<N: Into<String>>(variants: impl IntoIterator<Item = (N, ValueType)>) -> Self {
        Shape::Sum(named(variants)).into()
    }

    pub fn map(key: ValueType, value: ValueType) -> Self {
        Shape::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
        .into()
    }
}

fn named<N: Into<String>>(items: impl IntoIterator<Item = (N, ValueType)>) -> Vec<Field> {
    items
        .into_iter()
        .map(|(name, value_type)| Field {
            name: name.into(),
            value_type,
        })
        .collect()
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[Field], sep: &str) -> fmt::Result {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{} {}", field.name, field.value_type)?;
    }
    Ok(())
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Void => f.write_str("void")?,
            Shape::Base(kind) => write!(f, "{kind}")?,
            Shape::This => f.write_str("this")?,
            Shape::Ext(name) => write!(f, "${name}")?,
            Shape::Usr { name, .. } => f.write_str(name)?,
            Shape::Vec { dim, element } => write!(f, "{element}[{dim}]")?,
            Shape::Lst(element) => write!(f, "{element}[]")?,
            Shape::Set { element, .. } => write!(f, "{element}{{}}")?,
            Shape::Tup(elements) => {
                f.write_str("(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(")")?;
            }
            Shape::Rec(fields) => {
                f.write_str("{")?;
                write_fields(f, fields, "; ")?;
                f.write_str("}")?;
            }
            Shape::Sum(variants) => {
                f.write_str("[")?;
                write_fields(f, variants, " | ")?;
                f.write_str("]")?;
            }
            Shape::Map { key, value } => write!(f, "{value}[{key}]")?,
        }
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_name() {
        assert_eq!(BaseKind::ALL.len(), 22);
        for kind in BaseKind::ALL {
            let parsed: BaseKind = kind.name().parse().expect("parse kind");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn rejects_unknown_widths() {
        assert!("u12".parse::<BaseKind>().is_err());
        assert!("x32".parse::<BaseKind>().is_err());
        assert_eq!(
            "i24".parse::<BaseKind>(),
            Ok(BaseKind::signed(IntWidth::W24))
        );
    }

    #[test]
    fn display_is_compact() {
        let ty = ValueType::rec([
            ("a", ValueType::u32()),
            ("b", ValueType::lst(ValueType::string()).to_nullable()),
        ])
        .to_nullable();
        assert_eq!(ty.to_string(), "{a u32; b string[]?}?");
    }
}
