use crate::codec::{Decoder, Encoder, SizeCodec};
use crate::errors::{GenError, GenResult};
use crate::ir::Program;
use crate::materializer::make_deserializer_with;
use crate::serializer::make_serializer_with;
use crate::size_estimator::make_size_estimator_with;
use sersyn_types::{SchemaFile, TypeDef, ValueType};
use tracing::debug;

/// Options shared by the generator entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
    /// Base of the generated procedure names (`des_<name>`, `ser_<name>`, ...).
    pub type_name: String,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            type_name: "value".to_string(),
        }
    }
}

impl GenOptions {
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    /// Entry and body procedure names for `prefix` (`des`, `ser_masked`, ...).
    ///
    /// The body name carries a `#` suffix, which no entry name can contain, so
    /// the procedures of different type names never collide.
    pub fn procedure_names(&self, prefix: &str) -> GenResult<(String, String)> {
        let name = &self.type_name;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GenError::InvalidName { name: name.clone() });
        }
        let entry = format!("{prefix}_{name}");
        let body = format!("{entry}#body");
        Ok((entry, body))
    }
}

/// A generated procedure together with the arena it lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub program: Program,
    /// Procedure wrapping the whole traversal with the codec's start/stop.
    pub entry: String,
    /// Recursive procedure handling one value; `This` calls land here and it
    /// is what external-type linking binds to.
    pub body: String,
}

/// The three procedures derived for one type.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub deserializer: Generated,
    pub serializer: Generated,
    pub size_estimator: Generated,
}

impl Synthesized {
    /// All procedures merged into a single program.
    pub fn program(&self) -> Program {
        let mut program = self.deserializer.program.clone();
        program.extend(self.serializer.program.clone());
        program.extend(self.size_estimator.program.clone());
        program
    }
}

pub fn synthesize<C>(
    ty: &ValueType,
    codec: &C,
    with_mask: bool,
    options: &GenOptions,
) -> GenResult<Synthesized>
where
    C: Decoder + Encoder + SizeCodec + ?Sized,
{
    Ok(Synthesized {
        deserializer: make_deserializer_with(ty, codec, options)?,
        serializer: make_serializer_with(ty, with_mask, codec, options)?,
        size_estimator: make_size_estimator_with(ty, with_mask, codec, options)?,
    })
}

pub fn synthesize_typedef<C>(def: &TypeDef, codec: &C, with_mask: bool) -> GenResult<Synthesized>
where
    C: Decoder + Encoder + SizeCodec + ?Sized,
{
    synthesize(&def.value_type, codec, with_mask, &GenOptions::named(&def.name))
}

/// Generates every type of `schema` into one program: the deserializer, the
/// plain serializer and size estimator, and with `with-mask` their masked
/// variants as well.
pub fn synthesize_schema<C>(schema: &SchemaFile, codec: &C) -> GenResult<Program>
where
    C: Decoder + Encoder + SizeCodec + ?Sized,
{
    let mut program = Program::default();
    for def in &schema.types {
        debug!("synthesizing procedures for {}", def.name);
        program.merge(synthesize_typedef(def, codec, false)?.program())?;
        if schema.options.with_mask {
            let options = GenOptions::named(&def.name);
            let serializer = make_serializer_with(&def.value_type, true, codec, &options)?;
            let estimator = make_size_estimator_with(&def.value_type, true, codec, &options)?;
            program.merge(serializer.program)?;
            program.merge(estimator.program)?;
        }
    }
    Ok(program)
}
