#![allow(dead_code)]

use sersyn_eval::{Host, Interpreter, Value};
use sersyn_gen::codec::{Decoder, Encoder, SizeCodec};
use sersyn_gen::{synthesize, GenOptions, Synthesized};
use sersyn_types::{Field, Shape, ValueType};

pub trait Backend: Decoder + Encoder + SizeCodec + Host {}
impl<T: Decoder + Encoder + SizeCodec + Host> Backend for T {}

pub fn generate<C: Backend>(codec: &C, ty: &ValueType, with_mask: bool) -> Synthesized {
    synthesize(ty, codec, with_mask, &GenOptions::default()).expect("generate procedures")
}

/// Serializes `value`, checks the size estimate against the output and reads
/// it back. Returns the encoded bytes.
pub fn round_trip<C: Backend>(codec: &C, ty: &ValueType, value: &Value) -> Vec<u8> {
    let procs = generate(codec, ty, false);
    let interp = Interpreter::with_program(codec, &procs.program());
    let bytes = interp
        .serialize(&procs.serializer, value, None)
        .expect("serialize");
    let size = interp
        .size(&procs.size_estimator, value, None)
        .expect("size estimate");
    assert_eq!(size, bytes.len() as u64, "size estimate of {value:?}");
    let (back, used) = interp
        .deserialize(&procs.deserializer, &bytes)
        .expect("deserialize");
    assert_eq!(&back, value);
    assert_eq!(used, bytes.len());
    bytes
}

pub fn fields(ty: &ValueType) -> &[Field] {
    match &ty.shape {
        Shape::Rec(fields) => fields,
        other => panic!("expected a record, found {other:?}"),
    }
}

/// Record touching every supported shape.
pub fn catalog() -> ValueType {
    ValueType::rec([
        ("id", ValueType::u64()),
        ("name", ValueType::string()),
        ("score", ValueType::float().to_nullable()),
        ("tags", ValueType::lst(ValueType::string())),
        ("flags", ValueType::set(ValueType::u16())),
        ("pos", ValueType::vec(3, ValueType::i32())),
        (
            "shape",
            ValueType::sum([
                ("circle", ValueType::float()),
                ("rect", ValueType::tup([ValueType::u32(), ValueType::u32()])),
                ("none", ValueType::void()),
            ]),
        ),
        ("owner", ValueType::usr("user_id", ValueType::u32())),
        ("initial", ValueType::char()),
        ("ok", ValueType::bool()),
    ])
}

pub fn catalog_value(score: Option<f64>, shape: Value) -> Value {
    Value::rec([
        ("id", Value::u64(42)),
        ("name", Value::string("widget \"deluxe\"")),
        (
            "score",
            score.map_or(Value::Null, |s| Value::not_null(Value::Float(s))),
        ),
        ("tags", Value::lst([Value::string("a"), Value::string("b c")])),
        ("flags", Value::set([Value::u16(3), Value::u16(1)])),
        (
            "pos",
            Value::Vec(vec![Value::i32(-1), Value::i32(0), Value::i32(7)]),
        ),
        ("shape", shape),
        ("owner", Value::usr("user_id", Value::u32(9))),
        ("initial", Value::Char('w')),
        ("ok", Value::Bool(true)),
    ])
}

pub fn rect(w: u32, h: u32) -> Value {
    Value::sum(1, "rect", Value::tup([Value::u32(w), Value::u32(h)]))
}
