mod common;

use assert_matches::assert_matches;
use common::{catalog, catalog_value, fields, generate, rect, round_trip, Backend};
use sersyn_eval::codecs::{RowBinary, SExpr};
use sersyn_eval::{apply_mask, EvalError, Interpreter, Value, WriteCursor};
use sersyn_gen::{make_deserializer, synthesize_schema, ExtRole, GenError, Program};
use sersyn_types::{MaskValue, SchemaFile, ValueType};

fn shapes() -> Vec<Value> {
    vec![
        Value::sum(0, "circle", Value::Float(1.5)),
        rect(3, 4),
        Value::sum(2, "none", Value::Unit),
    ]
}

#[test]
fn catalog_round_trips_in_both_formats() {
    let ty = catalog();
    for score in [Some(0.25), None] {
        for shape in shapes() {
            let value = catalog_value(score, shape);
            round_trip(&RowBinary, &ty, &value);
            round_trip(&SExpr, &ty, &value);
        }
    }
}

fn masked_bytes<C: Backend>(codec: &C, ty: &ValueType, value: &Value, mask: &MaskValue) -> Vec<u8> {
    let procs = generate(codec, ty, true);
    let interp = Interpreter::with_program(codec, &procs.program());
    interp
        .serialize(&procs.serializer, value, Some(mask))
        .expect("masked serialize")
}

fn plain_bytes<C: Backend>(codec: &C, ty: &ValueType, value: &Value) -> Vec<u8> {
    let procs = generate(codec, ty, false);
    let interp = Interpreter::with_program(codec, &procs.program());
    interp
        .serialize(&procs.serializer, value, None)
        .expect("serialize")
}

#[test]
fn copy_masks_match_the_unmasked_output() {
    let ty = catalog();
    let value = catalog_value(Some(2.0), rect(1, 2));
    let all_copy = MaskValue::Recurse(vec![MaskValue::Copy; fields(&ty).len()]);
    for mask in [MaskValue::Copy, all_copy] {
        assert_eq!(
            masked_bytes(&RowBinary, &ty, &value, &mask),
            plain_bytes(&RowBinary, &ty, &value)
        );
        assert_eq!(
            masked_bytes(&SExpr, &ty, &value, &mask),
            plain_bytes(&SExpr, &ty, &value)
        );
    }
}

fn check_masked<C: Backend>(codec: &C, ty: &ValueType, value: &Value, mask: &MaskValue) {
    ty.check_mask(mask).expect("valid mask");
    let procs = generate(codec, ty, true);
    let masked_ty = ty.masked(mask).expect("root kept");
    let reader = make_deserializer(&masked_ty, codec).expect("masked deserializer");
    let mut interp = Interpreter::with_program(codec, &procs.program());
    interp.load(&reader.program);

    let bytes = interp
        .serialize(&procs.serializer, value, Some(mask))
        .expect("serialize");
    let size = interp
        .size(&procs.size_estimator, value, Some(mask))
        .expect("size");
    assert_eq!(size, bytes.len() as u64);
    let (back, used) = interp.deserialize(&reader, &bytes).expect("deserialize");
    assert_eq!(used, bytes.len());
    assert_eq!(Some(back), apply_mask(value, mask));
}

#[test]
fn masked_output_reads_back_as_the_masked_type() {
    let ty = catalog();
    let mask = MaskValue::fields(
        fields(&ty),
        [
            ("name", MaskValue::Skip),
            ("score", MaskValue::SetNull),
            ("shape", MaskValue::Skip),
        ],
    );
    for shape in shapes() {
        let value = catalog_value(Some(9.5), shape);
        check_masked(&RowBinary, &ty, &value, &mask);
        check_masked(&SExpr, &ty, &value, &mask);
    }

    let nested = ValueType::tup([
        ValueType::u8(),
        ValueType::rec([("x", ValueType::string()), ("y", ValueType::bool())]).to_nullable(),
    ]);
    let value = Value::tup([
        Value::u8(1),
        Value::not_null(Value::rec([("x", Value::string("s")), ("y", Value::Bool(false))])),
    ]);
    let mask = MaskValue::Recurse(vec![
        MaskValue::Copy,
        MaskValue::Recurse(vec![MaskValue::Copy, MaskValue::Skip]),
    ]);
    check_masked(&RowBinary, &nested, &value, &mask);
    check_masked(&SExpr, &nested, &value, &mask);
}

#[test]
fn list_strategies_agree() {
    let ty = ValueType::lst(ValueType::tup([
        ValueType::u8(),
        ValueType::lst(ValueType::string()),
    ]));
    let item = |n: u8, words: &[&str]| {
        Value::tup([
            Value::u8(n),
            Value::lst(words.iter().map(|w| Value::string(*w))),
        ])
    };
    let values = [
        Value::Lst(Vec::new()),
        Value::lst([item(1, &[])]),
        Value::lst([item(1, &["a"]), item(2, &[]), item(3, &["b", "c"])]),
    ];
    for value in &values {
        round_trip(&RowBinary, &ty, value);
        round_trip(&SExpr, &ty, value);
    }
    assert_eq!(round_trip(&RowBinary, &ty, &values[0]), [0]);
    assert_eq!(round_trip(&SExpr, &ty, &values[0]), b"()");
    assert_eq!(
        round_trip(&SExpr, &ty, &values[2]),
        br#"((1 ("a")) (2 ()) (3 ("b" "c")))"#
    );
}

fn endpoint() -> ValueType {
    ValueType::rec([("host", ValueType::ext("ip4")), ("port", ValueType::u16())])
}

fn endpoint_value() -> Value {
    let octets = [10, 0, 0, 1].map(Value::u8);
    Value::rec([("host", Value::Vec(octets.to_vec())), ("port", Value::u16(8080))])
}

#[test]
fn externals_resolve_through_linked_procedures() {
    let ty = endpoint();
    let procs = generate(&RowBinary, &ty, true);
    let mut interp = Interpreter::with_program(&RowBinary, &procs.program());
    interp
        .link_type("ip4", &ValueType::vec(4, ValueType::u8()), &RowBinary)
        .expect("link ip4");
    interp.verify_links().expect("all externals bound");

    let value = endpoint_value();
    let copy = MaskValue::Copy;
    let bytes = interp
        .serialize(&procs.serializer, &value, Some(&copy))
        .expect("serialize");
    assert_eq!(bytes, [10, 0, 0, 1, 0x90, 0x1f]);
    let (back, _) = interp
        .deserialize(&procs.deserializer, &bytes)
        .expect("deserialize");
    assert_eq!(back, value);

    let no_port = MaskValue::Recurse(vec![MaskValue::Copy, MaskValue::Skip]);
    let bytes = interp
        .serialize(&procs.serializer, &value, Some(&no_port))
        .expect("serialize masked");
    assert_eq!(bytes, [10, 0, 0, 1]);
    let size = interp
        .size(&procs.size_estimator, &value, Some(&no_port))
        .expect("size");
    assert_eq!(size, 4);
}

#[test]
fn nullable_externals_keep_their_own_null() {
    let ty = ValueType::rec([("v", ValueType::ext("opt").to_nullable())]);
    let procs = generate(&SExpr, &ty, false);
    let mut interp = Interpreter::with_program(&SExpr, &procs.program());
    interp
        .link_type("opt", &ValueType::u8().to_nullable(), &SExpr)
        .expect("link opt");

    let cases: [(Value, &[u8]); 3] = [
        (Value::Null, b"(null)"),
        (Value::not_null(Value::Null), b"(some null)"),
        (Value::not_null(Value::not_null(Value::u8(7))), b"(some 7)"),
    ];
    for (field, text) in cases {
        let value = Value::rec([("v", field)]);
        let bytes = interp
            .serialize(&procs.serializer, &value, None)
            .expect("serialize");
        assert_eq!(bytes, text);
        let size = interp
            .size(&procs.size_estimator, &value, None)
            .expect("size");
        assert_eq!(size, bytes.len() as u64);
        let (back, _) = interp
            .deserialize(&procs.deserializer, &bytes)
            .expect("deserialize");
        assert_eq!(back, value);
    }
}

#[test]
fn linking_never_replaces_loaded_procedures() {
    let ty = endpoint();
    let procs = generate(&RowBinary, &ty, false);
    let mut interp = Interpreter::with_program(&RowBinary, &procs.program());
    assert_matches!(
        interp.link_type("value", &ValueType::string(), &RowBinary),
        Err(GenError::DuplicateProcedure { ref name }) if name.starts_with("des_value")
    );
    interp
        .link_type("ip4", &ValueType::vec(4, ValueType::u8()), &RowBinary)
        .expect("link ip4");
    assert_matches!(
        interp.link_type("ip4", &ValueType::u32(), &RowBinary),
        Err(GenError::DuplicateProcedure { .. })
    );

    let value = endpoint_value();
    let bytes = interp
        .serialize(&procs.serializer, &value, None)
        .expect("serialize");
    assert_eq!(bytes, [10, 0, 0, 1, 0x90, 0x1f]);
    let (back, _) = interp
        .deserialize(&procs.deserializer, &bytes)
        .expect("deserialize");
    assert_eq!(back, value);
}

#[test]
fn unbound_externals_are_reported() {
    let procs = generate(&RowBinary, &endpoint(), false);
    let interp = Interpreter::with_program(&RowBinary, &procs.program());
    assert_matches!(
        interp.verify_links(),
        Err(EvalError::MissingExternalType { ref type_name, .. }) if type_name == "ip4"
    );
    assert_matches!(
        interp.serialize(&procs.serializer, &endpoint_value(), None),
        Err(EvalError::MissingExternalType { role: ExtRole::Serialize, .. })
    );
}

fn tree() -> ValueType {
    ValueType::rec([
        ("label", ValueType::string()),
        ("kids", ValueType::lst(ValueType::this())),
    ])
}

fn node(label: &str, kids: Vec<Value>) -> Value {
    Value::rec([("label", Value::string(label)), ("kids", Value::lst(kids))])
}

#[test]
fn recursive_types_call_back_into_the_body() {
    let ty = tree();
    let value = node(
        "root",
        vec![node("a", vec![]), node("b", vec![node("c", vec![])])],
    );
    round_trip(&RowBinary, &ty, &value);
    let text = round_trip(&SExpr, &ty, &value);
    assert_eq!(text, br#"("root" (("a" ()) ("b" (("c" ())))))"#);

    let all_copy = MaskValue::Recurse(vec![MaskValue::Copy, MaskValue::Copy]);
    assert_eq!(
        masked_bytes(&RowBinary, &ty, &value, &all_copy),
        plain_bytes(&RowBinary, &ty, &value)
    );
    check_masked(&SExpr, &ty, &value, &all_copy);
}

#[test]
fn exported_programs_run_after_reloading() {
    let ty = catalog();
    let value = catalog_value(None, rect(5, 6));
    let procs = generate(&RowBinary, &ty, false);
    let json = procs.program().to_json().expect("export");
    let reloaded: Program = serde_json::from_str(&json).expect("reload");
    assert_eq!(reloaded, procs.program());

    let interp = Interpreter::with_program(&RowBinary, &reloaded);
    let bytes = interp
        .serialize(&procs.serializer, &value, None)
        .expect("serialize");
    assert_eq!(bytes, plain_bytes(&RowBinary, &ty, &value));
}

#[test]
fn schema_programs_are_callable_by_name() {
    let yaml = r#"
options:
  with-mask: true
types:
  - name: point
    type:
      shape:
        tup:
          - shape:
              base: i32
          - shape:
              base: i32
"#;
    let schema = SchemaFile::from_yaml_str(yaml).expect("parse schema");
    let program = synthesize_schema(&schema, &RowBinary).expect("generate");
    let interp = Interpreter::with_program(&RowBinary, &program);

    let point = Value::tup([Value::i32(-2), Value::i32(3)]);
    let written = interp
        .call(
            "ser_masked_point",
            vec![
                Value::Mask(MaskValue::Copy),
                point.clone(),
                Value::Writer(WriteCursor::new()),
            ],
        )
        .expect("serialize")
        .into_writer()
        .expect("writer");
    let bytes = written.bytes();
    assert_eq!(bytes, [0xfe, 0xff, 0xff, 0xff, 3, 0, 0, 0]);

    let (back, _) = interp
        .call(
            "des_point",
            vec![Value::Reader(sersyn_eval::ReadCursor::new(&bytes))],
        )
        .expect("deserialize")
        .into_pair()
        .expect("pair");
    assert_eq!(back, point);

    assert_matches!(
        interp.call("des_point", vec![]),
        Err(EvalError::ArityMismatch { expected: 1, found: 0, .. })
    );
}
