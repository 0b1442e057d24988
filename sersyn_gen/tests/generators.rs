use sersyn_gen::codec::{Decoder, Encoder, Frame, ListOpening, Loc, SizeCodec};
use sersyn_gen::ir::{Expr, ExtRole};
use sersyn_gen::{
    make_deserializer, make_serializer, make_size_estimator, synthesize, synthesize_schema,
    GenError, GenOptions,
};
use sersyn_types::{BaseKind, Field, MaskAction, SchemaFile, SetSemantics, Shape, ValueType};

/// Format whose primitives are all opaque codec calls named after the
/// operation, so the generated trees can be inspected.
struct Opaque {
    known_size: bool,
}

fn prim(name: &str, args: Vec<Expr>) -> Expr {
    Expr::codec(name, args)
}

impl Decoder for Opaque {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, src: Expr) -> Expr {
        prim(&format!("read_{kind}"), vec![src])
    }
    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("open", vec![src])
    }
    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("sep", vec![src])
    }
    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, src: Expr) -> Expr {
        prim("close", vec![src])
    }
    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, src: Expr) -> Expr {
        prim("read_label", vec![src])
    }
    fn list_open(&self, _element: &ValueType, _at: Loc<'_>, src: Expr) -> ListOpening {
        if self.known_size {
            ListOpening::KnownSize(prim("read_count", vec![src]))
        } else {
            ListOpening::UnknownSize(prim("open_list", vec![src]))
        }
    }
    fn is_end_of_list(&self, _element: &ValueType, _at: Loc<'_>, src: Expr) -> Expr {
        prim("is_end", vec![src])
    }
    fn is_null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("is_null", vec![src])
    }
    fn null(&self, _at: Loc<'_>, src: Expr) -> Expr {
        prim("skip_null", vec![src])
    }
    fn not_null(&self, _ty: &ValueType, _at: Loc<'_>, src: Expr) -> Expr {
        prim("skip_not_null", vec![src])
    }
}

impl Encoder for Opaque {
    fn scalar(&self, kind: BaseKind, _at: Loc<'_>, value: Expr, dst: Expr) -> Expr {
        prim(&format!("write_{kind}"), vec![value, dst])
    }
    fn open(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("open", vec![dst])
    }
    fn sep(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("sep", vec![dst])
    }
    fn close(&self, _frame: Frame<'_>, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("close", vec![dst])
    }
    fn sum_open(&self, _variants: &[Field], _at: Loc<'_>, label: Expr, dst: Expr) -> Expr {
        prim("write_label", vec![label, dst])
    }
    fn list_open(&self, _element: &ValueType, _at: Loc<'_>, count: Expr, dst: Expr) -> Expr {
        prim("write_count", vec![count, dst])
    }
    fn null(&self, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_null", vec![dst])
    }
    fn not_null(&self, _ty: &ValueType, _at: Loc<'_>, dst: Expr) -> Expr {
        prim("write_not_null", vec![dst])
    }
}

impl SizeCodec for Opaque {
    fn scalar_size(&self, kind: BaseKind, _at: Loc<'_>, value: Expr) -> Expr {
        prim(&format!("size_{kind}"), vec![value])
    }
    fn open_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
    fn sep_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
    fn close_size(&self, _frame: Frame<'_>, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
    fn sum_open_size(&self, _variants: &[Field], _at: Loc<'_>, _label: Expr) -> Expr {
        Expr::U64(2)
    }
    fn list_open_size(&self, _element: &ValueType, _at: Loc<'_>, count: Expr) -> Expr {
        prim("size_count", vec![count])
    }
    fn null_size(&self, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
    fn not_null_size(&self, _ty: &ValueType, _at: Loc<'_>) -> Expr {
        Expr::U64(1)
    }
}

const KNOWN: Opaque = Opaque { known_size: true };
const UNKNOWN: Opaque = Opaque { known_size: false };

fn person() -> ValueType {
    ValueType::rec([
        ("name", ValueType::string()),
        ("age", ValueType::u8().to_nullable()),
        ("tags", ValueType::lst(ValueType::string())),
    ])
}

fn has(e: &Expr, pred: impl Fn(&Expr) -> bool) -> bool {
    e.any(&pred)
}

fn count(e: &Expr, pred: impl Fn(&Expr) -> bool) -> usize {
    let mut n = 0;
    e.visit(&mut |node| {
        if pred(node) {
            n += 1
        }
    });
    n
}

fn is_prim(name: &'static str) -> impl Fn(&Expr) -> bool {
    move |e| matches!(e, Expr::Codec { prim, .. } if prim == name)
}

#[test]
fn unmasked_serializer_has_no_mask_checks() {
    let generated = make_serializer(&person(), false, &KNOWN).expect("generate");
    let body = &generated.program.get(&generated.body).expect("body").body;
    assert!(!has(body, |e| matches!(
        e,
        Expr::MaskIs { .. } | Expr::MaskProject { .. } | Expr::MaskConst(_)
    )));
    assert_eq!(generated.entry, "ser_value");
    assert_eq!(generated.body, "ser_value#body");
}

#[test]
fn masked_serializer_checks_each_record_field() {
    let generated = make_serializer(&person(), true, &KNOWN).expect("generate");
    assert_eq!(generated.entry, "ser_masked_value");
    let proc = generated.program.get(&generated.body).expect("body");
    assert_eq!(proc.params, vec!["mask", "v", "dst"]);
    for idx in 0..3 {
        assert!(has(&proc.body, |e| matches!(
            e,
            Expr::MaskIs { mask, action: MaskAction::Skip }
                if matches!(mask.as_ref(), Expr::MaskProject { index, .. } if *index == idx)
        )));
    }
    // The list elements are copied whole: no projection below the field mask.
    assert!(!has(&proc.body, |e| matches!(
        e,
        Expr::MaskProject { mask, .. } if matches!(mask.as_ref(), Expr::MaskProject { .. })
    )));
}

#[test]
fn set_null_on_non_nullable_field_asserts() {
    let generated = make_serializer(&person(), true, &KNOWN).expect("generate");
    let body = &generated.program.get(&generated.body).expect("body").body;
    // `name` and `tags` are not nullable, the root record is not either.
    let asserts = count(body, |e| {
        matches!(e, Expr::Assert { cond, message }
            if **cond == Expr::Bool(false) && message.starts_with("set-null"))
    });
    assert_eq!(asserts, 3);
    assert!(has(body, is_prim("write_null")));
}

#[test]
fn sum_dispatch_is_a_guarded_cascade() {
    let ty = ValueType::sum([
        ("a", ValueType::u8()),
        ("b", ValueType::string()),
        ("c", ValueType::void()),
    ]);
    let generated = make_deserializer(&ty, &KNOWN).expect("generate");
    let body = &generated.program.get(&generated.body).expect("body").body;
    let comparisons = count(body, |e| {
        matches!(e, Expr::If { cond, .. } if matches!(cond.as_ref(), Expr::Eq(_, rhs) if matches!(rhs.as_ref(), Expr::U64(_))))
    });
    assert_eq!(comparisons, 2);
    assert!(has(body, |e| matches!(e, Expr::Assert { message, .. } if message.contains("out of range"))));
    assert_eq!(count(body, |e| matches!(e, Expr::MakeSum { .. })), 3);
}

#[test]
fn this_calls_back_into_the_body_procedure() {
    let tree = ValueType::rec([
        ("value", ValueType::i32()),
        ("children", ValueType::lst(ValueType::this())),
    ]);
    let des = make_deserializer(&tree, &KNOWN).expect("deserializer");
    let body = &des.program.get(&des.body).expect("body").body;
    assert!(has(body, |e| matches!(e, Expr::CallProc { name, .. } if name == "des_value#body")));

    let ser = make_serializer(&tree, true, &KNOWN).expect("serializer");
    let body = &ser.program.get(&ser.body).expect("body").body;
    // Inside the list the mask has degraded, so the self call copies.
    assert!(has(body, |e| matches!(e, Expr::CallProc { name, args }
        if name == "ser_masked_value#body" && args[0] == Expr::MaskConst(MaskAction::Copy))));
}

#[test]
fn external_types_are_recorded_for_linking() {
    let ty = ValueType::tup([ValueType::ext("ip4"), ValueType::lst(ValueType::ext("port"))]);
    let synthesized = synthesize(&ty, &KNOWN, true, &GenOptions::named("endpoint")).expect("generate");
    let program = synthesized.program();
    assert_eq!(
        program.externals.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["ip4", "port"]
    );
    let ser = &program.get("ser_masked_endpoint#body").expect("serializer").body;
    assert!(has(ser, |e| matches!(e, Expr::CallExternal { type_name, role: ExtRole::SerializeMasked, .. } if type_name == "ip4")));
    // List elements are below a degraded mask.
    assert!(has(ser, |e| matches!(e, Expr::CallExternal { type_name, role: ExtRole::Serialize, .. } if type_name == "port")));
    assert!(program.get("sersize_masked_endpoint").is_some());
    assert!(program.get("des_endpoint").is_some());
}

#[test]
fn unsupported_shapes_fail_at_generation() {
    let sampled = ValueType::from(Shape::Set {
        semantics: SetSemantics::Sampling { capacity: 16 },
        element: Box::new(ValueType::u32()),
    });
    let err = make_deserializer(&sampled, &KNOWN).expect_err("sampling set");
    assert!(matches!(err, GenError::UnsupportedShape { .. }));

    let nested = ValueType::rec([("m", ValueType::map(ValueType::string(), ValueType::u64()))]);
    let err = make_serializer(&nested, false, &KNOWN).expect_err("map");
    assert!(matches!(&err, GenError::UnsupportedShape { path, .. } if path == "<root>.0"));
    assert!(make_size_estimator(&nested, true, &KNOWN).is_err());

    let empty = ValueType::sum(Vec::<(String, ValueType)>::new());
    assert_eq!(
        make_deserializer(&empty, &KNOWN).expect_err("empty sum"),
        GenError::EmptySum {
            path: "<root>".into()
        }
    );
}

#[test]
fn list_strategy_follows_the_codec() {
    let ty = ValueType::lst(ValueType::u16());
    let known = make_deserializer(&ty, &KNOWN).expect("known");
    let body = &known.program.get(&known.body).expect("body").body;
    assert!(has(body, |e| matches!(e, Expr::Repeat { .. })));
    assert!(has(body, |e| matches!(e, Expr::Reverse(_))));
    assert!(!has(body, |e| matches!(e, Expr::Loop { .. })));

    let unknown = make_deserializer(&ty, &UNKNOWN).expect("unknown");
    let body = &unknown.program.get(&unknown.body).expect("body").body;
    assert!(has(body, |e| matches!(e, Expr::Loop { .. })));
    assert!(has(body, is_prim("is_end")));
    assert_eq!(count(body, |e| matches!(e, Expr::MakeRef(_))), 2);
    assert!(!has(body, |e| matches!(e, Expr::Repeat { .. })));
}

#[test]
fn sets_are_rebuilt_from_lists() {
    let ty = ValueType::set(ValueType::string());
    let des = make_deserializer(&ty, &KNOWN).expect("generate");
    let body = &des.program.get(&des.body).expect("body").body;
    assert!(has(body, |e| matches!(e, Expr::ToSet(_))));
}

#[test]
fn size_estimator_folds_constant_framing() {
    let ty = ValueType::tup([ValueType::void(), ValueType::void()]);
    let sizes = make_size_estimator(&ty, false, &KNOWN).expect("generate");
    let body = &sizes.program.get(&sizes.body).expect("body").body;
    // open + sep + close
    assert_eq!(*body, Expr::U64(3));
}

#[test]
fn entry_wraps_the_body_procedure() {
    let generated = make_deserializer(&ValueType::bool(), &KNOWN).expect("generate");
    let entry = &generated.program.get(&generated.entry).expect("entry").body;
    assert!(has(entry, |e| matches!(e, Expr::CallProc { name, .. } if *name == generated.body)));
    assert_eq!(generated.program.procedures.len(), 2);
}

#[test]
fn schema_files_generate_one_program() {
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
  - name: tree
    type:
      shape:
        rec:
          - name: label
            type:
              shape:
                base: string
          - name: kids
            type:
              shape:
                lst:
                  shape: this
"#;
    let schema = SchemaFile::from_yaml_str(yaml).expect("parse schema");
    let program = synthesize_schema(&schema, &KNOWN).expect("generate");
    for name in [
        "des_point",
        "ser_masked_point",
        "sersize_masked_point",
        "ser_point",
        "sersize_point",
        "des_tree#body",
        "ser_tree#body",
        "ser_masked_tree#body",
        "sersize_masked_tree#body",
    ] {
        assert!(program.get(name).is_some(), "missing {name}");
    }
    assert_eq!(program.procedures.len(), 20);

    let json = program.to_json().expect("json");
    assert!(json.contains("call-proc"));
}

#[test]
fn type_names_sharing_a_prefix_keep_their_own_procedures() {
    let yaml = r#"
types:
  - name: a
    type:
      shape:
        base: u8
  - name: a_value
    type:
      shape:
        base: string
"#;
    let schema = SchemaFile::from_yaml_str(yaml).expect("parse schema");
    let program = synthesize_schema(&schema, &KNOWN).expect("generate");
    assert_eq!(program.procedures.len(), 12);
    let body = &program.get("ser_a#body").expect("body of a").body;
    assert!(has(body, is_prim("write_u8")));
    let body = &program.get("ser_a_value#body").expect("body of a_value").body;
    assert!(has(body, is_prim("write_string")));
    let entry = &program.get("des_a").expect("entry of a").body;
    assert!(has(entry, |e| matches!(e, Expr::CallProc { name, .. } if name == "des_a#body")));
}

#[test]
fn repeated_type_names_are_rejected() {
    let yaml = r#"
types:
  - name: id
    type:
      shape:
        base: u8
  - name: id
    type:
      shape:
        base: u16
"#;
    let schema = SchemaFile::from_yaml_str(yaml).expect("parse schema");
    assert_eq!(
        synthesize_schema(&schema, &KNOWN).expect_err("duplicate"),
        GenError::DuplicateProcedure {
            name: "des_id#body".into()
        }
    );
}

#[test]
fn type_names_must_be_identifiers() {
    for name in ["", "a#body", "two words"] {
        let err = synthesize(&ValueType::u8(), &KNOWN, false, &GenOptions::named(name))
            .expect_err("invalid name");
        assert_eq!(err, GenError::InvalidName { name: name.into() });
    }
}
