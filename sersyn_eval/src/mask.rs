use crate::value::Value;
use sersyn_types::MaskValue;

/// What a masked serializer writes for `value`, as a heap value: skipped
/// fields are dropped, set-null fields become null. `None` when the whole
/// value is skipped.
///
/// Reading the masked output back with a deserializer for
/// [`ValueType::masked`](sersyn_types::ValueType::masked) yields this value.
pub fn apply_mask(value: &Value, mask: &MaskValue) -> Option<Value> {
    match mask {
        MaskValue::Skip => None,
        MaskValue::SetNull => Some(Value::Null),
        MaskValue::Copy => Some(value.clone()),
        MaskValue::Recurse(_) => Some(match value {
            Value::NotNull(inner) => Value::not_null(apply_mask(inner, mask)?),
            Value::Usr { name, value } => Value::usr(name.clone(), apply_mask(value, mask)?),
            Value::Tup(items) => Value::Tup(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| apply_mask(item, &mask.project(i)))
                    .collect(),
            ),
            Value::Rec(fields) => Value::Rec(
                fields
                    .iter()
                    .enumerate()
                    .filter_map(|(i, (name, item))| {
                        apply_mask(item, &mask.project(i)).map(|v| (name.clone(), v))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_and_set_null_apply_per_field() {
        let value = Value::not_null(Value::rec([
            ("a", Value::u32(5)),
            ("b", Value::string("hi")),
            ("c", Value::not_null(Value::Bool(true))),
        ]));
        let mask = MaskValue::Recurse(vec![MaskValue::Skip, MaskValue::Copy, MaskValue::SetNull]);
        assert_eq!(
            apply_mask(&value, &mask),
            Some(Value::not_null(Value::rec([
                ("b", Value::string("hi")),
                ("c", Value::Null),
            ])))
        );
        assert_eq!(apply_mask(&value, &MaskValue::Skip), None);
    }

    #[test]
    fn leaves_below_containers_are_copied() {
        let value = Value::lst([Value::tup([Value::u8(1), Value::u8(2)])]);
        let mask = MaskValue::Recurse(vec![MaskValue::Skip]);
        assert_eq!(apply_mask(&value, &mask), Some(value));
    }
}
