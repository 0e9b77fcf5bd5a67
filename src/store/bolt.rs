//! Conversion from JSON row values to bolt parameters.
//!
//! Rows are assembled as `serde_json::Value` maps so the builders stay pure
//! and unit-testable; this module converts them at the driver boundary.

use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::Value;

pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean { value: *b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger { value: i }),
            None => BoltType::Float(BoltFloat {
                value: n.as_f64().unwrap_or(0.0),
            }),
        },
        Value::String(s) => BoltType::String(BoltString { value: s.clone() }),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                list.value.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::default();
            for (key, item) in map {
                bolt_map
                    .value
                    .insert(BoltString { value: key.clone() }, to_bolt(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

/// A list-of-maps parameter from row values.
pub fn rows_param(rows: &[Value]) -> BoltType {
    let mut list = BoltList::default();
    for row in rows {
        list.value.push(to_bolt(row));
    }
    BoltType::List(list)
}

/// A list-of-strings parameter.
pub fn string_list<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> BoltType {
    let mut list = BoltList::default();
    for item in items {
        list.value.push(BoltType::String(BoltString {
            value: item.as_ref().to_string(),
        }));
    }
    BoltType::List(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_scalar_kinds() {
        assert!(matches!(to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(to_bolt(&json!(42)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&json!(1.5)), BoltType::Float(_)));
        assert!(matches!(to_bolt(&json!("s")), BoltType::String(_)));
        assert!(matches!(to_bolt(&json!(null)), BoltType::Null(_)));
    }

    #[test]
    fn converts_nested_rows() {
        let rows = vec![json!({"id": "AB", "location": [3, 7]})];
        let BoltType::List(list) = rows_param(&rows) else {
            panic!("expected a list");
        };
        assert_eq!(list.value.len(), 1);
        let BoltType::Map(map) = &list.value[0] else {
            panic!("expected a map row");
        };
        assert_eq!(map.value.len(), 2);
    }

    #[test]
    fn string_lists_keep_order() {
        let BoltType::List(list) = string_list(["a", "b"]) else {
            panic!("expected a list");
        };
        assert_eq!(list.value.len(), 2);
        assert!(matches!(&list.value[0], BoltType::String(s) if s.value == "a"));
    }
}
