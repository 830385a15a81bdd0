use serde_json::{Map as JsonMap, Number, Value as Json};

use super::Value;

/// Converts a value to JSON for REST responses.
///
/// Non-data values (functions, channels, frames) render as their display text.
#[must_use]
pub fn to_json(value: &Value) -> Json {
    match value.unwrapped() {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Byte(i) => Json::from(*i),
        Value::Int32(i) => Json::from(*i),
        Value::Int(i) | Value::Int64(i) => Json::from(*i),
        Value::Float32(f) => Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::Float64(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(a) => Json::Array(a.values().iter().map(to_json).collect()),
        Value::Map(m) => {
            let mut out = JsonMap::new();
            for key in m.keys() {
                let v = m.get(&key).ok().flatten().unwrap_or_default();
                out.insert(key.to_string(), to_json(&v));
            }
            Json::Object(out)
        }
        Value::Struct(s) => {
            let mut out = JsonMap::new();
            for name in s.field_names() {
                out.insert(name.clone(), to_json(&s.get(&name).unwrap_or_default()));
            }
            Json::Object(out)
        }
        other => Json::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::Struct;

    #[test]
    fn test_struct_renders_as_object() {
        let s = Struct::from_fields(IndexMap::from([
            ("name".to_owned(), Value::from("ego")),
            ("tags".to_owned(), Value::list(vec![Value::Int(1), Value::Bool(false)])),
        ]));
        let json = to_json(&Value::Struct(s));
        assert_eq!(json.to_string(), r#"{"name":"ego","tags":[1,false]}"#);
    }
}
