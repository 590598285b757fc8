use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Internal representation of a field value as it sits in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// External (API) representation.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(n) => Value::from(*n),
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variants_map_onto_json_scalars() {
        assert_eq!(FieldValue::Null.to_json(), Value::Null);
        assert_eq!(FieldValue::Text("x".into()).to_json(), json!("x"));
        assert_eq!(FieldValue::Integer(7).to_json(), json!(7));
        assert_eq!(FieldValue::Boolean(false).to_json(), json!(false));
    }

    #[test]
    fn msgpack_keeps_the_variant() {
        for value in [FieldValue::Text("7".into()), FieldValue::Integer(7)] {
            let bytes = value.to_msgpack().unwrap();
            assert_eq!(FieldValue::from_msgpack(&bytes).unwrap(), value);
        }
    }
}
