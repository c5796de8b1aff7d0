use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A linked record reference as the upstream delivers it. Depending on the
/// query path the same field arrives as `[id, "name"]`, as
/// `{"id": .., "name": ..}`, or as `false` when the link is unset. All shape
/// tolerance lives here; business code only ever sees `Option<LinkedRecord>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkedRecord {
    pub id: i64,
    pub name: String,
}

impl LinkedRecord {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// Parse one raw field value into an optional link.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let id = items.first().and_then(Value::as_i64)?;
                let name = items.get(1).and_then(Value::as_str).unwrap_or_default();
                Some(Self::new(id, name))
            }
            Value::Object(map) => {
                let id = map.get("id").and_then(Value::as_i64)?;
                let name = map.get("name").and_then(Value::as_str).unwrap_or_default();
                Some(Self::new(id, name))
            }
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for LinkedRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| DeError::custom("expected [id, name], {id, name}, or a record link"))
    }
}

/// Deserializer for `Option<LinkedRecord>` fields, where the upstream uses
/// `false` (or `null`) to mean "no link".
pub fn linked_record_opt<'de, D>(deserializer: D) -> Result<Option<LinkedRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Bool(false) | Value::Null => Ok(None),
        other => Ok(LinkedRecord::from_value(&other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LinkedRecord;

    #[test]
    fn array_shape_is_accepted() {
        let parsed = LinkedRecord::from_value(&json!([5, "Annual Leave"]));
        assert_eq!(parsed, Some(LinkedRecord::new(5, "Annual Leave")));
    }

    #[test]
    fn object_shape_is_accepted() {
        let parsed = LinkedRecord::from_value(&json!({"id": 9, "name": "Sick Leave"}));
        assert_eq!(parsed, Some(LinkedRecord::new(9, "Sick Leave")));
    }

    #[test]
    fn unset_link_shapes_yield_none() {
        assert_eq!(LinkedRecord::from_value(&json!(false)), None);
        assert_eq!(LinkedRecord::from_value(&json!(null)), None);
        assert_eq!(LinkedRecord::from_value(&json!("Annual Leave")), None);
    }

    #[test]
    fn array_without_name_keeps_the_id() {
        let parsed = LinkedRecord::from_value(&json!([12]));
        assert_eq!(parsed, Some(LinkedRecord::new(12, "")));
    }
}
