//! Key coercion at the source-row boundary.
//!
//! Source key columns can surface as JSON numbers or as numeric strings,
//! depending on how the driver renders bigints. Both are accepted here; a
//! non-numeric string is a deserialization failure at the boundary, so a
//! corrupted key can never travel further down the pipeline.

use serde::{Deserialize, Deserializer, de};

/// A key that deserializes from either a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawKey {
    Number(i64),
    Text(String),
}

impl RawKey {
    fn into_i64<E: de::Error>(self) -> Result<i64, E> {
        match self {
            RawKey::Number(value) => Ok(value),
            RawKey::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| de::Error::custom(format!("invalid numeric key: {text:?}"))),
        }
    }
}

/// Deserializes a required key field.
pub(crate) fn key<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    RawKey::deserialize(deserializer)?.into_i64()
}

/// Deserializes an optional key field, treating `null` as absent.
pub(crate) fn optional_key<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawKey>::deserialize(deserializer)?
        .map(RawKey::into_i64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "key")]
        id: i64,
        #[serde(default, deserialize_with = "optional_key")]
        parent_id: Option<i64>,
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let holder: Holder =
            serde_json::from_str(r#"{"id": 42, "parent_id": "17"}"#).unwrap();
        assert_eq!(holder.id, 42);
        assert_eq!(holder.parent_id, Some(17));
    }

    #[test]
    fn null_and_missing_optional_keys_are_absent() {
        let holder: Holder = serde_json::from_str(r#"{"id": "42", "parent_id": null}"#).unwrap();
        assert_eq!(holder.parent_id, None);

        let holder: Holder = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(holder.parent_id, None);
    }

    #[test]
    fn non_numeric_key_is_a_typed_failure() {
        let result: Result<Holder, _> = serde_json::from_str(r#"{"id": "abc"}"#);
        assert!(result.is_err());
    }
}
