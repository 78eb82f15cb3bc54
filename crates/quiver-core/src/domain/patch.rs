use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// A three-valued optional field used in update payloads and delta
/// overrides.
///
/// Distinguishes three caller intents that a plain `Option` conflates:
/// leave the field as it is, explicitly clear it, or set it to a value.
/// On the wire an absent field means [`FieldPatch::Keep`], `null` means
/// [`FieldPatch::Clear`] and any other value means [`FieldPatch::Set`].
/// Struct fields must be annotated with
/// `#[serde(default, skip_serializing_if = "FieldPatch::is_keep")]` for the
/// absent case to round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldPatch<T> {
    /// Field is not part of the patch; keep the stored value.
    #[default]
    Keep,
    /// Explicitly clear the stored value.
    Clear,
    /// Set the stored value.
    Set(T),
}

impl<T> FieldPatch<T> {
    /// True when the field is not part of the patch.
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldPatch::Keep)
    }

    /// Resolve against the currently stored value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            FieldPatch::Keep => current,
            FieldPatch::Clear => None,
            FieldPatch::Set(v) => Some(v),
        }
    }

    /// Borrowing view of the set value, if any.
    pub fn as_ref(&self) -> FieldPatch<&T> {
        match self {
            FieldPatch::Keep => FieldPatch::Keep,
            FieldPatch::Clear => FieldPatch::Clear,
            FieldPatch::Set(v) => FieldPatch::Set(v),
        }
    }

    /// Build from the storage representation: a nullable value plus an
    /// "is set" flag column.
    pub fn from_columns(is_set: bool, value: Option<T>) -> Self {
        match (is_set, value) {
            (false, _) => FieldPatch::Keep,
            (true, None) => FieldPatch::Clear,
            (true, Some(v)) => FieldPatch::Set(v),
        }
    }

    /// Decompose into the storage representation.
    pub fn into_columns(self) -> (bool, Option<T>) {
        match self {
            FieldPatch::Keep => (false, None),
            FieldPatch::Clear => (true, None),
            FieldPatch::Set(v) => (true, Some(v)),
        }
    }
}

impl<T: Serialize> Serialize for FieldPatch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Keep is normally skipped by the containing struct; if it is
            // serialized anyway it degrades to null.
            FieldPatch::Keep | FieldPatch::Clear => serializer.serialize_none(),
            FieldPatch::Set(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldPatch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => FieldPatch::Clear,
            Some(v) => FieldPatch::Set(v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Demo {
        #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
        name: FieldPatch<String>,
        #[serde(default, skip_serializing_if = "FieldPatch::is_keep")]
        count: FieldPatch<i64>,
    }

    #[test]
    fn test_absent_is_keep() {
        let demo: Demo = serde_json::from_str("{}").unwrap();
        assert_eq!(demo.name, FieldPatch::Keep);
        assert_eq!(demo.count, FieldPatch::Keep);
    }

    #[test]
    fn test_null_is_clear() {
        let demo: Demo = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(demo.name, FieldPatch::Clear);
        assert_eq!(demo.count, FieldPatch::Keep);
    }

    #[test]
    fn test_value_is_set() {
        let demo: Demo = serde_json::from_str(r#"{"name": "x", "count": 3}"#).unwrap();
        assert_eq!(demo.name, FieldPatch::Set("x".to_string()));
        assert_eq!(demo.count, FieldPatch::Set(3));
    }

    #[test]
    fn test_keep_is_skipped_on_serialize() {
        let demo = Demo {
            name: FieldPatch::Keep,
            count: FieldPatch::Clear,
        };
        let json = serde_json::to_string(&demo).unwrap();
        assert_eq!(json, r#"{"count":null}"#);
    }

    #[test]
    fn test_apply() {
        assert_eq!(FieldPatch::Keep.apply(Some(1)), Some(1));
        assert_eq!(FieldPatch::<i32>::Clear.apply(Some(1)), None);
        assert_eq!(FieldPatch::Set(2).apply(Some(1)), Some(2));
    }

    #[test]
    fn test_column_round_trip() {
        for patch in [
            FieldPatch::Keep,
            FieldPatch::Clear,
            FieldPatch::Set("v".to_string()),
        ] {
            let (is_set, value) = patch.clone().into_columns();
            assert_eq!(FieldPatch::from_columns(is_set, value), patch);
        }
    }
}
