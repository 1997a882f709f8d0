//! Scalar field values carried by events.

use alloc::collections::BTreeMap;
use alloc::string::String;

/// Fields of a single event category, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A category-specific scalar value.
///
/// With the `serde` feature the value serializes as the bare JSON scalar,
/// so `{"remaining": 80}` and `{"lat": 33.7}` read naturally on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum FieldValue {
    /// Value not yet known.
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Null,

    #[cfg_attr(feature = "minicbor", n(1))]
    Bool(#[cfg_attr(feature = "minicbor", n(0))] bool),

    #[cfg_attr(feature = "minicbor", n(2))]
    Int(#[cfg_attr(feature = "minicbor", n(0))] i64),

    #[cfg_attr(feature = "minicbor", n(3))]
    Float(#[cfg_attr(feature = "minicbor", n(0))] f64),

    #[cfg_attr(feature = "minicbor", n(4))]
    Text(#[cfg_attr(feature = "minicbor", n(0))] String),
}

impl FieldValue {
    /// Numeric view of the value. Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view of the value. Floats are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.into())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Builder for a [`Fields`] map.
#[derive(Debug, Default)]
pub struct FieldsBuilder {
    fields: Fields,
}

impl FieldsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier value with the same name.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build the field map.
    pub fn build(self) -> Fields {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(FieldValue::from(80).as_i64(), Some(80));
        assert_eq!(FieldValue::from(80).as_f64(), Some(80.0));
        assert_eq!(FieldValue::from(1.5).as_f64(), Some(1.5));
        assert_eq!(FieldValue::from(1.5).as_i64(), None);
    }

    #[test]
    fn option_maps_to_null() {
        let none: Option<f64> = None;
        assert!(FieldValue::from(none).is_null());
        assert_eq!(FieldValue::from(Some(true)).as_bool(), Some(true));
    }

    #[test]
    fn fields_builder_last_write_wins() {
        let fields = FieldsBuilder::new()
            .field("mode", "STABILIZE")
            .field("mode", "GUIDED")
            .build();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["mode"].as_str(), Some("GUIDED"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_bare_scalars() {
        let fields = FieldsBuilder::new()
            .field("remaining", 80)
            .field("voltage", 12.1)
            .field("armed", true)
            .field("mode", "GUIDED")
            .field("fix", FieldValue::Null)
            .build();

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(
            json,
            r#"{"armed":true,"fix":null,"mode":"GUIDED","remaining":80,"voltage":12.1}"#
        );

        let parsed: Fields = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["remaining"], FieldValue::Int(80));
        assert_eq!(parsed["voltage"], FieldValue::Float(12.1));
        assert!(parsed["fix"].is_null());
    }
}
