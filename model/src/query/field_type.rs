use serde::{Serialize, Serializer};
use std::fmt;

/// Internal column type vocabulary. Map keys are always strings, so `Map`
/// only carries the value type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Double,
    Long,
    Boolean,
    Date,
    Time,
    Timestamp,
    Binary,
    Array(Box<FieldType>),
    Map(Box<FieldType>),
}

impl FieldType {
    pub fn array_of(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    pub fn map_of(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("STRING"),
            FieldType::Integer => f.write_str("INTEGER"),
            FieldType::Decimal => f.write_str("DECIMAL"),
            FieldType::Double => f.write_str("DOUBLE"),
            FieldType::Long => f.write_str("LONG"),
            FieldType::Boolean => f.write_str("BOOLEAN"),
            FieldType::Date => f.write_str("DATE"),
            FieldType::Time => f.write_str("TIME"),
            FieldType::Timestamp => f.write_str("TIMESTAMP"),
            FieldType::Binary => f.write_str("BINARY"),
            FieldType::Array(element) => write!(f, "ARRAY_{element}"),
            FieldType::Map(value) => write!(f, "MAP_{value}"),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One column of a result schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_types_render_with_prefix() {
        assert_eq!(FieldType::array_of(FieldType::String).to_string(), "ARRAY_STRING");
        assert_eq!(FieldType::map_of(FieldType::Long).to_string(), "MAP_LONG");
        assert_eq!(FieldType::Timestamp.to_string(), "TIMESTAMP");
    }

    #[test]
    fn schema_field_serializes_type_name() {
        let field = SchemaField::new("tags", FieldType::array_of(FieldType::String));
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json, serde_json::json!({"name": "tags", "type": "ARRAY_STRING"}));
    }
}
