use model::query::FieldType;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TypeMappingError {
    #[error("The first parameter of MAP must be STRING, got '{0}'")]
    MapKeyNotString(String),
    #[error("Type '{0}' is missing a type argument")]
    MissingArgument(String),
}

/// Maps an engine type name plus the raw names of its type arguments onto
/// the internal column vocabulary. Unknown names become `Binary`.
pub fn map_type<'a, I>(raw_type: &str, mut arguments: I) -> Result<FieldType, TypeMappingError>
where
    I: Iterator<Item = &'a str>,
{
    let field_type = match raw_type {
        "bigint" => FieldType::Long,
        "boolean" => FieldType::Boolean,
        "date" => FieldType::Date,
        "double" => FieldType::Double,
        "varbinary" | "HyperLogLog" => FieldType::Binary,
        "varchar" => FieldType::String,
        "integer" => FieldType::Integer,
        "decimal" => FieldType::Decimal,
        "time" | "time with time zone" => FieldType::Time,
        "timestamp" | "timestamp with time zone" => FieldType::Timestamp,
        "array" => {
            let element = next_argument(raw_type, &mut arguments)?;
            FieldType::array_of(map_type(element, std::iter::empty())?)
        }
        "map" => {
            let key = next_argument(raw_type, &mut arguments)?;
            if key != "varchar" {
                return Err(TypeMappingError::MapKeyNotString(key.to_owned()));
            }
            let value = next_argument(raw_type, &mut arguments)?;
            FieldType::map_of(map_type(value, std::iter::empty())?)
        }
        _ => FieldType::Binary,
    };
    Ok(field_type)
}

fn next_argument<'a>(
    raw_type: &str,
    arguments: &mut impl Iterator<Item = &'a str>,
) -> Result<&'a str, TypeMappingError> {
    arguments
        .next()
        .ok_or_else(|| TypeMappingError::MissingArgument(raw_type.to_owned()))
}
