//! Schema validation errors.

use std::fmt;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building a type registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A type name was empty.
    EmptyTypeName,

    /// Two declarations share a type name.
    DuplicateType { type_name: String },

    /// Two fields of one type (inherited fields included) share a name.
    DuplicateField { type_name: String, field: String },

    /// A type has more fields than the compressed field index can address.
    TooManyFields {
        type_name: String,
        count: usize,
        max: usize,
    },

    /// A field or `extends` clause names a type that was never declared.
    UnknownType {
        type_name: String,
        referenced_by: String,
    },

    /// A type inherits from itself, directly or indirectly.
    InheritanceCycle { type_name: String },

    /// More types than a type id can address.
    TooManyTypes { count: usize, max: usize },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTypeName => write!(f, "type name must not be empty"),
            Self::DuplicateType { type_name } => {
                write!(f, "duplicate type '{type_name}'")
            }
            Self::DuplicateField { type_name, field } => {
                write!(f, "duplicate field '{field}' in type '{type_name}'")
            }
            Self::TooManyFields {
                type_name,
                count,
                max,
            } => {
                write!(
                    f,
                    "type '{type_name}' has {count} fields, maximum is {max}"
                )
            }
            Self::UnknownType {
                type_name,
                referenced_by,
            } => {
                write!(f, "unknown type '{type_name}' referenced by {referenced_by}")
            }
            Self::InheritanceCycle { type_name } => {
                write!(f, "inheritance cycle through type '{type_name}'")
            }
            Self::TooManyTypes { count, max } => {
                write!(f, "{count} types declared, maximum is {max}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_too_many_fields() {
        let err = SchemaError::TooManyFields {
            type_name: "Wide".to_owned(),
            count: 65,
            max: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("Wide"));
        assert!(msg.contains("65"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn display_unknown_type() {
        let err = SchemaError::UnknownType {
            type_name: "Ghost".to_owned(),
            referenced_by: "State.ghost".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Ghost"));
        assert!(msg.contains("State.ghost"));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<SchemaError>();
    }
}
