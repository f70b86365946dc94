//! Error taxonomy shared by every layer of the mapper.
//!
//! Definition-time failures ([`MapperError::MultipleIdentifierFields`],
//! [`MapperError::InvalidIdentifierType`], [`MapperError::InvalidFieldDefinition`])
//! are returned from [`RecordTypeBuilder::register`](crate::RecordTypeBuilder::register)
//! and never surface once a type is usable. Everything else is a runtime
//! failure raised synchronously to the caller of the offending operation.

/// Errors raised while declaring record types or mapping values.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// A value failed a codec's type check or choice-set membership.
    #[error("field '{field}': expected {expected}, got {actual}")]
    TypeConstraint {
        field: String,
        expected: String,
        actual: String,
    },
    /// A required field was given a null value.
    #[error("field '{field}' is required and cannot be null")]
    RequiredValue { field: String },
    /// The named field is not declared on the record type.
    #[error("kind '{kind}' has no field named '{field}'")]
    UnknownField { kind: String, field: String },
    /// No identifier value could be resolved while deriving a key.
    #[error("kind '{kind}': no value for identifier field '{field}' and no default")]
    MissingIdentifier { kind: String, field: String },
    /// More than one field carries an explicit identifier flag.
    #[error("kind '{kind}': fields '{first}' and '{second}' are both marked as identifier")]
    MultipleIdentifierFields {
        kind: String,
        first: String,
        second: String,
    },
    /// The identifier field is not an Identifier, Integer or Text field.
    #[error("kind '{kind}': field '{field}' of type {codec} cannot be the identifier")]
    InvalidIdentifierType {
        kind: String,
        field: String,
        codec: &'static str,
    },
    /// A field combines options that cannot be used together.
    #[error("kind '{kind}': field '{field}' is invalid: {reason}")]
    InvalidFieldDefinition {
        kind: String,
        field: String,
        reason: &'static str,
    },
    /// The identifier field cannot be removed from an entity.
    #[error("kind '{kind}': identifier field '{field}' cannot be deleted")]
    IdentifierRemoval { kind: String, field: String },
    /// A key is structurally invalid (empty kind, empty name, empty path).
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },
    /// The supplied parent is not a usable key.
    #[error("invalid parent key: {reason}")]
    InvalidParent { reason: String },
    /// A structured value could not be encoded.
    #[error("field '{field}': cannot serialize value: {reason}")]
    Serialization { field: String, reason: String },
    /// Stored bytes could not be decoded back into a structured value.
    #[error("field '{field}': cannot deserialize stored value: {reason}")]
    Deserialization { field: String, reason: String },
    /// Compressing or decompressing a blob failed.
    #[error("field '{field}': compression failed: {reason}")]
    Compression { field: String, reason: String },
}

impl MapperError {
    pub(crate) fn type_constraint(
        field: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeConstraint {
            field: field.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns `true` for errors that can only occur while registering a type.
    #[must_use]
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::MultipleIdentifierFields { .. }
                | Self::InvalidIdentifierType { .. }
                | Self::InvalidFieldDefinition { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type MapperResult<T> = Result<T, MapperError>;
