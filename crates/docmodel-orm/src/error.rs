//! Error types for the ORM.

use docmodel_core::StoreError;
use thiserror::Error;

/// A value failed field or schema validation.
///
/// Raised synchronously during construction, `set_field` and `update`; the
/// entity is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or null.
    #[error("Required value for field \"{field}\"")]
    RequiredValue {
        /// Field name.
        field: String,
    },

    /// The field validator rejected the value.
    #[error("Invalid value {value} for field \"{field}\" ({field_type})")]
    InvalidValue {
        /// Offending value, rendered for display.
        value: String,
        /// Field name.
        field: String,
        /// Field type name.
        field_type: &'static str,
    },

    /// The model does not accept extra fields.
    #[error("{model} does not accept extra fields. \"{field}\" is not a valid field")]
    ExtraField {
        /// Model name.
        model: String,
        /// Unknown field name.
        field: String,
    },

    /// The value is not one of the allowed choices.
    #[error("Invalid value {value} for field \"{field}\", expected one of: {}", choices.join(", "))]
    Choice {
        /// Offending value.
        value: String,
        /// Field name.
        field: String,
        /// Allowed choices.
        choices: Vec<String>,
    },

    /// The value is too short or too long.
    #[error("Invalid length for field \"{field}\": {message}")]
    Length {
        /// Field name.
        field: String,
        /// Description of the violated bound.
        message: String,
    },

    /// The value does not normalize to a slug.
    #[error("Value {value} for field \"{field}\" is not a valid slug")]
    SlugFormat {
        /// Offending value.
        value: String,
        /// Field name.
        field: String,
    },

    /// A field validator returned a descriptive failure.
    #[error("{message}")]
    Message {
        /// Field name.
        field: String,
        /// Failure description.
        message: String,
    },

    /// Entities can only be built from key-value objects.
    #[error("Models can only be instantiated with an object")]
    NotAnObject,
}

impl ValidationError {
    /// Returns the field the error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::RequiredValue { field }
            | Self::InvalidValue { field, .. }
            | Self::ExtraField { field, .. }
            | Self::Choice { field, .. }
            | Self::Length { field, .. }
            | Self::SlugFormat { field, .. }
            | Self::Message { field, .. } => Some(field),
            Self::NotAnObject => None,
        }
    }
}

/// A QuerySet builder call was rejected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    /// The filter uses an operator that is not allowed in `$match`.
    #[error("Cannot use {0} expressions in Filter ($match) pipeline stage")]
    ForbiddenOperator(String),

    /// A `$text` filter was attached after other stages.
    #[error("To use $text expressions in Filter ($match) query, $match must be the first pipeline stage")]
    MisplacedTextSearch,

    /// The group specification has no `_id`.
    #[error("Group operation requires an _id field. To match all use null")]
    MissingGroupId,

    /// A group field uses an unknown accumulator.
    #[error("{0} is not a valid group fields accumulator")]
    UnknownAccumulator(String),

    /// A group field is not an accumulator document.
    #[error("Group field \"{0}\" must be an accumulator document")]
    NotAnAccumulator(String),

    /// Limit and skip take non-negative integers.
    #[error("{stage} requires a positive integer, got {value}")]
    NegativeLimit {
        /// Stage name.
        stage: &'static str,
        /// Rejected quantity.
        value: i64,
    },

    /// A lookup specification is missing a key.
    #[error("SelectRelatedOperation ($lookup) needs a query of type {{ from, localField, foreignField, as }}, missing \"{0}\"")]
    MissingLookupField(&'static str),

    /// A `$count` stage needs a non-empty output field name.
    #[error("Count requires a non-empty field name")]
    InvalidCountField,

    /// `select_related` named a field the schema does not declare.
    #[error("\"{field}\" is not defined in validation schema for {model}. Cannot select related objects")]
    UndefinedField {
        /// Model name.
        model: String,
        /// Requested key.
        field: String,
    },

    /// `select_related` named a field that is not a foreign key.
    #[error("\"{0}\" is not a foreign key field")]
    NotAForeignKey(String),
}

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Field or schema validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The model definition is inconsistent.
    #[error("schema definition error: {0}")]
    SchemaDefinition(String),

    /// A QuerySet builder call was rejected.
    #[error("query error: {0}")]
    QueryBuild(#[from] QueryBuildError),

    /// `get` matched nothing.
    #[error("No document matching query!")]
    DoesNotExist,

    /// `get` matched several documents.
    #[error("More than one document matching query!")]
    MultipleObjectsReturned,

    /// An update matched no document or changed nothing.
    #[error("{model} doc _id:{id} was not modified")]
    NotModified {
        /// Model name.
        model: String,
        /// Identity of the entity.
        id: String,
    },

    /// The entity has never been saved.
    #[error("Cannot update document, it does not have an _id (not in db yet). Use save()")]
    NotPersisted,

    /// `bulk_insert` wrote fewer documents than it was given.
    #[error("Some objects were not inserted ({inserted}/{expected})")]
    PartialInsert {
        /// Documents written.
        inserted: u64,
        /// Documents given.
        expected: usize,
    },

    /// An entity of another model was passed.
    #[error("Can only insert instances of {expected}, got {found}")]
    WrongModel {
        /// Model bound to the queryset.
        expected: String,
        /// Model of the offending entity.
        found: String,
    },

    /// Error from the document store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            OrmError::DoesNotExist.to_string(),
            "No document matching query!"
        );
        assert!(OrmError::NotPersisted.to_string().contains("not in db yet"));

        let err = ValidationError::RequiredValue {
            field: "name".into(),
        };
        assert!(err.to_string().contains("\"name\""));
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_validation_converts_into_orm_error() {
        let err: OrmError = ValidationError::NotAnObject.into();
        assert!(matches!(err, OrmError::Validation(ValidationError::NotAnObject)));
    }
}
