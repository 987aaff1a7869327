//! Aggregation pipeline stages.
//!
//! Each [`Operation`] is validated when it is built and renders to its
//! stage document with [`Operation::definition`].

use docmodel_core::Document;
use serde_json::Value as Json;

use crate::error::QueryBuildError;
use crate::model::Model;

/// Operators rejected anywhere inside a filter.
const FORBIDDEN_OPERATORS: [&str; 3] = ["$where", "$near", "$nearSphere"];

/// Accumulators accepted in group fields.
pub const ACCUMULATORS: [&str; 12] = [
    "$accumulator",
    "$addToSet",
    "$avg",
    "$first",
    "$last",
    "$max",
    "$mergeObjects",
    "$min",
    "$push",
    "$stdDevPop",
    "$stdDevSamp",
    "$sum",
];

fn forbidden_operator(value: &Json) -> Option<&str> {
    match value {
        Json::Object(map) => map.iter().find_map(|(key, inner)| {
            if FORBIDDEN_OPERATORS.contains(&key.as_str()) {
                Some(key.as_str())
            } else {
                forbidden_operator(inner)
            }
        }),
        Json::Array(items) => items.iter().find_map(forbidden_operator),
        _ => None,
    }
}

/// A `$match` stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    query: Document,
}

impl Filter {
    /// Builds a filter attached at `position` in the pipeline.
    ///
    /// A `$text` search is only accepted as the first stage. Passing `None`
    /// skips the position check.
    ///
    /// # Errors
    ///
    /// - [`QueryBuildError::ForbiddenOperator`] for `$where`, `$near` or
    ///   `$nearSphere` at any depth.
    /// - [`QueryBuildError::MisplacedTextSearch`] for a `$text` search that
    ///   is not the first stage.
    pub fn new(query: Document, position: Option<usize>) -> Result<Self, QueryBuildError> {
        for (key, value) in &query {
            if FORBIDDEN_OPERATORS.contains(&key.as_str()) {
                return Err(QueryBuildError::ForbiddenOperator(key.clone()));
            }
            if let Some(op) = forbidden_operator(value) {
                return Err(QueryBuildError::ForbiddenOperator(op.to_string()));
            }
        }

        if query.contains_key("$text") && position.is_some_and(|p| p > 0) {
            return Err(QueryBuildError::MisplacedTextSearch);
        }

        Ok(Self { query })
    }

    /// Builds a filter without checks, for queries assembled by the ORM.
    pub(crate) fn trusted(query: Document) -> Self {
        Self { query }
    }

    /// Returns the filter query.
    pub fn query(&self) -> &Document {
        &self.query
    }
}

/// A `$lookup` stage joining another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Joined collection.
    pub from: String,
    /// Key in the current documents.
    pub local_field: String,
    /// Key in the joined documents.
    pub foreign_field: String,
    /// Output array field.
    pub as_field: String,
}

impl Lookup {
    /// Creates a lookup.
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        }
    }

    /// Creates a lookup joining the collection of `model`.
    pub fn build(
        model: &Model,
        as_field: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self::new(model.collection_name(), local_field, foreign_field, as_field)
    }

    /// Reads a lookup from its `{ from, localField, foreignField, as }`
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::MissingLookupField`] naming the first
    /// missing key.
    pub fn from_document(spec: &Document) -> Result<Self, QueryBuildError> {
        let key = |name: &'static str| {
            spec.get(name)
                .and_then(Json::as_str)
                .filter(|value| !value.is_empty())
                .ok_or(QueryBuildError::MissingLookupField(name))
        };
        Ok(Self::new(
            key("from")?,
            key("localField")?,
            key("foreignField")?,
            key("as")?,
        ))
    }

    fn definition(&self) -> Document {
        let mut spec = Document::new();
        spec.insert("from".into(), Json::from(self.from.as_str()));
        spec.insert("localField".into(), Json::from(self.local_field.as_str()));
        spec.insert("foreignField".into(), Json::from(self.foreign_field.as_str()));
        spec.insert("as".into(), Json::from(self.as_field.as_str()));
        spec
    }
}

/// A `$group` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    spec: Document,
}

impl Group {
    /// Validates a group specification.
    ///
    /// # Errors
    ///
    /// - [`QueryBuildError::MissingGroupId`] without an `_id` key.
    /// - [`QueryBuildError::NotAnAccumulator`] for a field that is not an
    ///   accumulator document.
    /// - [`QueryBuildError::UnknownAccumulator`] for an accumulator outside
    ///   [`ACCUMULATORS`].
    pub fn new(spec: Document) -> Result<Self, QueryBuildError> {
        if !spec.contains_key("_id") {
            return Err(QueryBuildError::MissingGroupId);
        }

        for (field, accumulator) in spec.iter().filter(|(key, _)| *key != "_id") {
            let Json::Object(accumulator) = accumulator else {
                return Err(QueryBuildError::NotAnAccumulator(field.clone()));
            };
            if let Some(unknown) = accumulator
                .keys()
                .find(|key| !ACCUMULATORS.contains(&key.as_str()))
            {
                return Err(QueryBuildError::UnknownAccumulator(unknown.clone()));
            }
        }

        Ok(Self { spec })
    }

    /// Returns the group specification.
    pub fn spec(&self) -> &Document {
        &self.spec
    }
}

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A stage document used as is.
    Raw(Document),
    /// `$match`.
    Filter(Filter),
    /// `$lookup`.
    Lookup(Lookup),
    /// `$limit`.
    Limit(u64),
    /// `$skip`.
    Skip(u64),
    /// `$project`.
    Project(Document),
    /// `$addFields`.
    Annotate(Document),
    /// `$group`.
    Group(Group),
    /// `$sort`.
    Sort(Document),
    /// `$count` into the named field.
    Count(String),
}

impl Operation {
    /// Creates a filter stage. See [`Filter::new`].
    ///
    /// # Errors
    ///
    /// Returns the [`QueryBuildError`] of [`Filter::new`].
    pub fn filter(query: Document, position: Option<usize>) -> Result<Self, QueryBuildError> {
        Filter::new(query, position).map(Self::Filter)
    }

    /// Creates a group stage. See [`Group::new`].
    ///
    /// # Errors
    ///
    /// Returns the [`QueryBuildError`] of [`Group::new`].
    pub fn group(spec: Document) -> Result<Self, QueryBuildError> {
        Group::new(spec).map(Self::Group)
    }

    /// Creates a limit stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::NegativeLimit`] for a negative quantity.
    pub fn limit(n: i64) -> Result<Self, QueryBuildError> {
        u64::try_from(n)
            .map(Self::Limit)
            .map_err(|_| QueryBuildError::NegativeLimit {
                stage: "Limit",
                value: n,
            })
    }

    /// Creates a skip stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::NegativeLimit`] for a negative quantity.
    pub fn skip(n: i64) -> Result<Self, QueryBuildError> {
        u64::try_from(n)
            .map(Self::Skip)
            .map_err(|_| QueryBuildError::NegativeLimit {
                stage: "Skip",
                value: n,
            })
    }

    /// Creates a count stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::InvalidCountField`] for an empty name, a
    /// name starting with `$` or a dotted name.
    pub fn count(name: impl Into<String>) -> Result<Self, QueryBuildError> {
        let name = name.into();
        if name.is_empty() || name.starts_with('$') || name.contains('.') {
            return Err(QueryBuildError::InvalidCountField);
        }
        Ok(Self::Count(name))
    }

    /// Returns the stage name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw(_) => "RawOperation",
            Self::Filter(_) => "FilterOperation",
            Self::Lookup(_) => "SelectRelatedOperation",
            Self::Limit(_) => "LimitOperation",
            Self::Skip(_) => "SkipOperation",
            Self::Project(_) => "ProjectOperation",
            Self::Annotate(_) => "AnnotationOperation",
            Self::Group(_) => "GroupOperation",
            Self::Sort(_) => "SortOperation",
            Self::Count(_) => "CountOperation",
        }
    }

    /// Renders the stage document.
    pub fn definition(&self) -> Document {
        let (key, spec) = match self {
            Self::Raw(stage) => return stage.clone(),
            Self::Filter(filter) => ("$match", Json::Object(filter.query.clone())),
            Self::Lookup(lookup) => ("$lookup", Json::Object(lookup.definition())),
            Self::Limit(n) => ("$limit", Json::from(*n)),
            Self::Skip(n) => ("$skip", Json::from(*n)),
            Self::Project(projection) => ("$project", Json::Object(projection.clone())),
            Self::Annotate(fields) => ("$addFields", Json::Object(fields.clone())),
            Self::Group(group) => ("$group", Json::Object(group.spec.clone())),
            Self::Sort(sort) => ("$sort", Json::Object(sort.clone())),
            Self::Count(name) => ("$count", Json::from(name.as_str())),
        };
        let mut stage = Document::new();
        stage.insert(key.to_string(), spec);
        stage
    }
}

impl From<Lookup> for Operation {
    fn from(lookup: Lookup) -> Self {
        Self::Lookup(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::doc;
    use serde_json::json;

    #[test]
    fn test_filter_definition() {
        let op = Operation::filter(doc! { "age": { "$gte": 18 } }, Some(3)).unwrap();
        assert_eq!(op.definition(), doc! { "$match": { "age": { "$gte": 18 } } });
        assert_eq!(op.name(), "FilterOperation");
    }

    #[test]
    fn test_filter_rejects_forbidden_operators() {
        assert_eq!(
            Operation::filter(doc! { "$where": "this.a > 1" }, None),
            Err(QueryBuildError::ForbiddenOperator("$where".into()))
        );
        assert_eq!(
            Operation::filter(doc! { "loc": { "$near": [0, 0] } }, None),
            Err(QueryBuildError::ForbiddenOperator("$near".into()))
        );
        assert_eq!(
            Operation::filter(doc! { "$or": [{ "loc": { "$nearSphere": [0, 0] } }] }, None),
            Err(QueryBuildError::ForbiddenOperator("$nearSphere".into()))
        );
    }

    #[test]
    fn test_text_search_must_come_first() {
        let text = doc! { "$text": { "$search": "rust" } };
        assert!(Operation::filter(text.clone(), Some(0)).is_ok());
        assert!(Operation::filter(text.clone(), None).is_ok());
        assert_eq!(
            Operation::filter(text, Some(1)),
            Err(QueryBuildError::MisplacedTextSearch)
        );
    }

    #[test]
    fn test_group_construction() {
        assert_eq!(
            Operation::group(doc! {}),
            Err(QueryBuildError::MissingGroupId)
        );
        assert_eq!(
            Operation::group(doc! { "_id": null, "total": { "$unsupported_op": 1 } }),
            Err(QueryBuildError::UnknownAccumulator("$unsupported_op".into()))
        );
        assert_eq!(
            Operation::group(doc! { "_id": null, "total": 1 }),
            Err(QueryBuildError::NotAnAccumulator("total".into()))
        );

        let op = Operation::group(doc! { "_id": null, "total": { "$sum": 1 } }).unwrap();
        assert_eq!(
            op.definition(),
            doc! { "$group": { "_id": null, "total": { "$sum": 1 } } }
        );
    }

    #[test]
    fn test_limit_and_skip() {
        assert_eq!(Operation::limit(5).unwrap().definition(), doc! { "$limit": 5 });
        assert_eq!(Operation::skip(0).unwrap().definition(), doc! { "$skip": 0 });
        assert!(matches!(
            Operation::limit(-1),
            Err(QueryBuildError::NegativeLimit { value: -1, .. })
        ));
    }

    #[test]
    fn test_lookup_from_document() {
        let lookup = Lookup::from_document(&doc! {
            "from": "account",
            "localField": "account_id",
            "foreignField": "_id",
            "as": "account",
        })
        .unwrap();
        assert_eq!(
            Operation::from(lookup).definition(),
            doc! {
                "$lookup": {
                    "from": "account",
                    "localField": "account_id",
                    "foreignField": "_id",
                    "as": "account",
                }
            }
        );

        assert_eq!(
            Lookup::from_document(&doc! { "from": "account", "as": "account" }),
            Err(QueryBuildError::MissingLookupField("localField"))
        );
    }

    #[test]
    fn test_count_definition() {
        assert_eq!(
            Operation::count("total").unwrap().definition().get("$count"),
            Some(&json!("total"))
        );
        assert_eq!(Operation::count(""), Err(QueryBuildError::InvalidCountField));
    }
}
