//! Per-call options forwarded to the store.

use std::sync::Arc;

use crate::document::Document;

/// An opaque session or transaction token.
///
/// The ORM never inspects it; it is forwarded unchanged to every collection
/// call made on behalf of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    id: Arc<str>,
}

impl Session {
    /// Creates a session token from a driver-issued identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the identifier.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Options for insert, update, delete and index calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    /// Session token.
    pub session: Option<Session>,
}

impl WriteOptions {
    /// Creates empty write options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session token.
    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

/// Options for `find` calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Session token.
    pub session: Option<Session>,
    /// Sort specification (`{field: 1 | -1}`).
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Projection applied to each document.
    pub projection: Option<Document>,
}

impl FindOptions {
    /// Creates empty find options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session token.
    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the sort specification.
    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the number of documents to skip.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Sets the maximum number of documents.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Options for `aggregate` calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    /// Session token.
    pub session: Option<Session>,
}

impl AggregateOptions {
    /// Creates empty aggregate options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session token.
    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

impl From<&AggregateOptions> for WriteOptions {
    fn from(options: &AggregateOptions) -> Self {
        Self {
            session: options.session.clone(),
        }
    }
}

impl From<&AggregateOptions> for FindOptions {
    fn from(options: &AggregateOptions) -> Self {
        Self {
            session: options.session.clone(),
            ..Self::default()
        }
    }
}
