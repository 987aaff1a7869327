//! Lazy document cursors.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use crate::document::Document;
use crate::error::Result;

/// A lazy, finite, non-restartable sequence of documents.
///
/// Drivers hand one of these back from `find` and `aggregate`. Once a
/// document has been yielded it cannot be read again.
pub struct DocumentCursor {
    inner: BoxStream<'static, Result<Document>>,
}

impl DocumentCursor {
    /// Wraps a stream of documents.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Document>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Creates a cursor over documents that are already in memory.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self::new(stream::iter(documents.into_iter().map(Ok)))
    }

    /// Returns the next document, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Option<Result<Document>> {
        self.inner.next().await
    }

    /// Drains the cursor into a vector.
    pub async fn try_collect(self) -> Result<Vec<Document>> {
        self.inner.try_collect().await
    }
}

impl Stream for DocumentCursor {
    type Item = Result<Document>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for DocumentCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCursor").finish_non_exhaustive()
    }
}
