//! Lazy entity cursors.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use docmodel_core::DocumentCursor;
use futures::stream::{Stream, StreamExt};

use crate::entity::Entity;
use crate::error::Result;
use crate::model::Model;

/// A lazy, finite, non-restartable sequence of entities.
///
/// Wraps a [`DocumentCursor`] and materializes every document through
/// [`Entity::create_from_db`] as it is read.
pub struct EntityCursor {
    model: Model,
    documents: DocumentCursor,
}

impl EntityCursor {
    /// Wraps a document cursor for `model`.
    pub fn new(model: &Model, documents: DocumentCursor) -> Self {
        Self {
            model: model.clone(),
            documents,
        }
    }

    /// Returns the next entity, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Option<Result<Entity>> {
        let document = self.documents.next().await?;
        Some(
            document
                .map(|document| Entity::create_from_db(&self.model, document))
                .map_err(Into::into),
        )
    }

    /// Drains the cursor into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub async fn try_collect(mut self) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();
        while let Some(entity) = self.next().await {
            entities.push(entity?);
        }
        Ok(entities)
    }

    /// Returns the bound model.
    pub fn model(&self) -> &Model {
        &self.model
    }
}

impl Stream for EntityCursor {
    type Item = Result<Entity>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.documents.poll_next_unpin(cx).map(|item| {
            item.map(|document| {
                document
                    .map(|document| Entity::create_from_db(&this.model, document))
                    .map_err(Into::into)
            })
        })
    }
}

impl fmt::Debug for EntityCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCursor")
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::doc;
    use docmodel_core::memory::MemoryDatabase;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn model() -> Model {
        Model::builder("Note")
            .build(Arc::new(MemoryDatabase::new("test")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_materializes_entities() {
        let model = model();
        let documents = DocumentCursor::from_documents(vec![doc! { "_id": "n1" }, doc! { "_id": "n2" }]);
        let mut cursor = EntityCursor::new(&model, documents);

        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.id(), Some(&crate::Value::from("n1")));
        assert!(cursor.next().await.is_some());
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_and_collect() {
        let model = model();
        let documents = DocumentCursor::from_documents(vec![doc! { "_id": "n1" }]);
        let collected: Vec<Entity> = EntityCursor::new(&model, documents)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected.len(), 1);

        let documents = DocumentCursor::from_documents(vec![doc! { "_id": "n1" }, doc! { "_id": "n2" }]);
        let streamed: Vec<Entity> = TryStreamExt::try_collect(EntityCursor::new(&model, documents))
            .await
            .unwrap();
        assert_eq!(streamed.len(), 2);
    }
}
