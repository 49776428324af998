use futures::stream::{self, BoxStream, StreamExt};
use mongodb::{bson::Document, Cursor};

use crate::error::{Error, Result};

/// Forward-only stream of result documents. It cannot be rewound; pulling
/// past the end keeps returning `None`.
pub struct ResultCursor {
    stream: BoxStream<'static, Result<Document>>,
    pulled: usize,
}

impl ResultCursor {
    pub fn from_mongo(cursor: Cursor<Document>) -> Self {
        Self::new(cursor.map(|doc| doc.map_err(Error::Query)).boxed())
    }

    pub fn from_documents(docs: Vec<Document>) -> Self {
        Self::new(stream::iter(docs.into_iter().map(Ok)).boxed())
    }

    fn new(stream: BoxStream<'static, Result<Document>>) -> Self {
        Self { stream, pulled: 0 }
    }

    /// Pull the next document. A driver error here is fatal to the run.
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        match self.stream.next().await {
            Some(Ok(doc)) => {
                self.pulled += 1;
                Ok(Some(doc))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Number of documents handed out so far
    pub fn pulled(&self) -> usize {
        self.pulled
    }
}
