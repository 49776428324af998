use mongodb::{bson::Document, Collection};
use tracing::debug;

use crate::error::{Error, Result};
use crate::local;
use crate::mongo::cursor_engine::ResultCursor;

/// Where flight records come from: a live collection or records loaded
/// into memory from a fixture file.
#[derive(Debug, Clone)]
pub enum FlightStore {
    Mongo(Collection<Document>),
    Local(Vec<Document>),
}

impl FlightStore {
    /// Submit a pipeline and get its results back as a one-shot cursor.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<ResultCursor> {
        match self {
            FlightStore::Mongo(collection) => {
                debug!(
                    collection = %collection.name(),
                    stages = pipeline.len(),
                    "submitting pipeline"
                );
                let cursor = collection
                    .aggregate(pipeline, None)
                    .await
                    .map_err(Error::Query)?;
                Ok(ResultCursor::from_mongo(cursor))
            }
            FlightStore::Local(records) => {
                debug!(
                    records = records.len(),
                    stages = pipeline.len(),
                    "evaluating pipeline locally"
                );
                let results = local::aggregate(&pipeline, records.clone())?;
                Ok(ResultCursor::from_documents(results))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FlightStore::Mongo(collection) => format!(
                "{}.{}",
                collection.namespace().db,
                collection.name()
            ),
            FlightStore::Local(records) => format!("fixture ({} records)", records.len()),
        }
    }
}
