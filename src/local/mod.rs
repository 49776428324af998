//! In-process evaluator for the aggregation subset the reports use.
//!
//! Lets a report run against a JSON fixture instead of a live server, and
//! lets tests check pipeline semantics on synthetic flight records.

use mongodb::bson::Document;

use crate::error::{Error, Result};

pub mod expression;
pub mod ordering;
pub mod query;
pub mod stage;

use stage::Stage;

/// A parsed pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn parse(stages: &[Document]) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::Evaluation("pipeline cannot be empty".to_string()));
        }
        let stages = stages.iter().map(Stage::parse).collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn execute(&self, mut docs: Vec<Document>) -> Result<Vec<Document>> {
        for stage in &self.stages {
            docs = stage.execute(docs)?;
        }
        Ok(docs)
    }
}

/// Parse and run `pipeline` over `docs`.
pub fn aggregate(pipeline: &[Document], docs: Vec<Document>) -> Result<Vec<Document>> {
    Pipeline::parse(pipeline)?.execute(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn empty_pipeline_is_rejected() {
        assert!(Pipeline::parse(&[]).is_err());
    }

    #[test]
    fn stages_run_in_order() {
        let pipeline = vec![
            doc! {"$match": {"year": 2020}},
            doc! {"$group": {"_id": "$airline", "n": {"$sum": 1}}},
            doc! {"$sort": {"_id": 1}},
        ];
        let docs = vec![
            doc! {"year": 2020, "airline": "UA"},
            doc! {"year": 2019, "airline": "AA"},
            doc! {"year": 2020, "airline": "AA"},
            doc! {"year": 2020, "airline": "UA"},
        ];
        let out = aggregate(&pipeline, docs).unwrap();
        assert_eq!(out, vec![doc! {"_id": "AA", "n": 1}, doc! {"_id": "UA", "n": 2}]);
    }
}
