use mongodb::bson::{doc, Document};

use super::ReportParams;

pub const COLUMNS: &[&str] = &["_id.airline", "_id.airport", "volume", "avg_arrival_delay"];

/// Volume and mean arrival delay per (airline, destination airport) for
/// flights landing in one state.
pub fn pipeline(params: &ReportParams) -> Vec<Document> {
    vec![
        doc! { "$match": { "dest.state": params.state.as_str(), "year": params.year } },
        doc! {
            "$group": {
                "_id": {
                    "airline": "$carrier.airline",
                    "airport": "$dest.airport",
                },
                "volume": { "$sum": 1 },
                "total_arrival_delay": { "$sum": "$arr_delay" },
            }
        },
        doc! {
            "$project": {
                "_id": 1,
                "volume": 1,
                "avg_arrival_delay": { "$divide": ["$total_arrival_delay", "$volume"] },
            }
        },
        doc! {
            "$project": {
                "_id": 1,
                "volume": 1,
                "avg_arrival_delay": { "$round": ["$avg_arrival_delay", 6] },
            }
        },
        doc! { "$sort": { "_id.airline": 1, "_id.airport": 1 } },
    ]
}
