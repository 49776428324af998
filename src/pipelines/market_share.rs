use mongodb::bson::{doc, Document};

use super::{rounded_percent, ReportParams};

pub const COLUMNS: &[&str] = &[
    "airline",
    "flight_count",
    "cancelled_pct",
    "diverted_pct",
    "market_share_pct",
];

/// Airline market share and on-time performance for one year.
///
/// Per-airline counts are pushed into a single group so each row can be
/// divided by the total volume, then unwound back out.
pub fn pipeline(params: &ReportParams) -> Vec<Document> {
    vec![
        doc! { "$match": { "year": params.year } },
        doc! {
            "$group": {
                "_id": "$carrier.airline",
                "flight_count": { "$sum": 1 },
                "diverted": { "$sum": "$diverted" },
                "cancelled": { "$sum": "$cancelled" },
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "airline": "$_id",
                "flight_count": 1,
                "cancelled_pct": rounded_percent("$cancelled", "$flight_count"),
                "diverted_pct": rounded_percent("$diverted", "$flight_count"),
            }
        },
        doc! {
            "$group": {
                "_id": null,
                "total_volume": { "$sum": "$flight_count" },
                "flights": { "$push": "$$ROOT" },
            }
        },
        doc! { "$unwind": "$flights" },
        doc! {
            "$project": {
                "_id": 0,
                "airline": "$flights.airline",
                "flight_count": "$flights.flight_count",
                "cancelled_pct": "$flights.cancelled_pct",
                "diverted_pct": "$flights.diverted_pct",
                "market_share_pct": rounded_percent("$flights.flight_count", "$total_volume"),
            }
        },
        // airline only breaks ties
        doc! { "$sort": { "flight_count": -1, "airline": 1 } },
    ]
}
