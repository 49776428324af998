use mongodb::bson::{doc, Bson, Document};

use super::ReportParams;

pub const COLUMNS: &[&str] = &["airline", "year", "delay_type", "delay"];

/// Delay magnitudes checked in priority order; the first positive one names
/// the cause.
pub const DELAY_CAUSES: &[(&str, &str)] = &[
    ("carrier_delay", "Airline Delay"),
    ("late_aircraft_delay", "Late Aircraft Delay"),
    ("nas_delay", "Air System Delay"),
    ("weather_delay", "Weather Delay"),
];

pub const OTHER_DELAY: &str = "Other Delay";

fn delay_type() -> Document {
    let branches: Vec<Bson> = DELAY_CAUSES
        .iter()
        .map(|(field, label)| {
            Bson::Document(doc! {
                "case": { "$gt": [format!("${}", field), 0] },
                "then": *label,
            })
        })
        .collect();

    doc! {
        "$switch": {
            "branches": branches,
            "default": OTHER_DELAY,
        }
    }
}

/// Delayed-flight counts per (airline, year, delay cause).
pub fn pipeline(_params: &ReportParams) -> Vec<Document> {
    vec![
        doc! { "$match": { "has_delay": true } },
        doc! {
            "$group": {
                "_id": {
                    "airline": "$carrier.airline",
                    "year": "$year",
                    "delay_type": delay_type(),
                },
                "delay": { "$sum": 1 },
            }
        },
        doc! { "$sort": { "_id.airline": 1, "_id.year": 1, "_id.delay_type": 1 } },
        doc! {
            "$project": {
                "_id": 0,
                "airline": "$_id.airline",
                "year": "$_id.year",
                "delay_type": "$_id.delay_type",
                "delay": "$delay",
            }
        },
    ]
}
