use mongodb::bson::{doc, Document};

use super::{month_names, ReportParams};

pub const HOURLY_COLUMNS: &[&str] = &[
    "dest",
    "month",
    "monthname",
    "scheduled_arrival_hr",
    "avg_arr_delay",
    "max_arr_delay",
];

pub const DAILY_COLUMNS: &[&str] = &[
    "dest",
    "monthname",
    "day",
    "avg_arr_delay",
    "max_arr_delay",
];

fn delayed_arrivals(params: &ReportParams) -> Vec<Document> {
    vec![
        doc! { "arr_delay": { "$gt": 0 } },
        doc! { "dest.code": { "$in": params.destinations.clone() } },
        doc! { "year": params.year },
    ]
}

fn add_month_name() -> Document {
    doc! {
        "$addFields": {
            "monthname": {
                "$let": {
                    "vars": { "monthsInString": month_names() },
                    "in": { "$arrayElemAt": ["$$monthsInString", "$month"] },
                }
            }
        }
    }
}

/// Arrival delay per destination, month and scheduled arrival hour. The
/// hour is the first two characters of `crs_arr_time` ("1430" -> 14).
pub fn hourly_pipeline(params: &ReportParams) -> Vec<Document> {
    vec![
        doc! { "$match": { "$and": delayed_arrivals(params) } },
        add_month_name(),
        doc! {
            "$project": {
                "_id": 0,
                "dest": "$dest.code",
                "month": 1,
                "monthname": 1,
                "scheduled_arrival_hr": { "$toInt": { "$substr": ["$crs_arr_time", 0, 2] } },
                "arr_delay": 1,
            }
        },
        doc! {
            "$group": {
                "_id": {
                    "dest": "$dest",
                    "month": "$month",
                    "monthname": "$monthname",
                    "scheduled_arrival_hr": "$scheduled_arrival_hr",
                },
                "avg_arr_delay": { "$avg": "$arr_delay" },
                "max_arr_delay": { "$max": "$arr_delay" },
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "dest": "$_id.dest",
                "month": "$_id.month",
                "monthname": "$_id.monthname",
                "scheduled_arrival_hr": "$_id.scheduled_arrival_hr",
                "avg_arr_delay": { "$round": ["$avg_arr_delay", 6] },
                "max_arr_delay": 1,
            }
        },
        doc! { "$sort": { "dest": 1, "month": 1, "scheduled_arrival_hr": 1 } },
    ]
}

/// Arrival delay per destination and day for the configured month.
pub fn daily_pipeline(params: &ReportParams) -> Vec<Document> {
    let mut filters = delayed_arrivals(params);
    filters.push(doc! { "month": params.month });

    vec![
        doc! { "$match": { "$and": filters } },
        add_month_name(),
        doc! {
            "$project": {
                "_id": 0,
                "dest": "$dest.code",
                "monthname": 1,
                "day": 1,
                "arr_delay": 1,
            }
        },
        doc! {
            "$group": {
                "_id": {
                    "dest": "$dest",
                    "monthname": "$monthname",
                    "day": "$day",
                },
                "avg_arr_delay": { "$avg": "$arr_delay" },
                "max_arr_delay": { "$max": "$arr_delay" },
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "dest": "$_id.dest",
                "monthname": "$_id.monthname",
                "day": "$_id.day",
                "avg_arr_delay": { "$round": ["$avg_arr_delay", 6] },
                "max_arr_delay": 1,
            }
        },
        doc! { "$sort": { "dest": 1, "monthname": 1, "day": 1 } },
    ]
}
