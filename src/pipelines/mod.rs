//! Report catalogue: each report is an aggregation pipeline kept as plain
//! BSON data plus the columns printed from its result documents.

use chrono::Month;
use mongodb::bson::{Bson, Document};
use serde::Deserialize;

pub mod arrival_delay;
pub mod california_delays;
pub mod delay_causes;
pub mod market_share;

/// Values substituted into the pipelines (`[reports]` config section).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportParams {
    pub year: i32,
    pub destinations: Vec<String>,
    pub state: String,
    pub month: i32,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            year: 2020,
            destinations: vec!["SFO".into(), "OAK".into(), "SJC".into()],
            state: "CA".to_string(),
            month: 11,
        }
    }
}

/// A named pipeline and the columns its rows print.
pub struct Report {
    pub name: &'static str,
    pub description: &'static str,
    /// Field paths (dot notation allowed) in print order
    pub columns: &'static [&'static str],
    build: fn(&ReportParams) -> Vec<Document>,
}

impl Report {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        columns: &'static [&'static str],
        build: fn(&ReportParams) -> Vec<Document>,
    ) -> Self {
        Self {
            name,
            description,
            columns,
            build,
        }
    }

    pub fn pipeline(&self, params: &ReportParams) -> Vec<Document> {
        (self.build)(params)
    }
}

pub const REPORTS: &[Report] = &[
    Report {
        name: "market-share",
        description: "Per-airline flight count, cancellation/diversion rates and market share",
        columns: market_share::COLUMNS,
        build: market_share::pipeline,
    },
    Report {
        name: "delay-causes",
        description: "Delayed flights per airline and year, by primary delay cause",
        columns: delay_causes::COLUMNS,
        build: delay_causes::pipeline,
    },
    Report {
        name: "hourly-arrival-delay",
        description: "Average/maximum arrival delay per destination, month and scheduled hour",
        columns: arrival_delay::HOURLY_COLUMNS,
        build: arrival_delay::hourly_pipeline,
    },
    Report {
        name: "daily-arrival-delay",
        description: "Average/maximum arrival delay per destination and day of one month",
        columns: arrival_delay::DAILY_COLUMNS,
        build: arrival_delay::daily_pipeline,
    },
    Report {
        name: "california-delays",
        description: "Flight volume and average arrival delay per airline and destination airport in one state",
        columns: california_delays::COLUMNS,
        build: california_delays::pipeline,
    },
];

pub fn find(name: &str) -> Option<&'static Report> {
    REPORTS.iter().find(|r| r.name == name)
}

/// Month-name lookup used inside pipelines: index 0 is null, 1..=12 are
/// January..December.
pub fn month_names() -> Bson {
    let names = std::iter::successors(Some(Month::January), |m| {
        (*m != Month::December).then(|| m.succ())
    })
    .map(|m| Bson::String(m.name().to_string()));

    Bson::Array(std::iter::once(Bson::Null).chain(names).collect())
}

/// `round(part / whole * 100, 2)` as an aggregation expression.
pub(crate) fn rounded_percent(part: &str, whole: &str) -> Bson {
    mongodb::bson::bson!({
        "$round": [
            { "$multiply": [{ "$divide": [part, whole] }, 100] },
            2
        ]
    })
}
