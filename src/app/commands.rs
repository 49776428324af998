use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::app::config::Config;
use crate::error::Result;
use crate::mongo::aggregation::FlightStore;
use crate::mongo::client;
use crate::pipelines::{Report, ReportParams, REPORTS};
use crate::utils::{format, json};

/// Counts from one report run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub failed_rows: usize,
}

/// Connect to the configured collection, or load a fixture instead when
/// one is given (no connection is made then).
pub async fn open_store(config: &Config, fixture: Option<&Path>) -> Result<FlightStore> {
    if let Some(path) = fixture {
        let records = json::load_fixture(path)?;
        info!(path = %path.display(), records = records.len(), "loaded fixture");
        return Ok(FlightStore::Local(records));
    }

    let client = client::connect_configured(&config.mongo).await?;
    let collection = client
        .database(&config.mongo.database)
        .collection(&config.mongo.collection);
    Ok(FlightStore::Mongo(collection))
}

/// Run one report and write its rows to `out`.
///
/// A row that cannot be formatted is replaced by an `error:` line and the
/// run continues; query and I/O failures end it.
pub async fn run_report<W: Write>(
    store: &FlightStore,
    report: &Report,
    params: &ReportParams,
    out: &mut W,
) -> Result<RunSummary> {
    info!(report = report.name, source = %store.describe(), "running report");

    let mut cursor = store.aggregate(report.pipeline(params)).await?;
    let mut summary = RunSummary::default();

    while let Some(doc) = cursor.next_document().await? {
        match format::format_row(&doc, report.columns) {
            Ok(line) => {
                writeln!(out, "{}", line)?;
                summary.rows += 1;
            }
            Err(e) => {
                warn!(report = report.name, row = cursor.pulled(), error = %e, "row skipped");
                writeln!(out, "error: {}", e)?;
                summary.failed_rows += 1;
            }
        }
    }
    out.flush()?;

    info!(
        report = report.name,
        rows = summary.rows,
        failed_rows = summary.failed_rows,
        "report finished"
    );
    Ok(summary)
}

pub fn list_reports<W: Write>(out: &mut W) -> Result<()> {
    for report in REPORTS {
        writeln!(out, "{} - {}", report.name, report.description)?;
    }
    Ok(())
}
