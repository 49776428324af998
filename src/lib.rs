//! Flight-record analytics: runs fixed aggregation reports against a
//! MongoDB flights collection (or a JSON fixture) and prints pipe-delimited
//! rows.

pub mod app;
pub mod error;
pub mod local;
pub mod mongo;
pub mod pipelines;
pub mod security;
pub mod utils;

pub use app::config::Config;
pub use error::{Error, FormatError, Result};
pub use mongo::aggregation::FlightStore;
pub use mongo::cursor_engine::ResultCursor;
pub use pipelines::{Report, ReportParams, REPORTS};
