pub mod aggregation;
pub mod client;
pub mod cursor_engine;
