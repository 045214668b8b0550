//! Shared row model for the Firehose status ingestion pipeline.
//!
//! The pipeline moves one record shape end to end: a raw status message is
//! flattened into a fixed 16-column row, written as a one-row CSV object,
//! consolidated, and appended to the warehouse table. The column order is a
//! positional contract with the warehouse schema, so it is defined exactly
//! once, here. The lander writes rows through this crate and the
//! consolidator loads them through it; a column change that is not mirrored
//! on both sides fails to compile instead of silently misaligning the load.

pub mod extract;
pub mod row;

pub use extract::{extract, ExtractError, Extraction};
pub use row::{RowError, StatusRow, COLUMNS, COLUMN_COUNT};
