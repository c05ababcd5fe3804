//! Timestamp helpers shared by validation, scheduling and stage results.

pub mod timestamps;

pub use timestamps::{iso_timestamp, parse_timestamp, value_to_timestamp, Timestamp, TimestampError};
