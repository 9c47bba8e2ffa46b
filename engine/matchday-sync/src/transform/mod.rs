//! Raw provider payloads → canonical records.
//!
//! Pure functions only: no I/O, no clock. A match transform is all-or-nothing, a squad
//! transform drops the players it cannot map and keeps the rest.

pub mod match_data;
pub mod squad;

pub use match_data::{transform_match, DEFAULT_RATING};
pub use squad::{transform_club, transform_squad};
