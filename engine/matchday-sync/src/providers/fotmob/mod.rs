//! Fotmob match details: authenticated client and the raw payload schema.

pub mod client;
pub mod types;

pub use client::FotmobClient;
pub use types::*;
