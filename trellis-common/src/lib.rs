//! Basic types shared by trellis crates.

pub mod counter;
mod data;

pub use crate::data::Data;
