//! Output module for reporting on the harvested graph
//!
//! This module handles:
//! - Loading graph-wide statistics from the store
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, GraphStatistics};
