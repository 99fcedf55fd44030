//! Bounded-parallel batch processing of raster work units.
//!
//! A root directory holds one `Picture/<unit>` folder per unit plus a shared
//! `table/` folder of remap tables. Every unit runs the same three-stage
//! pipeline (reclassify, aggregate, normalize) and at most one unit per
//! physical core is in flight at a time.

pub mod config;
pub mod error;
pub mod hardware;
pub mod layout;
pub mod logging;
pub mod panic_hook;
pub mod pipeline;
pub mod toolkit;
pub mod utils;

pub use error::{Error, Result};
