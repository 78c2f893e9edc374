//! Background collector that records which application window holds focus, splits that into
//! activity sessions separated by idle periods, and appends finished sessions to a CSV log.
//!

pub mod cli;
pub mod engine;
pub mod storage;
pub mod utils;
pub mod window_api;
