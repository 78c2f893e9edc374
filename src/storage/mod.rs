//! Persistence of finished sessions.
//!  - [log_writer::LogWriter] appends one CSV row per closed session and never rewrites old rows.
//!  - [summary] folds the whole log into per-key totals, which double as the category override
//!    file.

pub mod entities;
pub mod log_writer;
pub mod summary;
