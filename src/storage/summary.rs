use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    engine::classifier::{ActivityClassifier, CategoryTable},
    utils::time::{format_day_duration, LOG_TIMESTAMP_FORMAT},
};

use super::{
    entities::ActivitySession,
    log_writer::{read_log_rows, LogRow, LogWriter, SessionSink},
};

/// Rows written between two automatic summary refreshes.
pub const DEFAULT_SUMMARY_INTERVAL: u32 = 10;

/// Usage attributed to one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub key: String,
    pub category: String,
    pub count: u64,
    pub duration_seconds: i64,
}

/// Keyword a log row is credited to. Table keywords come first, then the row's own executable
/// name without `.exe`.
fn row_key(row: &LogRow, classifier: &ActivityClassifier) -> Option<(String, String)> {
    let process = row.process_name.to_lowercase();
    let title = row.window_title.to_lowercase();
    let details = row.details.to_lowercase();
    let matches = |key: &str| process.contains(key) || title.contains(key) || details.contains(key);

    if let Some((key, category)) = classifier.table().keywords().find(|(key, _)| matches(key)) {
        return Some((key.to_string(), category.to_string()));
    }

    let base = process.strip_suffix(".exe")?;
    if base.is_empty() {
        return None;
    }
    let category = classifier.categorize(base, base, base);
    Some((base.to_string(), category.to_string()))
}

/// Folds log rows into per-key totals, longest total first. Keys without rows are left out.
pub fn summarize(rows: &[LogRow], classifier: &ActivityClassifier) -> Vec<SummaryEntry> {
    let mut entries: Vec<SummaryEntry> = vec![];
    for row in rows {
        let Some((key, category)) = row_key(row, classifier) else {
            continue;
        };
        match entries.iter_mut().find(|v| v.key == key) {
            Some(entry) => {
                entry.count += 1;
                entry.duration_seconds += row.duration_seconds;
            }
            None => entries.push(SummaryEntry {
                key,
                category,
                count: 1,
                duration_seconds: row.duration_seconds,
            }),
        }
    }
    entries.sort_by(|a, b| b.duration_seconds.cmp(&a.duration_seconds));
    entries
}

pub fn summarize_log(
    log_path: &Path,
    classifier: &ActivityClassifier,
) -> Result<Vec<SummaryEntry>> {
    Ok(summarize(&read_log_rows(log_path)?, classifier))
}

/// Writes the summary file. Its `Key` and `Category` columns are read back by
/// [CategoryTable::load](crate::engine::classifier::CategoryTable::load), so editing a category
/// there changes how future sessions are classified.
pub fn write_summary(path: &Path, entries: &[SummaryEntry]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(["# ActivitySummary.csv"])?;
    writer.write_record([
        "# Last Updated:".to_string(),
        Local::now().format(LOG_TIMESTAMP_FORMAT).to_string(),
    ])?;
    writer.write_record(["# Total Entries:".to_string(), entries.len().to_string()])?;
    let preamble = writer.into_inner().map_err(|e| e.into_error())?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Key", "Category", "Count", "Duration"])?;
    for entry in entries {
        writer.write_record([
            entry.key.clone(),
            entry.category.clone(),
            entry.count.to_string(),
            format_day_duration(entry.duration_seconds),
        ])?;
    }
    let table = writer.into_inner().map_err(|e| e.into_error())?;

    let mut content = preamble;
    content.push(b'\n');
    content.extend(table);
    std::fs::write(path, content).with_context(|| format!("Failed to write summary {path:?}"))?;
    Ok(())
}

/// Summary listing every keyword of `table` without any usage yet.
pub fn write_table_summary(path: &Path, table: &CategoryTable) -> Result<()> {
    let entries: Vec<SummaryEntry> = table
        .keywords()
        .map(|(key, category)| SummaryEntry {
            key: key.to_string(),
            category: category.to_string(),
            count: 0,
            duration_seconds: 0,
        })
        .collect();
    write_summary(path, &entries)
}

/// Recomputes the summary from the log on a blocking thread.
pub async fn refresh_summary(
    log_path: PathBuf,
    summary_path: PathBuf,
    classifier: ActivityClassifier,
) -> Result<Vec<SummaryEntry>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<SummaryEntry>> {
        let entries = summarize_log(&log_path, &classifier)?;
        write_summary(&summary_path, &entries)?;
        info!("Summary with {} entries written to {summary_path:?}", entries.len());
        Ok(entries)
    })
    .await?
}

/// Bridges the engine and [LogWriter], refreshing the summary file every few rows.
pub struct SummarizingWriter {
    writer: LogWriter,
    summary_path: PathBuf,
    classifier: ActivityClassifier,
    refresh_every: u32,
    rows_since_refresh: u32,
}

impl SummarizingWriter {
    pub fn new(writer: LogWriter, summary_path: PathBuf, classifier: ActivityClassifier) -> Self {
        Self {
            writer,
            summary_path,
            classifier,
            refresh_every: DEFAULT_SUMMARY_INTERVAL,
            rows_since_refresh: 0,
        }
    }

    pub fn with_refresh_every(self, refresh_every: u32) -> Self {
        Self {
            refresh_every: refresh_every.max(1),
            ..self
        }
    }
}

impl SessionSink for SummarizingWriter {
    fn append(&mut self, session: &ActivitySession) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.writer.append_session(session).await?;

            self.rows_since_refresh += 1;
            if self.rows_since_refresh >= self.refresh_every {
                self.rows_since_refresh = 0;
                debug!("Refreshing summary {:?}", self.summary_path);
                // The row is already persisted, summary failures stay out of the append result.
                if let Err(e) = refresh_summary(
                    self.writer.path().to_path_buf(),
                    self.summary_path.clone(),
                    self.classifier.clone(),
                )
                .await
                {
                    error!("Failed to refresh summary {e:?}");
                }
            }
            Ok(())
        }
    }
}
