use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::utils::time::format_log_timestamp;

use super::entities::ActivitySession;

pub const LOG_HEADER: &str =
    "StartTime,EndTime,DurationSeconds,WindowTitle,WindowDetails,ProcessName,Category";

/// Destination for closed sessions. Abstracted so the engine can be exercised without touching
/// the disk.
pub trait SessionSink: Send {
    fn append(&mut self, session: &ActivitySession) -> impl Future<Output = Result<()>> + Send;
}

/// Append-only CSV activity log. The file is opened, written and closed on every call, no handle
/// is kept between sessions, so a crash costs at most the row being written.
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
}

impl LogWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_session(&self, session: &ActivitySession) -> Result<()> {
        let existed = tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to check {:?}", self.path))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open activity log {:?}", self.path))?;

        let mut buffer = String::new();
        if !existed {
            debug!("Creating activity log {:?}", self.path);
            buffer.push_str(LOG_HEADER);
            buffer.push('\n');
        }
        buffer.push_str(&encode_row(session));

        file.write_all(buffer.as_bytes())
            .await
            .with_context(|| format!("Failed to write into activity log {:?}", self.path))?;
        file.flush().await?;
        Ok(())
    }
}

impl SessionSink for LogWriter {
    fn append(&mut self, session: &ActivitySession) -> impl Future<Output = Result<()>> + Send {
        self.append_session(session)
    }
}

/// Encodes one log line, newline included. Text fields are wrapped in double quotes as is.
/// Embedded quotes are not escaped, a title containing `"` will shift field boundaries for
/// strict CSV readers.
pub fn encode_row(session: &ActivitySession) -> String {
    format!(
        "{},{},{},\"{}\",\"{}\",\"{}\",\"{}\"\n",
        format_log_timestamp(session.start),
        format_log_timestamp(session.end),
        session.duration().num_seconds(),
        single_line(&session.window_title),
        single_line(&session.details),
        single_line(&session.process_name),
        single_line(&session.category),
    )
}

// A line break inside a field would split the session over two rows.
fn single_line(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        value.replace(['\r', '\n'], " ").into()
    } else {
        value.into()
    }
}

/// A parsed row of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogRow {
    #[serde(rename = "StartTime")]
    pub start: String,
    #[serde(rename = "EndTime")]
    pub end: String,
    #[serde(rename = "DurationSeconds")]
    pub duration_seconds: i64,
    #[serde(rename = "WindowTitle")]
    pub window_title: String,
    #[serde(rename = "WindowDetails")]
    pub details: String,
    #[serde(rename = "ProcessName")]
    pub process_name: String,
    #[serde(rename = "Category")]
    pub category: String,
}

/// Reads every well-formed row of an activity log. Rows broken by embedded quotes or cut off by a
/// crash are skipped. A missing log reads as empty.
pub fn read_log_rows(path: &Path) -> Result<Vec<LogRow>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open activity log {path:?}"))?;

    let mut rows = vec![];
    for (index, row) in reader.deserialize::<LogRow>().enumerate() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping malformed row {} in {path:?}: {e}", index + 1),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        storage::entities::ActivitySession,
        utils::time::{format_log_timestamp, parse_log_timestamp},
    };

    use super::{read_log_rows, LogWriter, LOG_HEADER};

    fn budget_session() -> ActivitySession {
        let start = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2025, 1, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        ActivitySession {
            start,
            end: start + Duration::seconds(862),
            window_title: "Budget.xlsx - Excel".into(),
            process_name: "EXCEL.EXE".into(),
            details: "Budget.xlsx".into(),
            category: "Work - Office".into(),
        }
    }

    #[tokio::test]
    async fn test_header_written_for_new_file() -> Result<()> {
        let dir = tempdir()?;
        let writer = LogWriter::new(dir.path().join("log.csv"));
        let session = budget_session();

        writer.append_session(&session).await?;

        let content = std::fs::read_to_string(writer.path())?;
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], LOG_HEADER);
        assert_eq!(
            lines[1],
            format!(
                "{},{},862,\"Budget.xlsx - Excel\",\"Budget.xlsx\",\"EXCEL.EXE\",\"Work - Office\"",
                format_log_timestamp(session.start),
                format_log_timestamp(session.end)
            )
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_header_not_duplicated() -> Result<()> {
        let dir = tempdir()?;
        let writer = LogWriter::new(dir.path().join("log.csv"));

        writer.append_session(&budget_session()).await?;
        writer.append_session(&budget_session()).await?;
        let second = LogWriter::new(dir.path().join("log.csv"));
        second.append_session(&budget_session()).await?;

        let content = std::fs::read_to_string(writer.path())?;
        assert_eq!(content.lines().filter(|v| *v == LOG_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_file_is_only_appended() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "previous content\n")?;

        LogWriter::new(path.clone())
            .append_session(&budget_session())
            .await?;

        let content = std::fs::read_to_string(&path)?;
        assert!(content.starts_with("previous content\n"));
        assert!(!content.contains(LOG_HEADER));
        assert_eq!(content.lines().count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_written_row_parses_back() -> Result<()> {
        let dir = tempdir()?;
        let writer = LogWriter::new(dir.path().join("log.csv"));
        let session = budget_session();
        writer.append_session(&session).await?;

        let rows = read_log_rows(writer.path())?;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(parse_log_timestamp(&row.start)?, session.start);
        assert_eq!(parse_log_timestamp(&row.end)?, session.end);
        assert_eq!(row.duration_seconds, 862);
        assert_eq!(row.window_title, "Budget.xlsx - Excel");
        assert_eq!(row.details, "Budget.xlsx");
        assert_eq!(row.process_name, "EXCEL.EXE");
        assert_eq!(row.category, "Work - Office");
        Ok(())
    }

    #[tokio::test]
    async fn test_multiline_title_stays_on_one_row() -> Result<()> {
        let dir = tempdir()?;
        let writer = LogWriter::new(dir.path().join("log.csv"));
        let session = ActivitySession {
            window_title: "first\nsecond".into(),
            ..budget_session()
        };
        writer.append_session(&session).await?;

        let rows = read_log_rows(writer.path())?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].window_title, "first second");
        Ok(())
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_error() -> Result<()> {
        let dir = tempdir()?;
        let writer = LogWriter::new(dir.path().join("missing").join("log.csv"));
        assert!(writer.append_session(&budget_session()).await.is_err());
        Ok(())
    }

    #[test]
    fn test_missing_log_reads_empty() -> Result<()> {
        let dir = tempdir()?;
        assert!(read_log_rows(&dir.path().join("nothing.csv"))?.is_empty());
        Ok(())
    }
}
