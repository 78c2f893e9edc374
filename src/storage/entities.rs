use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Category label reserved for the synthetic sessions that cover idle gaps.
pub const INACTIVE_CATEGORY: &str = "Inactive";
/// Window title written for idle gaps.
pub const INACTIVE_TITLE: &str = "Inactive";

/// What the foreground looked like at one poll. Either field may be empty when the platform
/// couldn't tell, e.g. the desktop itself is focused.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct FocusSnapshot {
    /// For example 'Budget.xlsx - Excel' or 'Inbox - someone@example.com - Outlook'
    pub window_title: Arc<str>,
    /// Executable file name, for example 'EXCEL.EXE'
    pub process_name: Arc<str>,
}

impl FocusSnapshot {
    pub fn new(window_title: impl Into<Arc<str>>, process_name: impl Into<Arc<str>>) -> Self {
        Self {
            window_title: window_title.into(),
            process_name: process_name.into(),
        }
    }
}

/// Cleaned up view of a [FocusSnapshot], produced by
/// [ActivityClassifier](crate::engine::classifier::ActivityClassifier).
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NormalizedActivity {
    pub details: Arc<str>,
    pub category: Arc<str>,
}

/// A closed, immutable span of time spent on one activity. This is what ends up as a row in the
/// activity log.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ActivitySession {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window_title: Arc<str>,
    pub process_name: Arc<str>,
    pub details: Arc<str>,
    pub category: Arc<str>,
}

impl ActivitySession {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Synthetic session describing a period without user input.
    pub fn inactive(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            window_title: INACTIVE_TITLE.into(),
            process_name: "".into(),
            details: "".into(),
            category: INACTIVE_CATEGORY.into(),
        }
    }

    pub fn is_inactive(&self) -> bool {
        &*self.category == INACTIVE_CATEGORY
    }
}
