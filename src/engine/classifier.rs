use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::storage::{entities::NormalizedActivity, summary::write_table_summary};

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const MEETINGS: &str = "Meetings";

/// Keyword table used when no override file is present. Order matters, the first keyword found
/// wins.
pub const DEFAULT_CATEGORIES: [(&str, &str); 15] = [
    ("excel", "Work - Office"),
    ("winword", "Work - Office"),
    ("powerpnt", "Work - Office"),
    ("outlook", "Email"),
    ("chrome", "Web Browsing"),
    ("firefox", "Web Browsing"),
    ("edge", "Web Browsing"),
    ("teams", MEETINGS),
    ("slack", "Communication"),
    ("zoom", MEETINGS),
    ("notepad", "Notes"),
    ("code", "Development"),
    ("pycharm", "Development"),
    ("cmd", "Terminal"),
    ("powershell", "Terminal"),
];

/// Applications that append their own name to every window title.
const TITLE_SUFFIXES: [(&str, &str); 6] = [
    ("excel.exe", " - Excel"),
    ("winword.exe", " - Word"),
    ("powerpnt.exe", " - PowerPoint"),
    ("outlook.exe", " - Outlook"),
    ("chrome.exe", " - Google Chrome"),
    ("msedge.exe", " - Microsoft Edge"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryRule {
    /// Always lowercase.
    keyword: Arc<str>,
    category: Arc<str>,
}

/// Ordered list of `(keyword, category)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_CATEGORIES)
    }
}

impl CategoryTable {
    pub fn from_pairs<K: AsRef<str>, C: AsRef<str>>(
        pairs: impl IntoIterator<Item = (K, C)>,
    ) -> Self {
        let mut table = Self { rules: vec![] };
        for (keyword, category) in pairs {
            table.set(keyword.as_ref(), category.as_ref());
        }
        table
    }

    /// Replaces the category of an existing keyword in place, or appends a new keyword at the end
    /// of the table.
    pub fn set(&mut self, keyword: &str, category: &str) {
        let keyword = keyword.trim().to_lowercase();
        let category = category.trim();
        if keyword.is_empty() || category.is_empty() {
            return;
        }
        match self.rules.iter_mut().find(|v| *v.keyword == *keyword) {
            Some(rule) => rule.category = category.into(),
            None => self.rules.push(CategoryRule {
                keyword: keyword.into(),
                category: category.into(),
            }),
        }
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules
            .iter()
            .map(|v| (v.keyword.as_ref(), v.category.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Loads the defaults merged with the `Key`/`Category` columns of an override file. Any
    /// problem with the file falls back to the defaults.
    pub fn load(path: &Path) -> Self {
        let mut table = Self::default();
        if !path.exists() {
            info!("No category overrides at {path:?}, using defaults");
            return table;
        }
        match read_overrides(path) {
            Ok(overrides) if !overrides.is_empty() => {
                info!("Loaded {} category overrides from {path:?}", overrides.len());
                for (keyword, category) in overrides {
                    table.set(&keyword, &category);
                }
            }
            Ok(_) => info!("No category overrides found in {path:?}, using defaults"),
            Err(e) => warn!("Failed to read category overrides {path:?}, using defaults: {e:?}"),
        }
        table
    }

    /// Same as [CategoryTable::load], except that a missing file is created with the default
    /// table so categories can be edited before the first summary refresh.
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            return Self::load(path);
        }
        let table = Self::default();
        match write_table_summary(path, &table) {
            Ok(()) => info!("Wrote default categories to {path:?}"),
            Err(e) => warn!("Failed to write default categories to {path:?}: {e:?}"),
        }
        table
    }
}

/// Reads `(key, category)` pairs. Rows starting with `#` and empty rows before the header are
/// comments.
fn read_overrides(path: &Path) -> Result<Vec<(String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {path:?}"))?;

    let mut records = reader.records();
    let header = loop {
        let Some(record) = records.next() else {
            return Err(anyhow!("Header row with Key and Category is missing"));
        };
        let record = record?;
        match record.get(0) {
            Some(first) if !first.is_empty() && !first.starts_with('#') => break record,
            _ => continue,
        }
    };

    let position = |name: &str| {
        header
            .iter()
            .position(|v| v.trim() == name)
            .ok_or_else(|| anyhow!("Column {name} is missing"))
    };
    let key_index = position("Key")?;
    let category_index = position("Category")?;

    let mut pairs = vec![];
    for record in records {
        let record = record?;
        if let (Some(key), Some(category)) = (record.get(key_index), record.get(category_index)) {
            let (key, category) = (key.trim(), category.trim());
            if !key.is_empty() && !category.is_empty() {
                pairs.push((key.to_string(), category.to_string()));
            }
        }
    }
    Ok(pairs)
}

/// Turns raw window metadata into `(details, category)`. Pure: same input, same output.
#[derive(Debug, Clone, Default)]
pub struct ActivityClassifier {
    table: CategoryTable,
}

impl ActivityClassifier {
    pub fn new(table: CategoryTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn classify(&self, window_title: &str, process_name: &str) -> NormalizedActivity {
        let details = extract_details(window_title, process_name);
        let category = self.categorize(window_title, process_name, &details);
        NormalizedActivity {
            details: details.into(),
            category,
        }
    }

    /// Keywords are tried in table order. For each one the process name, the raw title and the
    /// details are searched, case-insensitively.
    pub fn categorize(&self, window_title: &str, process_name: &str, details: &str) -> Arc<str> {
        let process = process_name.to_lowercase();
        let title = window_title.to_lowercase();
        let details = details.to_lowercase();

        self.table
            .rules
            .iter()
            .find(|rule| {
                let keyword = &*rule.keyword;
                process.contains(keyword) || title.contains(keyword) || details.contains(keyword)
            })
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| UNCATEGORIZED.into())
    }
}

/// Strips the application name from a window title.
pub fn extract_details(window_title: &str, process_name: &str) -> String {
    let process = process_name.to_lowercase();
    if let Some((_, suffix)) = TITLE_SUFFIXES
        .iter()
        .find(|(name, suffix)| process == *name && window_title.contains(suffix))
    {
        return window_title.replace(suffix, "").trim().to_string();
    }

    match window_title.rsplit_once(" - ") {
        Some((before, _)) => before.trim().to_string(),
        None => window_title.trim().to_string(),
    }
}
