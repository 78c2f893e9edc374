use anyhow::Result;
use ansi_term::Colour;

use crate::{
    engine::{
        classifier::{ActivityClassifier, CategoryTable},
        EnginePaths,
    },
    storage::summary::{refresh_summary, SummaryEntry},
    utils::time::format_day_duration,
};

/// Command to process `summary` command. Rewrites the summary file from the activity log and
/// prints the same entries.
pub async fn process_summary_command(paths: EnginePaths, json: bool) -> Result<()> {
    let classifier = ActivityClassifier::new(CategoryTable::load(&paths.categories_path));
    let entries = refresh_summary(paths.log_path, paths.summary_path, classifier).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_entries(&entries);
    }
    Ok(())
}

fn print_entries(entries: &[SummaryEntry]) {
    if entries.is_empty() {
        println!("No activity recorded yet");
        return;
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}\t{}",
            format_day_duration(entry.duration_seconds),
            entry.count,
            Colour::Cyan.paint(entry.category.as_str()),
            entry.key
        );
    }
}
