pub mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    engine::{classifier::ActivityClassifier, classifier::CategoryTable, start_engine, EnginePaths},
    utils::{
        dir::{create_application_default_path, default_log_path, default_summary_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, ENGINE_PREFIX},
        runtime::single_thread_runtime,
    },
};

#[derive(Parser, Debug)]
#[command(name = "activity-logger", version)]
#[command(about = "Logs which application window holds focus over time", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/activity-logger, $HOME/.local/state/activity-logger or %APPDATA%\\activity-logger"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long = "log-path",
        global = true,
        help = "Activity log file. By default <dir>/<hostname>_ActivityLog.csv"
    )]
    log_path: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "File with Key and Category columns overriding the built-in categories. By default <dir>/ActivitySummary.csv"
    )]
    categories: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console", global = true)]
    log_console: bool,
    #[arg(long = "log-filter", global = true)]
    log: Option<LevelFilter>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Sample the focused window until Ctrl-C. SIGHUP restarts sampling")]
    Run,
    #[command(about = "Regenerate the usage summary from the activity log and print it")]
    Summary {
        #[arg(long, help = "Print entries as JSON")]
        json: bool,
    },
    #[command(about = "Show how a window would be classified")]
    Classify { title: String, process: String },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => {
            ensure_dir(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    let prefix = match args.commands {
        Commands::Run => ENGINE_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), args.log, args.log_console)?;

    let paths = EnginePaths {
        log_path: args.log_path.unwrap_or_else(|| default_log_path(&app_dir)),
        summary_path: default_summary_path(&app_dir),
        categories_path: args
            .categories
            .unwrap_or_else(|| default_summary_path(&app_dir)),
    };

    match args.commands {
        Commands::Run => single_thread_runtime()?.block_on(start_engine(paths)),
        Commands::Summary { json } => {
            single_thread_runtime()?.block_on(summary::process_summary_command(paths, json))
        }
        Commands::Classify { title, process } => {
            let classifier = ActivityClassifier::new(CategoryTable::load(&paths.categories_path));
            let activity = classifier.classify(&title, &process);
            println!("{}\t{}", activity.details, activity.category);
            Ok(())
        }
    }
}
