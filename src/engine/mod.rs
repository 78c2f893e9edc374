use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use tracing::info;

use crate::{
    storage::{log_writer::LogWriter, summary::SummarizingWriter},
    utils::clock::DefaultClock,
    window_api::GenericFocusProbe,
};

use classifier::{ActivityClassifier, CategoryTable};
use sampling::{SamplingConfig, SamplingLoop};

pub mod classifier;
pub mod sampling;
pub mod shutdown;
pub mod tracker;

/// Where the engine reads its categories from and writes its output to.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub log_path: PathBuf,
    pub summary_path: PathBuf,
    pub categories_path: PathBuf,
}

/// Represents the starting point for the engine. Samples until the process is asked to shut
/// down.
pub async fn start_engine(paths: EnginePaths) -> Result<()> {
    let probe = GenericFocusProbe::new()?;
    let classifier = ActivityClassifier::new(CategoryTable::load_or_create(&paths.categories_path));
    info!(
        "Logging activity into {:?} with {} category keywords",
        paths.log_path,
        classifier.table().len()
    );

    let sink = SummarizingWriter::new(
        LogWriter::new(paths.log_path),
        paths.summary_path,
        classifier.clone(),
    );
    let sampling = SamplingLoop::new(
        probe,
        classifier,
        sink,
        Arc::new(DefaultClock),
        SamplingConfig::default(),
    );

    sampling.start().await;
    shutdown::serve_until_shutdown(&sampling).await
}
