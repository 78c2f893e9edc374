use activity_logger::cli::run_cli;
use anyhow::Result;
use tracing::error;

fn main() -> Result<()> {
    run_cli().inspect_err(|e| {
        error!("Error running cli {e:?}");
    })
}
