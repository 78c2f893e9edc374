use anyhow::{Context, Result};

/// The engine only ever needs one background task, so a current-thread runtime is enough.
/// Failing to build it is the one startup error that ends the process.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create the sampling runtime")
}
