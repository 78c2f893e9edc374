use anyhow::Result;
use tracing::info;

use crate::{storage::log_writer::SessionSink, window_api::FocusProbe};

use super::sampling::SamplingLoop;

/// Maps process signals onto the sampling control surface: Ctrl-C stops sampling and returns,
/// SIGHUP restarts it.
///
/// Detached processes on Windows don't receive Ctrl-C, there the process has to be killed.
pub async fn serve_until_shutdown<P, S>(sampling: &SamplingLoop<P, S>) -> Result<()>
where
    P: FocusProbe + 'static,
    S: SessionSink + 'static,
{
    let result = wait_for_shutdown(sampling).await;
    info!("Shutting down");
    sampling.stop().await;
    result
}

#[cfg(unix)]
async fn wait_for_shutdown<P, S>(sampling: &SamplingLoop<P, S>) -> Result<()>
where
    P: FocusProbe + 'static,
    S: SessionSink + 'static,
{
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return Ok(result?),
            _ = hangup.recv() => {
                info!("Received SIGHUP, restarting sampling");
                sampling.restart().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown<P, S>(_sampling: &SamplingLoop<P, S>) -> Result<()>
where
    P: FocusProbe + 'static,
    S: SessionSink + 'static,
{
    Ok(tokio::signal::ctrl_c().await?)
}
