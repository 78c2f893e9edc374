use std::{env, io, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use tracing::warn;

const APPLICATION_DIR_NAME: &str = "activity-logger";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path =
                PathBuf::from(env::var("APPDATA").context("APPDATA should be present on Windows")?);
            path.push(APPLICATION_DIR_NAME);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
    };

    ensure_dir(&path)?;
    Ok(path)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(_) => Ok(()),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(v) => Err(v.into()),
    }
}

/// Every machine writes into its own `<hostname>_ActivityLog.csv`, so a synced folder can hold
/// logs of several computers side by side.
pub fn default_log_path(app_dir: &Path) -> PathBuf {
    let host = hostname::get()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            warn!("Failed to resolve hostname {e:?}");
            "unknown".into()
        });
    app_dir.join(format!("{host}_ActivityLog.csv"))
}

pub fn default_summary_path(app_dir: &Path) -> PathBuf {
    app_dir.join("ActivitySummary.csv")
}
