//! Contains logic for querying the foreground window in different environments.
//! [GenericFocusProbe] is the main artifact of this module that abstracts the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::path::Path;

use anyhow::Result;

use crate::storage::entities::FocusSnapshot;

/// Contract windows and linux backends must implement. Both queries are expected to return within
/// tens of milliseconds.
#[cfg_attr(test, mockall::automock)]
pub trait FocusProbe: Send {
    /// Title and executable of the window holding focus.
    fn probe_focus(&mut self) -> Result<FocusSnapshot>;

    /// Seconds since the last keyboard or mouse input.
    fn idle_seconds(&mut self) -> Result<u64>;
}

/// Serves as a cross-compatible FocusProbe implementation.
pub struct GenericFocusProbe {
    inner: Box<dyn FocusProbe>,
}

impl GenericFocusProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsFocusProbe;
                Ok(Self {
                    inner: Box::new(WindowsFocusProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11FocusProbe;
                Ok(Self {
                    inner: Box::new(X11FocusProbe::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No focus backend was compiled in, enable the `win` or `x11` feature"
                ))
            }
        }
    }
}

impl FocusProbe for GenericFocusProbe {
    fn probe_focus(&mut self) -> Result<FocusSnapshot> {
        self.inner.probe_focus()
    }

    fn idle_seconds(&mut self) -> Result<u64> {
        self.inner.idle_seconds()
    }
}

/// Backends see full executable paths, the log only keeps the file name.
pub fn executable_name(path: &str) -> String {
    // Windows paths have to be split by hand when running elsewhere.
    let last = path.rsplit(['\\', '/']).next().unwrap_or(path);
    Path::new(last)
        .file_name()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_else(|| last.to_string())
}
