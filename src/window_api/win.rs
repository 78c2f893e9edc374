use anyhow::{anyhow, Result};
use tracing::{error, warn};
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, BOOL, HANDLE, HWND},
        System::{
            SystemInformation::GetTickCount64,
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::{
            Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
            WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
        },
    },
};

use crate::storage::entities::FocusSnapshot;

use super::{executable_name, FocusProbe};

/// Reads the foreground window. A missing window (desktop, lock screen) is an empty snapshot,
/// a process that can't be opened leaves the process name empty.
#[tracing::instrument]
pub fn get_foreground() -> FocusSnapshot {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return FocusSnapshot::default();
    }

    let mut text: [u16; 4096] = [0; 4096];
    let title = unsafe { get_window_title(window, &mut text) };

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    let process_name = if id == 0 {
        String::new()
    } else {
        get_process_name(id, &mut text)
            .inspect_err(|e| warn!("Failed to resolve process {id}: {e:?}"))
            .unwrap_or_default()
    };

    FocusSnapshot::new(title, process_name)
}

fn get_process_name(id: u32, text: &mut [u16]) -> Result<String> {
    let process_handle =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) }?;
    let path = unsafe { get_process_path(process_handle, text) };
    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))?;
    Ok(executable_name(&path?))
}

unsafe fn get_process_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len.max(0) as usize])
}

pub fn get_idle_seconds() -> Result<u64> {
    let mut last = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    // dwTime is a 32 bit tick count, compare in the same width so wraparound after 49 days works.
    let tick_count = unsafe { GetTickCount64() } as u32;
    Ok(u64::from(tick_count.wrapping_sub(last.dwTime)) / 1000)
}

#[derive(Default)]
pub struct WindowsFocusProbe {}

impl WindowsFocusProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl FocusProbe for WindowsFocusProbe {
    fn probe_focus(&mut self) -> Result<FocusSnapshot> {
        Ok(get_foreground())
    }

    fn idle_seconds(&mut self) -> Result<u64> {
        get_idle_seconds().inspect_err(|e| error!("Failed to get idle time {e:?}"))
    }
}
