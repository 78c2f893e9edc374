use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::{instrument, warn};
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, Atom, Drawable, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection, Xid,
};

use crate::storage::entities::FocusSnapshot;

use super::{executable_name, FocusProbe};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

/// `None` when no window is focused, e.g. on an empty workspace.
fn get_active_window(
    conn: &Connection,
    root: Window,
    active_window_atom: Atom,
) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result
        .value::<Window>()
        .first()
        .copied()
        .filter(|v| v.resource_id() != 0))
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value::<u8>()).into_owned())
}

pub struct X11FocusProbe {
    connection: Connection,
    root: Window,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl X11FocusProbe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        // Only the preferred screen is tracked.
        let root = connection
            .get_setup()
            .roots()
            .nth(preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("X server reported no screen {preferred_screen}"))?
            .root();
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            root,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new_with_specifics(RefreshKind::nothing()),
        })
    }

    fn process_name(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_exe(sysinfo::UpdateKind::OnlyIfNotSet),
        );
        let process = self.system.process(pid)?;
        match process.exe().and_then(|v| v.to_str()) {
            Some(path) => Some(executable_name(path)),
            None => Some(process.name().to_string_lossy().into_owned()),
        }
    }
}

impl FocusProbe for X11FocusProbe {
    #[instrument(skip(self))]
    fn probe_focus(&mut self) -> Result<FocusSnapshot> {
        let Some(window) =
            get_active_window(&self.connection, self.root, self.active_window_atom)?
        else {
            return Ok(FocusSnapshot::default());
        };
        let title = get_name(&self.connection, window, self.window_name_atom)?;
        let process_name = match get_pid(&self.connection, window, self.pid_atom)? {
            Some(pid) => self.process_name(pid).unwrap_or_else(|| {
                warn!("Process {pid} of the focused window is gone");
                String::new()
            }),
            None => String::new(),
        };
        Ok(FocusSnapshot::new(title, process_name))
    }

    #[instrument(skip(self))]
    fn idle_seconds(&mut self) -> Result<u64> {
        let request = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(self.root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(request)?;
        Ok(u64::from(reply.ms_since_user_input()) / 1000)
    }
}
