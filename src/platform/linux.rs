use super::{UsageError, UsageStat, UsageStatsProvider};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Window};

/// Reports the active X11 window's `WM_CLASS` instance as the foreground target.
pub struct LinuxUsageProvider {
    conn: Option<x11rb::rust_connection::RustConnection>,
    root: Window,
}

impl Default for LinuxUsageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxUsageProvider {
    pub fn new() -> Self {
        match x11rb::connect(None) {
            Ok((conn, screen_num)) => {
                let Some(root) = conn.setup().roots.get(screen_num).map(|s| s.root) else {
                    log::warn!(
                        "Invalid screen number {screen_num} ({} screens available). Foreground tracking disabled.",
                        conn.setup().roots.len()
                    );
                    return Self { conn: None, root: 0 };
                };
                Self {
                    conn: Some(conn),
                    root,
                }
            }
            Err(e) => {
                // Wayland or headless: keep running, every query reports unavailable.
                log::warn!("Failed to connect to X server: {e}. Foreground tracking disabled.");
                Self { conn: None, root: 0 }
            }
        }
    }

    fn get_atom(&self, name: &str) -> Option<u32> {
        self.conn
            .as_ref()?
            .intern_atom(false, name.as_bytes())
            .ok()?
            .reply()
            .ok()
            .map(|r| r.atom)
    }

    fn get_window_property(&self, window: Window, atom: u32) -> Option<Vec<u8>> {
        let reply = self
            .conn
            .as_ref()?
            .get_property(false, window, atom, AtomEnum::ANY, 0, 1024)
            .ok()?
            .reply()
            .ok()?;

        if reply.value.is_empty() {
            return None;
        }

        Some(reply.value)
    }

    fn get_active_window_id(&self) -> Option<Window> {
        let conn = self.conn.as_ref()?;
        let atom = self.get_atom("_NET_ACTIVE_WINDOW")?;
        let reply = conn
            .get_property(false, self.root, atom, AtomEnum::WINDOW, 0, 1)
            .ok()?
            .reply()
            .ok()?;

        let bytes: [u8; 4] = reply.value.get(..4)?.try_into().ok()?;
        let window = u32::from_ne_bytes(bytes);
        (window != 0).then_some(window)
    }

    fn active_window_class(&self) -> Option<String> {
        let window_id = self.get_active_window_id()?;
        let raw = self.get_window_property(window_id, AtomEnum::WM_CLASS.into())?;
        let instance = raw.split(|b| *b == 0).next()?;
        let name = String::from_utf8_lossy(instance).trim().to_string();
        (!name.is_empty()).then_some(name)
    }
}

impl UsageStatsProvider for LinuxUsageProvider {
    fn query_usage(&self, _begin_ms: i64, end_ms: i64) -> Result<Vec<UsageStat>, UsageError> {
        if self.conn.is_none() {
            return Err(UsageError::Unavailable("no X server connection".to_string()));
        }

        // X11 only knows the present, so the active window is "last used" now.
        Ok(self
            .active_window_class()
            .map(|class| vec![UsageStat::new(&class, end_ms)])
            .unwrap_or_default())
    }
}
