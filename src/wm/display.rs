//! Display Module
//!
//! The server seam. Everything the core asks of the X server goes through the
//! [`Display`] trait: `X11Display` (see `connection.rs`) talks to a real server,
//! the test suite plugs in an in-memory fake.

use anyhow::Result;
use x11rb::protocol::xproto::{Font, Window};

use crate::wm::client::WindowState;
use crate::wm::events::{EventKind, WindowChanges, WmEvent};

/// Attributes the core needs when deciding whether to adopt a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub override_redirect: bool,
    pub mapped: bool,
}

/// Geometry of a window created by the window manager itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }
}

/// Request for a helper window (menus, icons, indicator, dialog)
#[derive(Debug, Clone)]
pub struct WindowSpec {
    /// Parent window, `None` for the root
    pub parent: Option<Window>,
    pub rect: Rect,
    pub border_width: u16,
    pub background: u32,
    pub border: u32,
    /// Helper windows we position ourselves bypass redirection
    pub override_redirect: bool,
    pub title: Option<String>,
}

/// A loaded server font with the metrics row layout needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontInfo {
    pub id: Font,
    pub ascent: i16,
    pub descent: i16,
}

impl FontInfo {
    /// Height of one text row including padding
    pub fn line_height(&self) -> u16 {
        (self.ascent + self.descent + 6).max(1) as u16
    }
}

/// Display server interface used by the session core
pub trait Display {
    fn root(&self) -> Window;

    fn screen_size(&self) -> (u16, u16);

    /// Select window-management input on the root.
    /// Fails when another window manager already holds substructure redirection.
    fn select_root_events(&mut self) -> Result<()>;

    fn grab_server(&mut self) -> Result<()>;

    fn ungrab_server(&mut self) -> Result<()>;

    /// Round-trip with the server and pull everything it sent into the local queue
    fn sync(&mut self) -> Result<()>;

    /// Sync, then throw away every queued event; returns how many were dropped
    fn discard_pending(&mut self) -> Result<usize>;

    /// Next queued event without blocking
    fn poll_event(&mut self) -> Result<Option<WmEvent>>;

    /// Remove and return the first queued event of `kind` reported against `window`
    fn take_pending(&mut self, window: Window, kind: EventKind) -> Option<WmEvent>;

    /// Children of the root, bottom to top
    fn top_level_windows(&mut self) -> Result<Vec<Window>>;

    /// `None` when the window no longer exists
    fn attributes(&mut self, window: Window) -> Result<Option<WindowAttributes>>;

    /// Raw persisted `WM_STATE` code, `None` when absent or unreadable
    fn wm_state(&mut self, window: Window) -> Result<Option<u32>>;

    fn set_wm_state(&mut self, window: Window, state: WindowState) -> Result<()>;

    fn window_title(&mut self, window: Window) -> Result<Option<String>>;

    /// Contents of the root `RESOURCE_MANAGER` property
    fn resource_database(&mut self) -> Result<Option<String>>;

    /// Start managing a client: event selection, save-set, modifier button grabs.
    /// Structure notifications are left to the root's substructure selection.
    fn manage(&mut self, window: Window) -> Result<()>;

    /// Hand a client back: reparent to root, leave save-set, map
    fn release(&mut self, window: Window) -> Result<()>;

    fn map(&mut self, window: Window) -> Result<()>;

    fn unmap(&mut self, window: Window) -> Result<()>;

    fn destroy_window(&mut self, window: Window) -> Result<()>;

    fn configure(&mut self, window: Window, changes: &WindowChanges) -> Result<()>;

    /// Apply a stacking order, topmost first
    fn restack(&mut self, top_to_bottom: &[Window]) -> Result<()>;

    fn raise(&mut self, window: Window) -> Result<()>;

    /// Give input focus to `window`; `Ok(false)` when the window refuses it
    fn set_input_focus(&mut self, window: Window) -> Result<bool>;

    /// Return focus to the pointer root
    fn focus_root(&mut self) -> Result<()>;

    fn set_border(&mut self, window: Window, pixel: u32) -> Result<()>;

    fn set_background(&mut self, window: Window, pixel: u32) -> Result<()>;

    fn create_window(&mut self, spec: &WindowSpec) -> Result<Window>;

    fn move_window(&mut self, window: Window, x: i16, y: i16) -> Result<()>;

    fn resize_window(&mut self, window: Window, width: u16, height: u16) -> Result<()>;

    fn clear(&mut self, window: Window) -> Result<()>;

    fn draw_text(
        &mut self,
        window: Window,
        font: &FontInfo,
        pixel: u32,
        x: i16,
        y: i16,
        text: &str,
    ) -> Result<()>;

    /// Rendered width of `text` in pixels
    fn text_width(&mut self, font: &FontInfo, text: &str) -> Result<u16>;

    /// `Ok(None)` when the server has no font by that name
    fn load_font(&mut self, name: &str) -> Result<Option<FontInfo>>;

    fn free_font(&mut self, font: &FontInfo) -> Result<()>;

    /// Resolve a colour name or `#rrggbb` spec to a pixel; `Ok(None)` when unknown
    fn lookup_color(&mut self, name: &str) -> Result<Option<u32>>;

    fn keysym(&mut self, keycode: u8) -> u32;

    /// Grab every keycode producing `keysym` with `modifiers` on the root
    fn grab_key(&mut self, keysym: u32, modifiers: u16) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}
