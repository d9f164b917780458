use tracing::warn;
use x11rb::protocol::xproto::Window;

/// ICCCM lifecycle state of a client window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Withdrawn,
    Normal,
    Iconic,
}

impl WindowState {
    /// Value stored in the `WM_STATE` property
    pub fn code(self) -> u32 {
        match self {
            WindowState::Withdrawn => 0,
            WindowState::Normal => 1,
            WindowState::Iconic => 3,
        }
    }

    /// Decode a persisted `WM_STATE` code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(WindowState::Withdrawn),
            1 => Some(WindowState::Normal),
            3 => Some(WindowState::Iconic),
            _ => None,
        }
    }

    /// State a window is adopted into, given its persisted hint.
    ///
    /// Only an Iconic hint keeps the window iconified; Withdrawn, Normal, an
    /// absent property and garbage all adopt as Normal.
    pub fn initial_from_hint(hint: Option<u32>) -> Self {
        match hint.map(|code| (code, Self::from_code(code))) {
            Some((_, Some(WindowState::Iconic))) => WindowState::Iconic,
            Some((_, Some(_))) | None => WindowState::Normal,
            Some((code, None)) => {
                warn!("Ignoring malformed WM_STATE value {}, adopting as Normal", code);
                WindowState::Normal
            }
        }
    }
}

/// Icon standing in for an iconified client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icon {
    pub window: Window,
    pub highlighted: bool,
}

/// Window Manager client state
/// Represents a window being managed by the WM
#[derive(Debug)]
pub struct Client {
    /// X11 window ID
    pub window: Window,

    /// Lifecycle state
    pub state: WindowState,

    /// Is the window currently focused?
    pub focused: bool,

    /// Workspace the window belongs to (meaningless while Withdrawn)
    pub workspace: usize,

    /// Window title
    pub title: String,

    /// Icon window while Iconic
    pub icon: Option<Icon>,

    /// Whether we believe the window is mapped on the server
    pub mapped: bool,

    /// Unmaps we issued ourselves whose UnmapNotify has not arrived yet
    pub pending_unmaps: u32,
}

impl Client {
    pub fn new(window: Window, workspace: usize, title: String) -> Self {
        Self {
            window,
            state: WindowState::Withdrawn,
            focused: false,
            workspace,
            title,
            icon: None,
            mapped: false,
            pending_unmaps: 0,
        }
    }

    pub fn is_iconic(&self) -> bool {
        self.state == WindowState::Iconic
    }

    pub fn is_normal(&self) -> bool {
        self.state == WindowState::Normal
    }

    /// Consume one self-inflicted unmap; false means the client unmapped itself
    pub fn take_pending_unmap(&mut self) -> bool {
        if self.pending_unmaps > 0 {
            self.pending_unmaps -= 1;
            true
        } else {
            false
        }
    }

    /// Title shown in menus and on the icon
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Unnamed"
        } else {
            &self.title
        }
    }
}
