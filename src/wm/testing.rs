//! In-memory display server for unit tests

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use x11rb::protocol::xproto::Window;

use crate::config::Config;
use crate::wm::client::WindowState;
use crate::wm::display::{Display, FontInfo, WindowAttributes, WindowSpec};
use crate::wm::error::StartupError;
use crate::wm::events::{EventKind, WindowChanges, WmEvent};
use crate::wm::keyboard::keysym;
use crate::wm::session::{Session, Step};
use crate::wm::style::{DEFAULT_FONT, FALLBACK_FONT};

const ROOT: Window = 1;
const FIRST_CREATED: Window = 0x1000;
const FONT_BASE: u32 = 0x100;
const KEYMAP: &[(u8, u32)] = &[(23, keysym::TAB), (113, keysym::LEFT), (114, keysym::RIGHT)];

/// Everything the core asked of the fake server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Manage(Window),
    Release(Window),
    Map(Window),
    Unmap(Window),
    Destroy(Window),
    Create(Window),
    Configure(Window, WindowChanges),
    Restack(Vec<Window>),
    Raise(Window),
    SetFocus(Window),
    FocusRoot,
    SetBorder(Window, u32),
    SetBackground(Window, u32),
    SetWmState(Window, WindowState),
    Move(Window, i16, i16),
    Resize(Window, u16, u16),
    Clear(Window),
    DrawText(Window, String),
    GrabKey(u32, u16),
    FreeFont(u32),
}

/// A window known to the fake server
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    pub mapped: bool,
    pub override_redirect: bool,
    pub state: Option<u32>,
    pub title: Option<String>,
    pub parent: Option<Window>,
}

impl FakeWindow {
    pub fn mapped() -> Self {
        Self {
            mapped: true,
            ..Default::default()
        }
    }

    pub fn unmapped() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: u32) -> Self {
        self.state = Some(state);
        self
    }

    pub fn override_redirect(mut self) -> Self {
        self.override_redirect = true;
        self
    }
}

pub struct FakeDisplay {
    /// Font names the server knows
    pub fonts: Vec<String>,
    /// Windows that decline input focus
    pub refuse_focus: HashSet<Window>,
    pub resource_database: Option<String>,
    /// Another window manager already holds the root
    pub other_wm: bool,
    /// Root substructure notifications are selected
    substructure: bool,
    windows: HashMap<Window, FakeWindow>,
    events: VecDeque<WmEvent>,
    after_sync: Vec<WmEvent>,
    requests: Vec<Request>,
    configures: HashMap<Window, WindowChanges>,
    released: HashSet<Window>,
    focus_requests: Vec<Window>,
    focused_root: bool,
    grabs: u32,
    next_window: Window,
}

impl FakeDisplay {
    pub fn new() -> Self {
        Self {
            fonts: vec![DEFAULT_FONT.to_string(), FALLBACK_FONT.to_string()],
            refuse_focus: HashSet::new(),
            resource_database: None,
            other_wm: false,
            substructure: false,
            windows: HashMap::new(),
            events: VecDeque::new(),
            after_sync: Vec::new(),
            requests: Vec::new(),
            configures: HashMap::new(),
            released: HashSet::new(),
            focus_requests: Vec::new(),
            focused_root: false,
            grabs: 0,
            next_window: FIRST_CREATED,
        }
    }

    pub fn add_window(&mut self, window: Window, fake: FakeWindow) {
        self.windows.insert(window, fake);
    }

    pub fn set_title(&mut self, window: Window, title: &str) {
        if let Some(fake) = self.windows.get_mut(&window) {
            fake.title = Some(title.to_string());
        }
    }

    pub fn push_event(&mut self, event: WmEvent) {
        self.events.push_back(event);
    }

    /// Queue an event that only shows up once the core syncs
    pub fn inject_after_sync(&mut self, event: WmEvent) {
        self.after_sync.push(event);
    }

    pub fn queued(&self) -> usize {
        self.events.len()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn mapped(&self, window: Window) -> bool {
        self.windows.get(&window).is_some_and(|w| w.mapped)
    }

    /// Whether the core ever asked to unmap `window`
    pub fn unmapped(&self, window: Window) -> bool {
        self.requests.contains(&Request::Unmap(window))
    }

    pub fn map_count(&self, window: Window) -> usize {
        self.requests
            .iter()
            .filter(|r| **r == Request::Map(window))
            .count()
    }

    pub fn last_configure(&self, window: Window) -> Option<WindowChanges> {
        self.configures.get(&window).copied()
    }

    pub fn focus_requests(&self) -> &[Window] {
        &self.focus_requests
    }

    pub fn focused_root(&self) -> bool {
        self.focused_root
    }

    pub fn released(&self, window: Window) -> bool {
        self.released.contains(&window)
    }

    pub fn server_grabbed(&self) -> bool {
        self.grabs > 0
    }

    pub fn font_id(&self, name: &str) -> Option<u32> {
        self.fonts
            .iter()
            .position(|font| font == name)
            .map(|index| FONT_BASE + index as u32)
    }

    pub fn keycode_for(&self, sym: u32) -> u8 {
        KEYMAP
            .iter()
            .find(|(_, s)| *s == sym)
            .map(|(code, _)| *code)
            .unwrap_or(0)
    }

    fn set_mapped(&mut self, window: Window, mapped: bool) -> bool {
        let fake = self.windows.entry(window).or_default();
        let was = fake.mapped;
        fake.mapped = mapped;
        was
    }

    /// Whether the root hears about structure changes of `window`
    fn reported_to_root(&self, window: Window) -> bool {
        self.substructure && self.windows.get(&window).is_none_or(|w| w.parent.is_none())
    }
}

impl Display for FakeDisplay {
    fn root(&self) -> Window {
        ROOT
    }

    fn screen_size(&self) -> (u16, u16) {
        (1024, 768)
    }

    fn select_root_events(&mut self) -> Result<()> {
        if self.other_wm {
            return Err(StartupError::OtherWindowManager.into());
        }
        self.substructure = true;
        Ok(())
    }

    fn grab_server(&mut self) -> Result<()> {
        self.grabs += 1;
        Ok(())
    }

    fn ungrab_server(&mut self) -> Result<()> {
        self.grabs = self.grabs.saturating_sub(1);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.events.extend(self.after_sync.drain(..));
        Ok(())
    }

    fn discard_pending(&mut self) -> Result<usize> {
        self.sync()?;
        let dropped = self.events.len();
        self.events.clear();
        Ok(dropped)
    }

    fn poll_event(&mut self) -> Result<Option<WmEvent>> {
        Ok(self.events.pop_front())
    }

    fn take_pending(&mut self, window: Window, kind: EventKind) -> Option<WmEvent> {
        let index = self
            .events
            .iter()
            .position(|e| e.window() == window && e.kind() == kind)?;
        self.events.remove(index)
    }

    fn top_level_windows(&mut self) -> Result<Vec<Window>> {
        let mut windows: Vec<Window> = self
            .windows
            .iter()
            .filter(|(_, w)| w.parent.is_none())
            .map(|(&id, _)| id)
            .collect();
        windows.sort_unstable();
        Ok(windows)
    }

    fn attributes(&mut self, window: Window) -> Result<Option<WindowAttributes>> {
        Ok(self.windows.get(&window).map(|w| WindowAttributes {
            override_redirect: w.override_redirect,
            mapped: w.mapped,
        }))
    }

    fn wm_state(&mut self, window: Window) -> Result<Option<u32>> {
        Ok(self.windows.get(&window).and_then(|w| w.state))
    }

    fn set_wm_state(&mut self, window: Window, state: WindowState) -> Result<()> {
        if let Some(fake) = self.windows.get_mut(&window) {
            fake.state = Some(state.code());
        }
        self.requests.push(Request::SetWmState(window, state));
        Ok(())
    }

    fn window_title(&mut self, window: Window) -> Result<Option<String>> {
        Ok(self.windows.get(&window).and_then(|w| w.title.clone()))
    }

    fn resource_database(&mut self) -> Result<Option<String>> {
        Ok(self.resource_database.clone())
    }

    fn manage(&mut self, window: Window) -> Result<()> {
        self.requests.push(Request::Manage(window));
        Ok(())
    }

    fn release(&mut self, window: Window) -> Result<()> {
        self.released.insert(window);
        self.set_mapped(window, true);
        self.requests.push(Request::Release(window));
        Ok(())
    }

    fn map(&mut self, window: Window) -> Result<()> {
        self.set_mapped(window, true);
        self.requests.push(Request::Map(window));
        Ok(())
    }

    fn unmap(&mut self, window: Window) -> Result<()> {
        let was_mapped = self.set_mapped(window, false);
        if was_mapped && self.reported_to_root(window) {
            self.events.push_back(WmEvent::UnmapNotify { event: ROOT, window });
        }
        self.requests.push(Request::Unmap(window));
        Ok(())
    }

    fn destroy_window(&mut self, window: Window) -> Result<()> {
        if self.reported_to_root(window) {
            self.events.push_back(WmEvent::DestroyNotify { event: ROOT, window });
        }
        self.windows.remove(&window);
        self.windows.retain(|_, w| w.parent != Some(window));
        self.requests.push(Request::Destroy(window));
        Ok(())
    }

    fn configure(&mut self, window: Window, changes: &WindowChanges) -> Result<()> {
        self.configures.insert(window, *changes);
        self.requests.push(Request::Configure(window, *changes));
        Ok(())
    }

    fn restack(&mut self, top_to_bottom: &[Window]) -> Result<()> {
        self.requests.push(Request::Restack(top_to_bottom.to_vec()));
        Ok(())
    }

    fn raise(&mut self, window: Window) -> Result<()> {
        self.requests.push(Request::Raise(window));
        Ok(())
    }

    fn set_input_focus(&mut self, window: Window) -> Result<bool> {
        self.focus_requests.push(window);
        if self.refuse_focus.contains(&window) {
            return Ok(false);
        }
        self.focused_root = false;
        self.requests.push(Request::SetFocus(window));
        Ok(true)
    }

    fn focus_root(&mut self) -> Result<()> {
        self.focused_root = true;
        self.requests.push(Request::FocusRoot);
        Ok(())
    }

    fn set_border(&mut self, window: Window, pixel: u32) -> Result<()> {
        self.requests.push(Request::SetBorder(window, pixel));
        Ok(())
    }

    fn set_background(&mut self, window: Window, pixel: u32) -> Result<()> {
        self.requests.push(Request::SetBackground(window, pixel));
        Ok(())
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<Window> {
        let window = self.next_window;
        self.next_window += 1;
        self.windows.insert(
            window,
            FakeWindow {
                mapped: false,
                override_redirect: spec.override_redirect,
                state: None,
                title: spec.title.clone(),
                parent: spec.parent,
            },
        );
        self.requests.push(Request::Create(window));
        Ok(window)
    }

    fn move_window(&mut self, window: Window, x: i16, y: i16) -> Result<()> {
        self.requests.push(Request::Move(window, x, y));
        Ok(())
    }

    fn resize_window(&mut self, window: Window, width: u16, height: u16) -> Result<()> {
        self.requests.push(Request::Resize(window, width, height));
        Ok(())
    }

    fn clear(&mut self, window: Window) -> Result<()> {
        self.requests.push(Request::Clear(window));
        Ok(())
    }

    fn draw_text(
        &mut self,
        window: Window,
        _font: &FontInfo,
        _pixel: u32,
        _x: i16,
        _y: i16,
        text: &str,
    ) -> Result<()> {
        self.requests.push(Request::DrawText(window, text.to_string()));
        Ok(())
    }

    fn text_width(&mut self, _font: &FontInfo, text: &str) -> Result<u16> {
        Ok(text.chars().count() as u16 * 6)
    }

    fn load_font(&mut self, name: &str) -> Result<Option<FontInfo>> {
        Ok(self.font_id(name).map(|id| FontInfo {
            id,
            ascent: 10,
            descent: 3,
        }))
    }

    fn free_font(&mut self, font: &FontInfo) -> Result<()> {
        self.requests.push(Request::FreeFont(font.id));
        Ok(())
    }

    fn lookup_color(&mut self, name: &str) -> Result<Option<u32>> {
        let pixel = match name.trim().to_ascii_lowercase().as_str() {
            "black" => Some(0x000000),
            "white" => Some(0xffffff),
            "grey" | "gray" => Some(0xbebebe),
            "darkgrey" | "darkgray" => Some(0xa9a9a9),
            "red" => Some(0xff0000),
            hex => hex
                .strip_prefix('#')
                .filter(|digits| digits.len() == 6)
                .and_then(|digits| u32::from_str_radix(digits, 16).ok()),
        };
        Ok(pixel)
    }

    fn keysym(&mut self, keycode: u8) -> u32 {
        KEYMAP
            .iter()
            .find(|(code, _)| *code == keycode)
            .map(|(_, sym)| *sym)
            .unwrap_or(0)
    }

    fn grab_key(&mut self, keysym: u32, modifiers: u16) -> Result<()> {
        self.requests.push(Request::GrabKey(keysym, modifiers));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Start a session on `display` with default configuration
pub fn start_session(display: FakeDisplay) -> Session<FakeDisplay> {
    Session::start(display, &Config::default(), ":0".to_string()).unwrap()
}

/// Dispatch everything the fake server has queued
pub fn run_pending(session: &mut Session<FakeDisplay>) {
    while session.step().unwrap() == Step::Dispatched {}
}
