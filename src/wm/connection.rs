//! X11 Connection
//!
//! [`Display`] over an x11rb `RustConnection`. Events are pulled off the wire
//! into a local queue so the core can look ahead for pending destroys and
//! unmaps.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::ErrorKind;
use x11rb::protocol::xproto::{
    AtomEnum, ButtonIndex, Char2b, ChangeGCAux, ChangeWindowAttributesAux, ClientMessageEvent,
    Colormap, ConfigureWindowAux, ConnectionExt as _, CreateGCAux, CreateWindowAux, EventMask,
    Gcontext, GrabMode, InputFocus, Keysym, MapState, ModMask, PropMode, SetMode, StackMode,
    Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, CURRENT_TIME, NONE};

use crate::wm::atoms::{Atoms, RESOURCE_MANAGER};
use crate::wm::client::WindowState;
use crate::wm::display::{Display, FontInfo, WindowAttributes, WindowSpec};
use crate::wm::error::StartupError;
use crate::wm::events::{EventKind, Restack, WindowChanges, WmEvent};

/// `PointerRoot` focus target
const POINTER_ROOT: Window = 1;

/// `InputHint` bit of `WM_HINTS.flags`
const INPUT_HINT: u32 = 1;

/// Longest text item `PolyText8` accepts
const TEXT_ITEM_MAX: usize = 254;

/// Keyboard mapping snapshot taken at connect time
#[derive(Debug, Default)]
struct Keymap {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    fn keysym(&self, keycode: u8) -> u32 {
        let Some(offset) = keycode.checked_sub(self.min_keycode) else {
            return 0;
        };
        self.keysyms
            .get(offset as usize * self.per_keycode)
            .copied()
            .unwrap_or(0)
    }

    fn keycodes(&self, keysym: u32) -> Vec<u8> {
        if self.per_keycode == 0 {
            return Vec::new();
        }
        self.keysyms
            .chunks(self.per_keycode)
            .enumerate()
            .filter(|(_, syms)| syms.contains(&keysym))
            .map(|(index, _)| self.min_keycode.wrapping_add(index as u8))
            .collect()
    }
}

/// Live X server connection
pub struct X11Display {
    conn: Arc<RustConnection>,
    root: Window,
    screen_size: (u16, u16),
    colormap: Colormap,
    gc: Gcontext,
    atoms: Atoms,
    keymap: Keymap,
    events: VecDeque<WmEvent>,
}

impl X11Display {
    /// Connect to `name` (or `$DISPLAY`)
    pub fn connect(name: Option<&str>) -> Result<Self> {
        let shown = name
            .map(str::to_string)
            .or_else(|| std::env::var("DISPLAY").ok())
            .unwrap_or_default();
        let (conn, screen_num) =
            x11rb::connect(name).map_err(|_| StartupError::NoDisplay(shown.clone()))?;
        let conn = Arc::new(conn);
        info!("Connected to X server {} (screen {})", shown, screen_num);

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let screen_size = (screen.width_in_pixels, screen.height_in_pixels);
        let colormap = screen.default_colormap;

        let gc = conn.generate_id()?;
        conn.create_gc(gc, root, &CreateGCAux::new().graphics_exposures(0))?;

        let atoms = Atoms::new(conn.as_ref())?;

        let setup = conn.setup();
        let count = setup.max_keycode - setup.min_keycode + 1;
        let mapping = conn
            .get_keyboard_mapping(setup.min_keycode, count)?
            .reply()
            .context("Failed to read the keyboard mapping")?;
        let keymap = Keymap {
            min_keycode: setup.min_keycode,
            per_keycode: mapping.keysyms_per_keycode as usize,
            keysyms: mapping.keysyms,
        };
        debug!("Keyboard mapping has {} keysyms per keycode", keymap.per_keycode);

        Ok(Self {
            conn,
            root,
            screen_size,
            colormap,
            gc,
            atoms,
            keymap,
            events: VecDeque::new(),
        })
    }

    /// Shared connection handle, for readiness polling
    pub fn connection(&self) -> Arc<RustConnection> {
        self.conn.clone()
    }

    /// Move whatever the server already sent into the local queue
    fn pull(&mut self) -> Result<()> {
        while let Some(event) = self.conn.poll_for_event()? {
            match WmEvent::from_x11(event, &self.atoms) {
                Some(event) => self.events.push_back(event),
                None => trace!("Ignoring uninteresting event"),
            }
        }
        Ok(())
    }

    fn property32(&self, window: Window, property: u32, kind: u32, length: u32) -> Result<Option<Vec<u32>>> {
        let reply = absent(self.conn.get_property(false, window, property, kind, 0, length)?.reply())?;
        Ok(reply.and_then(|reply| reply.value32().map(Iterator::collect)))
    }

    /// Whether `window` accepts focus via `SetInputFocus`, and whether it
    /// wants `WM_TAKE_FOCUS`
    fn focus_model(&self, window: Window) -> Result<(bool, bool)> {
        let hints = self.property32(window, AtomEnum::WM_HINTS.into(), AtomEnum::WM_HINTS.into(), 2)?;
        let input = match hints.as_deref() {
            Some([flags, input, ..]) if flags & INPUT_HINT != 0 => *input != 0,
            _ => true,
        };
        let protocols = self
            .property32(window, self.atoms.wm_protocols, AtomEnum::ATOM.into(), 32)?
            .unwrap_or_default();
        Ok((input, protocols.contains(&self.atoms.wm_take_focus)))
    }
}

/// Errors against a window that no longer exists become `None`
fn absent<T>(result: Result<T, ReplyError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ReplyError::X11Error(error)) => {
            trace!("Request failed: {:?}", error.error_kind);
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}

fn stack_mode(restack: Restack) -> StackMode {
    match restack {
        Restack::Above => StackMode::ABOVE,
        Restack::Below => StackMode::BELOW,
        Restack::Other(mode) => StackMode::from(mode as u8),
    }
}

impl Display for X11Display {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> (u16, u16) {
        self.screen_size
    }

    fn select_root_events(&mut self) -> Result<()> {
        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE;
        let result = self
            .conn
            .change_window_attributes(self.root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check();
        match result {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(error)) if error.error_kind == ErrorKind::Access => {
                Err(StartupError::OtherWindowManager.into())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn grab_server(&mut self) -> Result<()> {
        self.conn.grab_server()?;
        Ok(())
    }

    fn ungrab_server(&mut self) -> Result<()> {
        self.conn.ungrab_server()?;
        self.conn.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        self.pull()
    }

    fn discard_pending(&mut self) -> Result<usize> {
        self.sync()?;
        let dropped = self.events.len();
        self.events.clear();
        Ok(dropped)
    }

    fn poll_event(&mut self) -> Result<Option<WmEvent>> {
        if self.events.is_empty() {
            self.pull()?;
        }
        Ok(self.events.pop_front())
    }

    fn take_pending(&mut self, window: Window, kind: EventKind) -> Option<WmEvent> {
        if let Err(e) = self.pull() {
            warn!("Failed to read pending events: {}", e);
        }
        let index = self
            .events
            .iter()
            .position(|event| event.window() == window && event.kind() == kind)?;
        self.events.remove(index)
    }

    fn top_level_windows(&mut self) -> Result<Vec<Window>> {
        Ok(self.conn.query_tree(self.root)?.reply()?.children)
    }

    fn attributes(&mut self, window: Window) -> Result<Option<WindowAttributes>> {
        let reply = absent(self.conn.get_window_attributes(window)?.reply())?;
        Ok(reply.map(|attrs| WindowAttributes {
            override_redirect: attrs.override_redirect,
            mapped: attrs.map_state != MapState::UNMAPPED,
        }))
    }

    fn wm_state(&mut self, window: Window) -> Result<Option<u32>> {
        let values = self.property32(window, self.atoms.wm_state, self.atoms.wm_state, 2)?;
        Ok(values.and_then(|values| values.first().copied()))
    }

    fn set_wm_state(&mut self, window: Window, state: WindowState) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.wm_state,
            self.atoms.wm_state,
            &[state.code(), NONE],
        )?;
        Ok(())
    }

    fn window_title(&mut self, window: Window) -> Result<Option<String>> {
        let reply = absent(
            self.conn
                .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::ANY, 0, 1024)?
                .reply(),
        )?;
        Ok(reply.and_then(|reply| {
            let title = String::from_utf8_lossy(&reply.value)
                .trim_end_matches('\0')
                .to_string();
            (!title.is_empty()).then_some(title)
        }))
    }

    fn resource_database(&mut self) -> Result<Option<String>> {
        let reply = self
            .conn
            .get_property(false, self.root, RESOURCE_MANAGER, AtomEnum::STRING, 0, u32::MAX / 4)?
            .reply()?;
        if reply.value.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()))
    }

    fn manage(&mut self, window: Window) -> Result<()> {
        let mask = EventMask::ENTER_WINDOW | EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE;
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        self.conn.change_save_set(SetMode::INSERT, window)?;
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().border_width(1))?;
        for button in [ButtonIndex::M1, ButtonIndex::M2, ButtonIndex::M3] {
            self.conn.grab_button(
                false,
                window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                NONE,
                button,
                ModMask::M1,
            )?;
        }
        debug!("Managing window {}", window);
        Ok(())
    }

    fn release(&mut self, window: Window) -> Result<()> {
        self.conn
            .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
        )?;
        self.conn.reparent_window(window, self.root, 0, 0)?;
        self.conn.change_save_set(SetMode::DELETE, window)?;
        self.conn.map_window(window)?;
        Ok(())
    }

    fn map(&mut self, window: Window) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap(&mut self, window: Window) -> Result<()> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn destroy_window(&mut self, window: Window) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn configure(&mut self, window: Window, changes: &WindowChanges) -> Result<()> {
        let aux = ConfigureWindowAux::new()
            .x(changes.x)
            .y(changes.y)
            .width(changes.width)
            .height(changes.height)
            .border_width(changes.border_width)
            .sibling(changes.sibling)
            .stack_mode(changes.stack_mode.map(stack_mode));
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn restack(&mut self, top_to_bottom: &[Window]) -> Result<()> {
        let Some((&top, rest)) = top_to_bottom.split_first() else {
            return Ok(());
        };
        self.raise(top)?;
        let mut above = top;
        for &window in rest {
            self.conn.configure_window(
                window,
                &ConfigureWindowAux::new().sibling(above).stack_mode(StackMode::BELOW),
            )?;
            above = window;
        }
        Ok(())
    }

    fn raise(&mut self, window: Window) -> Result<()> {
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))?;
        Ok(())
    }

    fn set_input_focus(&mut self, window: Window) -> Result<bool> {
        let viewable = absent(self.conn.get_window_attributes(window)?.reply())?
            .is_some_and(|attrs| attrs.map_state == MapState::VIEWABLE);
        if !viewable {
            return Ok(false);
        }

        let (input, take_focus) = self.focus_model(window)?;
        if !input && !take_focus {
            return Ok(false);
        }
        if input {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME)?;
        }
        if take_focus {
            let message = ClientMessageEvent::new(
                32,
                window,
                self.atoms.wm_protocols,
                [self.atoms.wm_take_focus, CURRENT_TIME, 0, 0, 0],
            );
            self.conn
                .send_event(false, window, EventMask::NO_EVENT, message)?;
        }
        Ok(true)
    }

    fn focus_root(&mut self) -> Result<()> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, POINTER_ROOT, CURRENT_TIME)?;
        Ok(())
    }

    fn set_border(&mut self, window: Window, pixel: u32) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(pixel),
        )?;
        Ok(())
    }

    fn set_background(&mut self, window: Window, pixel: u32) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().background_pixel(pixel),
        )?;
        self.conn.clear_area(true, window, 0, 0, 0, 0)?;
        Ok(())
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<Window> {
        let window = self.conn.generate_id()?;
        let events = EventMask::EXPOSURE
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            spec.parent.unwrap_or(self.root),
            spec.rect.x,
            spec.rect.y,
            spec.rect.width.max(1),
            spec.rect.height.max(1),
            spec.border_width,
            WindowClass::INPUT_OUTPUT,
            COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(spec.background)
                .border_pixel(spec.border)
                .override_redirect(u32::from(spec.override_redirect))
                .event_mask(events),
        )?;
        if let Some(title) = &spec.title {
            self.conn.change_property8(
                PropMode::REPLACE,
                window,
                AtomEnum::WM_NAME,
                AtomEnum::STRING,
                title.as_bytes(),
            )?;
        }
        trace!("Created helper window {}", window);
        Ok(window)
    }

    fn move_window(&mut self, window: Window, x: i16, y: i16) -> Result<()> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().x(i32::from(x)).y(i32::from(y)),
        )?;
        Ok(())
    }

    fn resize_window(&mut self, window: Window, width: u16, height: u16) -> Result<()> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .width(u32::from(width.max(1)))
                .height(u32::from(height.max(1))),
        )?;
        Ok(())
    }

    fn clear(&mut self, window: Window) -> Result<()> {
        self.conn.clear_area(false, window, 0, 0, 0, 0)?;
        Ok(())
    }

    fn draw_text(
        &mut self,
        window: Window,
        font: &FontInfo,
        pixel: u32,
        x: i16,
        y: i16,
        text: &str,
    ) -> Result<()> {
        self.conn
            .change_gc(self.gc, &ChangeGCAux::new().foreground(pixel).font(font.id))?;
        let mut items = Vec::with_capacity(text.len() + 2);
        for chunk in text.as_bytes().chunks(TEXT_ITEM_MAX) {
            items.push(chunk.len() as u8);
            items.push(0);
            items.extend_from_slice(chunk);
        }
        if !items.is_empty() {
            self.conn.poly_text8(window, self.gc, x, y, &items)?;
        }
        Ok(())
    }

    fn text_width(&mut self, font: &FontInfo, text: &str) -> Result<u16> {
        let chars: Vec<Char2b> = text
            .bytes()
            .map(|byte| Char2b { byte1: 0, byte2: byte })
            .collect();
        let reply = self.conn.query_text_extents(font.id, &chars)?.reply()?;
        Ok(reply.overall_width.clamp(0, i32::from(u16::MAX)) as u16)
    }

    fn load_font(&mut self, name: &str) -> Result<Option<FontInfo>> {
        let id = self.conn.generate_id()?;
        if let Err(e) = self.conn.open_font(id, name.as_bytes())?.check() {
            debug!("Font {:?} not available: {:?}", name, e);
            return Ok(None);
        }
        let reply = self.conn.query_font(id)?.reply()?;
        Ok(Some(FontInfo {
            id,
            ascent: reply.font_ascent,
            descent: reply.font_descent,
        }))
    }

    fn free_font(&mut self, font: &FontInfo) -> Result<()> {
        self.conn.close_font(font.id)?;
        Ok(())
    }

    fn lookup_color(&mut self, name: &str) -> Result<Option<u32>> {
        let name = name.trim();
        if let Some(hex) = name.strip_prefix('#') {
            let Some(rgb) = (hex.len() == 6)
                .then(|| u32::from_str_radix(hex, 16).ok())
                .flatten()
            else {
                return Ok(None);
            };
            let channel = |shift: u32| ((rgb >> shift) & 0xff) as u16 * 257;
            let reply = absent(
                self.conn
                    .alloc_color(self.colormap, channel(16), channel(8), channel(0))?
                    .reply(),
            )?;
            return Ok(reply.map(|reply| reply.pixel));
        }
        let reply = absent(
            self.conn
                .alloc_named_color(self.colormap, name.as_bytes())?
                .reply(),
        )?;
        Ok(reply.map(|reply| reply.pixel))
    }

    fn keysym(&mut self, keycode: u8) -> u32 {
        self.keymap.keysym(keycode)
    }

    fn grab_key(&mut self, keysym: u32, modifiers: u16) -> Result<()> {
        let keycodes = self.keymap.keycodes(keysym);
        if keycodes.is_empty() {
            warn!("No keycode produces keysym 0x{:x}, binding skipped", keysym);
        }
        for keycode in keycodes {
            self.conn.grab_key(
                true,
                self.root,
                ModMask::from(modifiers),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
