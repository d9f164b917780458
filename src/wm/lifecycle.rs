//! Window Lifecycle
//!
//! Adoption, iconify/deiconify, withdrawal and destruction of client windows,
//! plus the focus flag and the icons standing in for iconic windows.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::wm::client::{Client, Icon, WindowState};
use crate::wm::display::{Display, Rect, WindowSpec};
use crate::wm::focus::cycle_next;
use crate::wm::registry::{Category, ObjectRef};
use crate::wm::session::Session;

const ICON_WIDTH: u16 = 96;
const ICON_GAP: u16 = 4;

impl<D: Display> Session<D> {
    /// Bring `window` under management on the current workspace.
    ///
    /// The persisted `WM_STATE` decides whether it starts iconic; every other
    /// hint adopts it as Normal without giving it focus.
    pub fn adopt(&mut self, window: Window) -> Result<()> {
        if self.registry.contains(window, Category::Window) {
            debug!("Window {} is already managed", window);
            return Ok(());
        }
        let Some(attributes) = self.display.attributes(window)? else {
            warn!("Window {} vanished before it could be adopted", window);
            return Ok(());
        };

        let title = self.display.window_title(window)?.unwrap_or_default();
        let hint = self.display.wm_state(window)?;
        self.display.manage(window)?;

        let workspace = self.workspaces.current_index();
        let mut client = Client::new(window, workspace, title);
        client.mapped = attributes.mapped;
        self.clients.insert(window, client);
        self.registry.register(window, ObjectRef::Client(window));
        self.workspaces.current_mut().add(window);

        let initial = WindowState::initial_from_hint(hint);
        info!("Adopting window {} as {:?}", window, initial);
        match initial {
            WindowState::Iconic => self.iconify(window)?,
            _ => self.deiconify(window)?,
        }
        self.rebuild_workspace_menu(workspace)?;
        Ok(())
    }

    /// Show `window` as a normal window.
    ///
    /// A window that belongs to no workspace joins the current one. The icon
    /// goes away and the focus flag is cleared; the window is raised but does
    /// not take focus.
    pub fn deiconify(&mut self, window: Window) -> Result<()> {
        let current = self.workspaces.current_index();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };

        let workspace = match self.workspaces.workspace_of(window) {
            Some(index) => index,
            None => {
                self.workspaces.current_mut().add(window);
                current
            }
        };
        client.workspace = workspace;
        client.state = WindowState::Normal;
        let icon = client.icon.take();
        let show = workspace == current && !client.mapped;
        if show {
            client.mapped = true;
        }

        if let Some(icon) = icon {
            self.destroy_icon(icon)?;
        }
        if show {
            self.display.map(window)?;
        }
        self.display.set_wm_state(window, WindowState::Normal)?;
        self.clear_focus_flag(window)?;
        self.workspaces.raise_window(&mut self.display, window)?;
        debug!("Deiconified window {} on workspace {}", window, workspace);
        Ok(())
    }

    /// Replace `window` by an icon. It stays a member of its workspace.
    pub fn iconify(&mut self, window: Window) -> Result<()> {
        let current = self.workspaces.current_index();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.is_iconic() {
            return Ok(());
        }

        let was_mapped = client.mapped;
        if was_mapped {
            client.mapped = false;
            client.pending_unmaps += 1;
        }
        client.state = WindowState::Iconic;
        let title = client.display_title().to_string();
        let visible = client.workspace == current;

        if was_mapped {
            self.display.unmap(window)?;
        }
        self.display.set_wm_state(window, WindowState::Iconic)?;

        let icon = self.create_icon(&title, visible)?;
        self.registry.register(icon.window, ObjectRef::Icon(window));
        if let Some(client) = self.clients.get_mut(&window) {
            client.icon = Some(icon);
        }

        if self.focus.focused() == Some(window) {
            self.display.focus_root()?;
        }
        self.clear_focus_flag(window)?;
        debug!("Iconified window {}", window);
        Ok(())
    }

    /// The client unmapped itself: it leaves its workspace but stays known so
    /// a later map request brings it back
    pub fn withdraw(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.state = WindowState::Withdrawn;
        client.mapped = false;
        let icon = client.icon.take();
        if let Some(icon) = icon {
            self.destroy_icon(icon)?;
        }

        let workspace = self.workspaces.workspace_of(window);
        if let Some(index) = workspace {
            if let Some(ws) = self.workspaces.get_mut(index) {
                ws.remove(window);
            }
        }
        if self.focus.focused() == Some(window) {
            self.display.focus_root()?;
        }
        self.clear_focus_flag(window)?;
        self.forget_window_menu(window)?;
        self.display.set_wm_state(window, WindowState::Withdrawn)?;
        if let Some(index) = workspace {
            self.rebuild_workspace_menu(index)?;
        }
        info!("Window {} withdrew itself", window);
        Ok(())
    }

    /// The server destroyed `window`: forget it everywhere
    pub fn destroy_notify(&mut self, window: Window) -> Result<()> {
        self.registry.unregister_all(window);
        let Some(mut client) = self.clients.remove(&window) else {
            return Ok(());
        };
        if let Some(icon) = client.icon.take() {
            self.destroy_icon(icon)?;
        }

        let workspace = self.workspaces.workspace_of(window);
        if let Some(index) = workspace {
            if let Some(ws) = self.workspaces.get_mut(index) {
                ws.remove(window);
            }
        }
        self.focus.forget(window);
        self.forget_window_menu(window)?;
        if let Some(index) = workspace {
            self.rebuild_workspace_menu(index)?;
        }
        info!("Window {} destroyed", window);
        Ok(())
    }

    /// Ask the server to focus `window`; the flag moves only if it accepts
    pub fn focus_window(&mut self, window: Window) -> Result<bool> {
        if !self.display.set_input_focus(window)? {
            debug!("Window {} refused focus", window);
            return Ok(false);
        }
        self.set_focus_flag(window)?;
        Ok(true)
    }

    /// Give the focus flag to `window`, clearing the previous holder first
    pub fn set_focus_flag(&mut self, window: Window) -> Result<()> {
        let previous = self.focus.set(&mut self.clients, window);
        if let Some(previous) = previous {
            self.apply_border(previous)?;
        }
        self.apply_border(window)
    }

    pub fn clear_focus_flag(&mut self, window: Window) -> Result<()> {
        self.focus.clear(&mut self.clients, window);
        self.apply_border(window)
    }

    /// Paint the border of `window` for its focus state
    pub(crate) fn apply_border(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let style = self.resources.window_style(client.focused);
        self.display.set_border(window, style.colors.from)
    }

    /// Move focus to the next normal window of the current workspace
    pub fn cycle_focus(&mut self) -> Result<()> {
        let order = self.workspaces.current().windows().to_vec();
        let focused = self.focus.focused();
        let clients = &self.clients;
        let display = &mut self.display;
        let next = cycle_next(
            &order,
            focused,
            |w| clients.get(&w).is_some_and(Client::is_normal),
            |w| display.set_input_focus(w),
        )?;

        match next {
            Some(window) => {
                self.set_focus_flag(window)?;
                self.workspaces.raise_window(&mut self.display, window)?;
                debug!("Cycled focus to window {}", window);
            }
            None => debug!("No other window on this workspace takes focus"),
        }
        Ok(())
    }

    /// Bring a window forward from a workspace menu
    pub fn activate(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let workspace = client.workspace;
        let iconic = client.is_iconic();
        if workspace != self.workspaces.current_index() {
            self.change_workspace(workspace as i64)?;
        }
        if iconic {
            self.deiconify(window)?;
        }
        self.workspaces.raise_window(&mut self.display, window)?;
        self.focus_window(window)?;
        Ok(())
    }

    fn create_icon(&mut self, title: &str, visible: bool) -> Result<Icon> {
        let (_, screen_height) = self.display.screen_size();
        let font = self.resources.icon_font;
        let height = font.line_height();
        let slot = self.registry.len(Category::Icon) as u16;
        let x = (ICON_GAP + slot * (ICON_WIDTH + ICON_GAP)) as i16;
        let y = screen_height.saturating_sub(2 * (height + ICON_GAP) + self.resources.title_font.line_height()) as i16;

        let window = self.display.create_window(&WindowSpec {
            parent: None,
            rect: Rect::new(x, y, ICON_WIDTH, height),
            border_width: 1,
            background: self.resources.button.colors.from,
            border: self.resources.frame,
            override_redirect: true,
            title: Some(title.to_string()),
        })?;
        if visible {
            self.display.map(window)?;
        }
        Ok(Icon {
            window,
            highlighted: false,
        })
    }

    fn destroy_icon(&mut self, icon: Icon) -> Result<()> {
        self.registry.unregister(icon.window, Category::Icon);
        self.display.destroy_window(icon.window)
    }

    /// Redraw the icon of `client`
    pub(crate) fn draw_icon(&mut self, client: Window) -> Result<()> {
        let Some(client) = self.clients.get(&client) else {
            return Ok(());
        };
        let Some(icon) = client.icon else {
            return Ok(());
        };
        let font = self.resources.icon_font;
        let title = client.display_title().to_string();
        self.display.clear(icon.window)?;
        self.display
            .draw_text(icon.window, &font, self.resources.icon_text, 3, font.ascent + 3, &title)
    }

    /// Toggle the highlight border of the icon of `client`
    pub(crate) fn highlight_icon(&mut self, client: Window, highlighted: bool) -> Result<()> {
        let Some(icon) = self.clients.get_mut(&client).and_then(|c| c.icon.as_mut()) else {
            return Ok(());
        };
        if icon.highlighted == highlighted {
            return Ok(());
        }
        icon.highlighted = highlighted;
        let window = icon.window;
        let pixel = if highlighted {
            self.resources.focus.text
        } else {
            self.resources.frame
        };
        self.display.set_border(window, pixel)
    }
}
