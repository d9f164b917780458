//! Event Dispatcher
//!
//! Routes each event by kind and target handle to the object that owns the
//! handle, or applies a default action when nobody does.

use anyhow::Result;
use tracing::{debug, trace};
use x11rb::protocol::xproto::Window;

use crate::wm::atoms::{RESOURCE_MANAGER, WM_NAME};
use crate::wm::client::WindowState;
use crate::wm::dialog::DialogChoice;
use crate::wm::display::Display;
use crate::wm::events::{EventKind, Restack, WindowChanges, WmEvent};
use crate::wm::keyboard::{KeyAction, modifier};
use crate::wm::menu::{MenuCommand, MenuId};
use crate::wm::registry::{Category, ObjectRef};
use crate::wm::session::Session;
use crate::wm::style::Orientation;

impl<D: Display> Session<D> {
    /// Handle one event to completion
    pub fn dispatch(&mut self, event: WmEvent) -> Result<()> {
        trace!("Dispatching {:?}", event);
        let root = self.display.root();
        match event {
            WmEvent::ButtonPress {
                window,
                button,
                state,
                x: _,
                y,
                root_x,
                root_y,
            } => {
                self.buttons.press(button);
                self.button_press(window, button, state, y, root_x, root_y)
            }
            WmEvent::ButtonRelease { window, button, y, .. } => {
                self.buttons.release(button);
                self.button_release(window, button, y)
            }
            WmEvent::ConfigureRequest { window, changes } => self.configure_request(window, changes),
            WmEvent::MapRequest { window } => self.map_request(window),
            WmEvent::MapNotify { window } => {
                trace!("Window {} mapped", window);
                Ok(())
            }
            // Only the root's substructure copy counts, so a window that also
            // reports its own structure changes is not handled twice
            WmEvent::UnmapNotify { event, window } if event == root => self.unmap_notify(window),
            WmEvent::DestroyNotify { event, window } if event == root => self.destroy_notify(window),
            WmEvent::UnmapNotify { window, .. } | WmEvent::DestroyNotify { window, .. } => {
                trace!("Ignoring structure notification reported on {}", window);
                Ok(())
            }
            WmEvent::PropertyNotify {
                window,
                atom,
                deleted,
            } => self.property_notify(window, atom, deleted),
            WmEvent::EnterNotify { window } => self.enter_notify(window),
            WmEvent::LeaveNotify { window } => {
                if let Some(ObjectRef::Icon(client)) = self.lookup(window, Category::Icon)? {
                    self.highlight_icon(client, false)?;
                }
                Ok(())
            }
            WmEvent::Expose { window, count } => {
                if count == 0 {
                    self.expose(window)?;
                }
                Ok(())
            }
            WmEvent::FocusIn { window } => {
                if let Some(ObjectRef::Client(client)) = self.lookup(window, Category::Window)? {
                    self.set_focus_flag(client)?;
                }
                Ok(())
            }
            WmEvent::FocusOut {
                window,
                normal,
                ancestor,
            } => self.focus_out(window, normal, ancestor),
            WmEvent::KeyPress { keycode, state, .. } => self.key_press(keycode, state),
            WmEvent::ChangeState { window, state } => self.change_state(window, state),
        }
    }

    fn button_press(
        &mut self,
        window: Window,
        button: u8,
        state: u16,
        y: i16,
        root_x: i16,
        root_y: i16,
    ) -> Result<()> {
        if let Some(choice) = self.dialog.choice_for(window) {
            return self.answer_dialog(choice);
        }

        match self.route(window)? {
            Some(ObjectRef::Client(client)) if state & modifier::MOD1 != 0 => match button {
                1 => {
                    self.workspaces.raise_window(&mut self.display, client)?;
                    self.focus_window(client)?;
                }
                2 if client != self.dialog.window => {
                    self.popup_window_menu(client, root_x, root_y)?;
                }
                3 => {
                    self.workspaces.lower_window(&mut self.display, client)?;
                }
                _ => {}
            },
            Some(ObjectRef::Menu(id)) => {
                let pressed = self.menus.get(id).and_then(|menu| menu.item_at(y));
                if let Some(menu) = self.menus.get_mut(id) {
                    menu.pressed = pressed;
                }
                self.menus.draw(&mut self.display, &self.resources, id)?;
            }
            Some(_) => {}
            None if window == self.display.root() => match button {
                1 => self.hide_menus()?,
                2 => {
                    if let Some(id) = self.workspaces.current().menu {
                        self.popup_menu(id, root_x, root_y)?;
                    }
                }
                3 => self.popup_menu(self.root_menu, root_x, root_y)?,
                _ => {}
            },
            None => {}
        }
        Ok(())
    }

    fn button_release(&mut self, window: Window, button: u8, y: i16) -> Result<()> {
        match self.route(window)? {
            Some(ObjectRef::Icon(client)) => {
                self.deiconify(client)?;
            }
            Some(ObjectRef::Menu(id)) => {
                let chosen = self.menus.get(id).and_then(|menu| menu.item_at(y));
                if let Some(menu) = self.menus.get_mut(id) {
                    menu.pressed = None;
                }
                self.menus.draw(&mut self.display, &self.resources, id)?;
                if let Some(index) = chosen {
                    self.choose_item(id, index)?;
                }
            }
            Some(ObjectRef::Indicator) => {
                let (next, previous) = match self.resources.orientation {
                    Orientation::RightHanded => (1, 3),
                    Orientation::LeftHanded => (3, 1),
                };
                let current = self.workspaces.current_index() as i64;
                if button == next {
                    self.change_workspace(current + 1)?;
                } else if button == previous {
                    self.change_workspace(current - 1)?;
                }
            }
            Some(ObjectRef::Client(_)) | None => {}
        }
        Ok(())
    }

    /// Act on item `index` of menu `id`
    fn choose_item(&mut self, id: MenuId, index: usize) -> Result<()> {
        let Some(item) = self.menus.get(id).and_then(|menu| menu.items.get(index)).cloned() else {
            return Ok(());
        };
        debug!("Menu {:?} item {:?} chosen", id, item.label);

        match item.command {
            MenuCommand::Submenu(child) => {
                self.menus
                    .toggle_submenu(&mut self.display, &self.resources, id, index, child)
            }
            MenuCommand::Action(action) => {
                let root = self.menus.root_of(id);
                self.menus.hide(&mut self.display, root)?;
                self.perform(action)
            }
            MenuCommand::Focus(window) => {
                let root = self.menus.root_of(id);
                self.menus.hide(&mut self.display, root)?;
                self.activate(window)
            }
            MenuCommand::Window(client, command) => {
                let root = self.menus.root_of(id);
                self.menus.hide(&mut self.display, root)?;
                self.window_command(client, command)
            }
        }
    }

    fn popup_menu(&mut self, id: MenuId, root_x: i16, root_y: i16) -> Result<()> {
        let Some(menu) = self.menus.get(id) else {
            return Ok(());
        };
        if menu.visible {
            return Ok(());
        }
        let x = root_x - (menu.width / 2) as i16;
        let y = root_y - (menu.row_height() / 2) as i16;
        self.menus.show(&mut self.display, id, x, y)?;
        self.menus.draw(&mut self.display, &self.resources, id)
    }

    fn hide_menus(&mut self) -> Result<()> {
        self.menus.hide(&mut self.display, self.root_menu)?;
        if let Some((id, _)) = self.window_menu {
            self.menus.hide(&mut self.display, id)?;
        }
        let workspace_menus: Vec<MenuId> = self.workspaces.iter().filter_map(|ws| ws.menu).collect();
        for id in workspace_menus {
            self.menus.hide(&mut self.display, id)?;
        }
        Ok(())
    }

    fn configure_request(&mut self, window: Window, changes: WindowChanges) -> Result<()> {
        match self.lookup(window, Category::Window)? {
            Some(ObjectRef::Client(client)) => {
                let geometry = changes.geometry_only();
                if geometry != WindowChanges::default() {
                    self.display.configure(client, &geometry)?;
                }
                match changes.stack_mode {
                    Some(Restack::Above) => {
                        self.workspaces.raise_window(&mut self.display, client)?;
                    }
                    Some(Restack::Below) => {
                        self.workspaces.lower_window(&mut self.display, client)?;
                    }
                    _ => {}
                }
            }
            _ => {
                // Not managed yet: honour the request as asked, minus borders
                let passthrough = WindowChanges {
                    border_width: changes.border_width.map(|_| 0),
                    ..changes
                };
                trace!("Passing configure request for {} through", window);
                self.display.configure(window, &passthrough)?;
            }
        }
        Ok(())
    }

    fn map_request(&mut self, window: Window) -> Result<()> {
        match self.lookup(window, Category::Window)? {
            Some(ObjectRef::Client(client)) => {
                let state = self.clients.get(&client).map(|c| c.state);
                match state {
                    Some(WindowState::Withdrawn) => {
                        let current = self.workspaces.current_index();
                        if let Some(c) = self.clients.get_mut(&client) {
                            c.workspace = current;
                        }
                        self.deiconify(client)?;
                        let index = self.workspaces.workspace_of(client).unwrap_or(current);
                        self.rebuild_workspace_menu(index)?;
                    }
                    Some(WindowState::Iconic) => self.deiconify(client)?,
                    Some(WindowState::Normal) => {
                        let mapped = self.clients.get(&client).is_some_and(|c| c.mapped);
                        let on_current = self.workspaces.workspace_of(client)
                            == Some(self.workspaces.current_index());
                        if !mapped && on_current {
                            if let Some(c) = self.clients.get_mut(&client) {
                                c.mapped = true;
                            }
                            self.display.map(client)?;
                        }
                    }
                    None => {}
                }
            }
            _ => match self.display.attributes(window)? {
                Some(attributes) if attributes.override_redirect => self.display.map(window)?,
                Some(_) => self.adopt(window)?,
                None => debug!("Map request for vanished window {}", window),
            },
        }
        Ok(())
    }

    fn unmap_notify(&mut self, window: Window) -> Result<()> {
        let Some(ObjectRef::Client(client)) = self.lookup(window, Category::Window)? else {
            return Ok(());
        };
        let Some(state) = self.clients.get_mut(&client) else {
            return Ok(());
        };
        if state.take_pending_unmap() {
            trace!("Ignoring our own unmap of {}", client);
            return Ok(());
        }
        state.mapped = false;
        if state.state == WindowState::Withdrawn {
            return Ok(());
        }
        self.withdraw(client)
    }

    /// A client asked to change its own state; only iconification is defined
    fn change_state(&mut self, window: Window, state: u32) -> Result<()> {
        let Some(ObjectRef::Client(client)) = self.lookup(window, Category::Window)? else {
            return Ok(());
        };
        if client == self.dialog.window {
            return Ok(());
        }
        let normal = self.clients.get(&client).is_some_and(|c| c.is_normal());
        if state == WindowState::Iconic.code() && normal {
            debug!("Window {} asked to be iconified", client);
            return self.iconify(client);
        }
        trace!("Ignoring state change {} for {}", state, client);
        Ok(())
    }

    fn property_notify(&mut self, window: Window, atom: u32, deleted: bool) -> Result<()> {
        if deleted {
            return Ok(());
        }
        if window == self.display.root() && atom == RESOURCE_MANAGER {
            return self.request_dialog();
        }
        if atom != WM_NAME {
            return Ok(());
        }

        let Some(ObjectRef::Client(client)) = self.lookup(window, Category::Window)? else {
            return Ok(());
        };
        let title = self.display.window_title(client)?.unwrap_or_default();
        let workspace = match self.clients.get_mut(&client) {
            Some(c) => {
                c.title = title;
                c.workspace
            }
            None => return Ok(()),
        };
        self.draw_icon(client)?;
        if self.workspaces.workspace_of(client).is_some() {
            self.rebuild_workspace_menu(workspace)?;
        }
        Ok(())
    }

    /// Focus follows the pointer onto managed windows, unless the window is
    /// already on its way out
    fn enter_notify(&mut self, window: Window) -> Result<()> {
        match self.route(window)? {
            Some(ObjectRef::Client(client)) => {
                self.display.grab_server()?;
                let result = self.enter_client(client);
                let ungrab = self.display.ungrab_server();
                result?;
                ungrab
            }
            Some(ObjectRef::Icon(client)) => self.highlight_icon(client, true),
            _ => Ok(()),
        }
    }

    fn enter_client(&mut self, client: Window) -> Result<()> {
        self.display.sync()?;
        if let Some(destroy) = self.display.take_pending(client, EventKind::DestroyNotify) {
            return self.dispatch(destroy);
        }
        if let Some(unmap) = self.display.take_pending(client, EventKind::UnmapNotify) {
            return self.dispatch(unmap);
        }

        let visible = self.clients.get(&client).is_some_and(|c| c.is_normal() && c.mapped);
        if self.focus.focused() != Some(client) && visible {
            self.focus_window(client)?;
        }
        Ok(())
    }

    fn focus_out(&mut self, window: Window, normal: bool, ancestor: bool) -> Result<()> {
        if !normal {
            return Ok(());
        }
        if let Some(ObjectRef::Client(client)) = self.lookup(window, Category::Window)? {
            self.clear_focus_flag(client)?;
        }
        if ancestor {
            self.display.focus_root()?;
            if let Some(previous) = self.focus.clear_all(&mut self.clients) {
                self.apply_border(previous)?;
            }
        }
        Ok(())
    }

    fn key_press(&mut self, keycode: u8, state: u16) -> Result<()> {
        let keysym = self.display.keysym(keycode);
        let Some(action) = self.keys.lookup(keysym, state) else {
            return Ok(());
        };
        debug!("Key action {:?}", action);
        let current = self.workspaces.current_index() as i64;
        match action {
            KeyAction::CycleFocus => self.cycle_focus(),
            KeyAction::PreviousWorkspace => self.change_workspace(current - 1),
            KeyAction::NextWorkspace => self.change_workspace(current + 1),
        }
    }

    fn expose(&mut self, window: Window) -> Result<()> {
        if self.dialog.owns(window) {
            return self.dialog.draw(&mut self.display, &self.resources, window);
        }
        match self.route(window)? {
            Some(ObjectRef::Menu(id)) => self.menus.draw(&mut self.display, &self.resources, id),
            Some(ObjectRef::Indicator) => {
                self.workspaces.draw_indicator(&mut self.display, &self.resources)
            }
            Some(ObjectRef::Icon(client)) => self.draw_icon(client),
            Some(ObjectRef::Client(_)) | None => Ok(()),
        }
    }

    /// Root style preferences changed: offer to apply them
    pub fn request_dialog(&mut self) -> Result<()> {
        let dialog = self.dialog.window;
        let current = self.workspaces.current_index();

        if !self.dialog.visible {
            if let Some(client) = self.clients.get_mut(&dialog) {
                client.workspace = current;
            }
            self.workspaces.current_mut().add(dialog);
            self.deiconify(dialog)?;
            self.workspaces.raise_window(&mut self.display, dialog)?;
            self.dialog.visible = true;
            self.dialog.redraw(&mut self.display, &self.resources)?;
            debug!("Showing reconfigure dialog on workspace {}", current);
        } else {
            self.send_to_workspace(dialog, current)?;
            self.workspaces.raise_window(&mut self.display, dialog)?;
            debug!("Re-raising reconfigure dialog on workspace {}", current);
        }
        Ok(())
    }

    /// Hide the dialog, then reconfigure if the answer was yes
    pub fn answer_dialog(&mut self, choice: DialogChoice) -> Result<()> {
        let dialog = self.dialog.window;
        if let Some(client) = self.clients.get_mut(&dialog) {
            client.state = WindowState::Withdrawn;
            if client.mapped {
                client.mapped = false;
                client.pending_unmaps += 1;
                self.display.unmap(dialog)?;
            }
        }
        if let Some(index) = self.workspaces.workspace_of(dialog) {
            if let Some(ws) = self.workspaces.get_mut(index) {
                ws.remove(dialog);
            }
        }
        self.display.set_wm_state(dialog, WindowState::Withdrawn)?;
        self.focus.forget(dialog);
        self.dialog.visible = false;
        debug!("Reconfigure dialog answered {:?}", choice);

        match choice {
            DialogChoice::Yes => self.reconfigure(),
            DialogChoice::No => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::keyboard::keysym;
    use crate::wm::menu::WindowCommand;
    use crate::wm::testing::{FakeDisplay, FakeWindow, run_pending, start_session};

    const ROOT: Window = 1;

    fn session_with(windows: &[Window]) -> Session<FakeDisplay> {
        let mut display = FakeDisplay::new();
        for &window in windows {
            display.add_window(window, FakeWindow::mapped());
        }
        start_session(display)
    }

    fn root_resource_change(session: &mut Session<FakeDisplay>) {
        let root = session.display.root();
        session
            .dispatch(WmEvent::PropertyNotify {
                window: root,
                atom: RESOURCE_MANAGER,
                deleted: false,
            })
            .unwrap();
    }

    #[test]
    fn test_map_request_adopts_new_window() {
        let mut session = session_with(&[]);
        session.display.add_window(60, FakeWindow::unmapped());
        session.dispatch(WmEvent::MapRequest { window: 60 }).unwrap();

        assert!(session.registry.contains(60, Category::Window));
        assert_eq!(session.clients[&60].state, WindowState::Normal);
        assert!(session.display.mapped(60));
        assert_eq!(session.focus.focused(), None);
    }

    #[test]
    fn test_map_request_override_redirect_passes_through() {
        let mut session = session_with(&[]);
        session
            .display
            .add_window(61, FakeWindow::unmapped().override_redirect());
        session.dispatch(WmEvent::MapRequest { window: 61 }).unwrap();
        assert!(!session.registry.contains(61, Category::Window));
        assert!(session.display.mapped(61));
    }

    #[test]
    fn test_configure_request_unmanaged_passthrough() {
        let mut session = session_with(&[]);
        let changes = WindowChanges {
            width: Some(300),
            border_width: Some(5),
            ..Default::default()
        };
        session
            .dispatch(WmEvent::ConfigureRequest { window: 70, changes })
            .unwrap();
        assert_eq!(
            session.display.last_configure(70),
            Some(WindowChanges {
                width: Some(300),
                border_width: Some(0),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_configure_request_managed_restacks() {
        let mut session = session_with(&[71, 72]);
        let changes = WindowChanges {
            stack_mode: Some(Restack::Above),
            ..Default::default()
        };
        session
            .dispatch(WmEvent::ConfigureRequest { window: 71, changes })
            .unwrap();
        assert_eq!(session.workspaces.current().stacking()[0], 71);
        assert_eq!(session.display.last_configure(71), None);
    }

    fn unmap(window: Window) -> WmEvent {
        WmEvent::UnmapNotify { event: ROOT, window }
    }

    fn destroy(window: Window) -> WmEvent {
        WmEvent::DestroyNotify { event: ROOT, window }
    }

    #[test]
    fn test_own_unmaps_are_not_withdrawals() {
        let mut session = session_with(&[80]);
        session.iconify(80).unwrap();
        run_pending(&mut session);
        assert_eq!(session.clients[&80].state, WindowState::Iconic);
        assert_eq!(session.clients[&80].pending_unmaps, 0);

        session.deiconify(80).unwrap();
        session.dispatch(unmap(80)).unwrap();
        assert_eq!(session.clients[&80].state, WindowState::Withdrawn);

        // Mapping again brings it back on the current workspace
        session.dispatch(WmEvent::MapRequest { window: 80 }).unwrap();
        assert_eq!(session.clients[&80].state, WindowState::Normal);
        assert_eq!(session.workspaces.workspace_of(80), Some(0));
    }

    #[test]
    fn test_structure_copy_of_unmap_is_ignored() {
        let mut session = session_with(&[81]);
        session.iconify(81).unwrap();
        session.dispatch(WmEvent::UnmapNotify { event: 81, window: 81 }).unwrap();
        run_pending(&mut session);

        assert_eq!(session.clients[&81].state, WindowState::Iconic);
        assert_eq!(session.workspaces.workspace_of(81), Some(0));
        assert_eq!(session.clients[&81].pending_unmaps, 0);

        session.dispatch(WmEvent::DestroyNotify { event: 81, window: 81 }).unwrap();
        assert!(session.registry.contains(81, Category::Window));
        session.dispatch(destroy(81)).unwrap();
        assert!(!session.registry.contains(81, Category::Window));
    }

    #[test]
    fn test_workspace_switch_keeps_windows_managed() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 2\n".into());
        display.add_window(82, FakeWindow::mapped());
        display.add_window(83, FakeWindow::mapped());
        let mut session = start_session(display);
        session.iconify(83).unwrap();
        run_pending(&mut session);

        session.change_workspace(1).unwrap();
        run_pending(&mut session);
        assert_eq!(session.clients[&82].state, WindowState::Normal);
        assert_eq!(session.clients[&83].state, WindowState::Iconic);
        assert_eq!(session.workspaces.workspace_of(82), Some(0));
        assert_eq!(session.workspaces.workspace_of(83), Some(0));
        assert!(!session.display.mapped(82));

        session.change_workspace(0).unwrap();
        run_pending(&mut session);
        assert!(session.display.mapped(82));
        assert_eq!(session.clients[&82].pending_unmaps, 0);
    }

    #[test]
    fn test_change_state_message_iconifies() {
        let mut session = session_with(&[84, 85]);
        session.focus_window(84).unwrap();

        session.dispatch(WmEvent::ChangeState { window: 84, state: 3 }).unwrap();
        run_pending(&mut session);
        assert_eq!(session.clients[&84].state, WindowState::Iconic);
        assert!(session.clients[&84].icon.is_some());
        assert_eq!(session.workspaces.workspace_of(84), Some(0));
        assert_eq!(session.focus.focused(), None);

        // Only IconicState is honoured
        session.dispatch(WmEvent::ChangeState { window: 85, state: 1 }).unwrap();
        assert_eq!(session.clients[&85].state, WindowState::Normal);
    }

    #[test]
    fn test_send_to_workspace_moves_and_hides() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 3\n".into());
        display.add_window(86, FakeWindow::mapped());
        let mut session = start_session(display);
        session.focus_window(86).unwrap();

        session.send_to_workspace(86, 2).unwrap();
        run_pending(&mut session);
        assert_eq!(session.workspaces.workspace_of(86), Some(2));
        assert_eq!(session.clients[&86].workspace, 2);
        assert_eq!(session.clients[&86].state, WindowState::Normal);
        assert!(!session.display.mapped(86));
        assert_eq!(session.focus.focused(), None);
        let menu = session.workspaces.get(2).unwrap().menu.unwrap();
        assert_eq!(session.menus.get(menu).unwrap().items.len(), 1);

        session.change_workspace(2).unwrap();
        assert!(session.display.mapped(86));

        // Out of range targets are ignored
        session.send_to_workspace(86, 7).unwrap();
        assert_eq!(session.workspaces.workspace_of(86), Some(2));
    }

    #[test]
    fn test_window_menu_sends_to_workspace() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 2\n".into());
        display.add_window(87, FakeWindow::mapped());
        let mut session = start_session(display);

        session
            .dispatch(WmEvent::ButtonPress {
                window: 87,
                button: 2,
                state: modifier::MOD1,
                x: 5,
                y: 5,
                root_x: 300,
                root_y: 300,
            })
            .unwrap();
        let (menu, target) = session.window_menu.unwrap();
        assert_eq!(target, 87);
        assert!(session.menus.get(menu).unwrap().visible);

        // Open "Send To", then choose the second workspace
        let row = session.menus.get(menu).unwrap().row_height() as i16;
        let window = session.menus.get(menu).unwrap().window;
        let release = |window, y| WmEvent::ButtonRelease {
            window,
            button: 1,
            x: 5,
            y,
        };
        session.dispatch(release(window, row + 1)).unwrap();
        let submenu = session.menus.get(menu).unwrap().open_child.unwrap();
        assert_eq!(
            session.menus.get(submenu).unwrap().items[1].command,
            MenuCommand::Window(87, WindowCommand::SendTo(1))
        );
        let sub_window = session.menus.get(submenu).unwrap().window;
        session.dispatch(release(sub_window, 2 * row + 1)).unwrap();

        assert_eq!(session.workspaces.workspace_of(87), Some(1));
        assert!(!session.menus.get(menu).unwrap().visible);
        assert!(!session.menus.get(submenu).unwrap().visible);

        // Destroying the client takes its window menu along
        session.dispatch(destroy(87)).unwrap();
        assert_eq!(session.window_menu, None);
        assert!(!session.registry.contains(window, Category::Menu));
    }

    #[test]
    fn test_menu_with_pending_destroy_is_not_dispatched() {
        let mut session = session_with(&[]);
        let menu = session.root_menu;
        let window = session.menus.get(menu).unwrap().window;
        session.menus.show(&mut session.display, menu, 10, 10).unwrap();
        let row = session.menus.get(menu).unwrap().row_height() as i16;
        session.display.push_event(destroy(window));

        // Would pick Exit from the fallback menu if dispatched
        session
            .dispatch(WmEvent::ButtonRelease {
                window,
                button: 3,
                x: 5,
                y: 2 * row + 1,
            })
            .unwrap();
        assert!(!session.registry.contains(window, Category::Menu));
        assert_eq!(session.phase(), &crate::wm::session::Phase::Running);
        assert_eq!(session.display.queued(), 0);
    }

    #[test]
    fn test_destroy_is_processed_before_enter() {
        let mut session = session_with(&[90]);
        session.display.push_event(destroy(90));

        session.dispatch(WmEvent::EnterNotify { window: 90 }).unwrap();
        assert!(!session.registry.contains(90, Category::Window));
        assert!(!session.display.focus_requests().contains(&90));
        assert_eq!(session.display.queued(), 0);
        assert!(session.lookup(90, Category::Window).unwrap().is_none());
    }

    #[test]
    fn test_destroy_is_processed_before_unrelated_event() {
        let mut session = session_with(&[91]);
        session.display.push_event(destroy(91));

        let changes = WindowChanges {
            x: Some(10),
            ..Default::default()
        };
        session
            .dispatch(WmEvent::ConfigureRequest { window: 91, changes })
            .unwrap();
        assert!(!session.clients.contains_key(&91));
        assert_eq!(session.lookup(91, Category::Window).unwrap(), None);
    }

    #[test]
    fn test_enter_focuses_visible_window() {
        let mut session = session_with(&[92]);
        session.dispatch(WmEvent::EnterNotify { window: 92 }).unwrap();
        assert_eq!(session.focus.focused(), Some(92));
        assert!(!session.display.server_grabbed());
    }

    #[test]
    fn test_enter_with_pending_unmap_withdraws_instead() {
        let mut session = session_with(&[93]);
        session.display.inject_after_sync(unmap(93));
        session.dispatch(WmEvent::EnterNotify { window: 93 }).unwrap();
        assert_eq!(session.clients[&93].state, WindowState::Withdrawn);
        assert_eq!(session.focus.focused(), None);
    }

    #[test]
    fn test_dialog_shown_then_reraised() {
        let mut session = session_with(&[]);
        let dialog = session.dialog.window;

        root_resource_change(&mut session);
        assert!(session.dialog.visible);
        assert_eq!(session.workspaces.workspace_of(dialog), Some(0));
        assert_eq!(session.workspaces.current().stacking()[0], dialog);
        assert!(session.display.mapped(dialog));
        let maps = session.display.map_count(dialog);

        root_resource_change(&mut session);
        assert!(session.dialog.visible);
        assert_eq!(session.workspaces.workspace_of(dialog), Some(0));
        assert_eq!(session.display.map_count(dialog), maps);
    }

    #[test]
    fn test_dialog_follows_to_current_workspace() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 2\n".into());
        let mut session = start_session(display);
        let dialog = session.dialog.window;

        root_resource_change(&mut session);
        session.change_workspace(1).unwrap();
        root_resource_change(&mut session);

        assert!(session.dialog.visible);
        assert_eq!(session.workspaces.workspace_of(dialog), Some(1));
        assert_eq!(session.workspaces.current_index(), 1);
        assert!(session.display.mapped(dialog));
    }

    #[test]
    fn test_dialog_no_hides_without_reconfiguring() {
        let mut session = session_with(&[]);
        root_resource_change(&mut session);
        session.store.set("window.focusColor", "red");

        session.answer_dialog(DialogChoice::No).unwrap();
        assert!(!session.dialog.visible);
        assert_eq!(session.workspaces.workspace_of(session.dialog.window), None);
        assert_eq!(session.store.get("window.focusColor"), "red");

        root_resource_change(&mut session);
        session.answer_dialog(DialogChoice::Yes).unwrap();
        assert!(!session.dialog.visible);
        assert_eq!(session.store.get("window.focusColor"), "darkgrey");
    }

    #[test]
    fn test_key_bindings_switch_and_wrap() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 3\n".into());
        let mut session = start_session(display);
        let left = session.display.keycode_for(keysym::LEFT);
        let right = session.display.keycode_for(keysym::RIGHT);

        let press = |keycode| WmEvent::KeyPress {
            window: 1,
            keycode,
            state: modifier::CONTROL,
        };
        session.dispatch(press(left)).unwrap();
        assert_eq!(session.workspaces.current_index(), 2);
        session.dispatch(press(right)).unwrap();
        assert_eq!(session.workspaces.current_index(), 0);
        session.dispatch(press(right)).unwrap();
        assert_eq!(session.workspaces.current_index(), 1);
    }

    #[test]
    fn test_alt_tab_cycles() {
        let mut session = session_with(&[100, 101]);
        session.focus_window(100).unwrap();
        let tab = session.display.keycode_for(keysym::TAB);
        session
            .dispatch(WmEvent::KeyPress {
                window: 1,
                keycode: tab,
                state: modifier::MOD1,
            })
            .unwrap();
        assert_eq!(session.focus.focused(), Some(101));
        assert_eq!(session.workspaces.current().stacking()[0], 101);
    }

    #[test]
    fn test_focus_events() {
        let mut session = session_with(&[110, 111]);
        session.dispatch(WmEvent::FocusIn { window: 110 }).unwrap();
        session.dispatch(WmEvent::FocusIn { window: 111 }).unwrap();
        assert!(!session.clients[&110].focused);
        assert!(session.clients[&111].focused);

        session
            .dispatch(WmEvent::FocusOut {
                window: 111,
                normal: true,
                ancestor: true,
            })
            .unwrap();
        assert_eq!(session.focus.focused(), None);
        assert!(session.display.focused_root());
    }

    #[test]
    fn test_title_change_updates_menu() {
        let mut session = session_with(&[120]);
        session.display.set_title(120, "editor");
        session
            .dispatch(WmEvent::PropertyNotify {
                window: 120,
                atom: WM_NAME,
                deleted: false,
            })
            .unwrap();
        assert_eq!(session.clients[&120].title, "editor");
        let menu = session.workspaces.current().menu.unwrap();
        assert_eq!(session.menus.get(menu).unwrap().items[0].label, "editor");
    }

    #[test]
    fn test_root_menu_popup_and_action() {
        let mut session = session_with(&[130]);
        let root = session.display.root();
        session
            .dispatch(WmEvent::ButtonPress {
                window: root,
                button: 3,
                state: 0,
                x: 200,
                y: 200,
                root_x: 200,
                root_y: 200,
            })
            .unwrap();
        let menu = session.root_menu;
        assert!(session.menus.get(menu).unwrap().visible);

        // Fallback menu: Restart, Exit
        let row = session.menus.get(menu).unwrap().row_height() as i16;
        let window = session.menus.get(menu).unwrap().window;
        session
            .dispatch(WmEvent::ButtonRelease {
                window,
                button: 3,
                x: 5,
                y: 2 * row + 1,
            })
            .unwrap();
        assert!(!session.menus.get(menu).unwrap().visible);
        assert!(matches!(session.phase(), crate::wm::session::Phase::Stopping(_)));
        assert!(session.buttons.is_empty());
    }

    #[test]
    fn test_icon_click_deiconifies() {
        let mut session = session_with(&[140]);
        session.iconify(140).unwrap();
        let icon = session.clients[&140].icon.unwrap().window;

        session.dispatch(WmEvent::EnterNotify { window: icon }).unwrap();
        assert!(session.clients[&140].icon.unwrap().highlighted);

        session
            .dispatch(WmEvent::ButtonRelease {
                window: icon,
                button: 1,
                x: 1,
                y: 1,
            })
            .unwrap();
        assert_eq!(session.clients[&140].state, WindowState::Normal);
        assert!(!session.registry.contains(icon, Category::Icon));
    }

    #[test]
    fn test_indicator_buttons_switch_workspaces() {
        let mut display = FakeDisplay::new();
        display.resource_database = Some("umbra.session.workspaces: 2\n".into());
        let mut session = start_session(display);
        let indicator = session.workspaces.indicator.window;

        session
            .dispatch(WmEvent::ButtonRelease {
                window: indicator,
                button: 1,
                x: 0,
                y: 0,
            })
            .unwrap();
        assert_eq!(session.workspaces.current_index(), 1);
        session
            .dispatch(WmEvent::ButtonRelease {
                window: indicator,
                button: 3,
                x: 0,
                y: 0,
            })
            .unwrap();
        assert_eq!(session.workspaces.current_index(), 0);
    }
}
