//! Session Module
//!
//! Top-level owner of the window manager state: the display, the registry,
//! every client, the workspaces, menus and the reconfigure dialog. Startup,
//! the per-iteration step, shutdown, restart and live reconfiguration live
//! here; window lifecycle and event routing are in `lifecycle.rs` and
//! `dispatch.rs`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use bitflags::bitflags;
use chrono::Local;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::config::Config;
use crate::wm::client::Client;
use crate::wm::dialog::{DIALOG_TITLE, ReconfigureDialog};
use crate::wm::display::Display;
use crate::wm::error::StartupError;
use crate::wm::focus::FocusTracker;
use crate::wm::keyboard::KeyBindings;
use crate::wm::menu::{MenuCommand, MenuId, MenuItem, Menus, WindowCommand};
use crate::wm::menu_file::{MenuAction, load_menu};
use crate::wm::registry::{Category, Lookup, ObjectRef, Registry};
use crate::wm::style::{Resources, StyleStore};
use crate::wm::workspace::WorkspaceManager;

bitflags! {
    /// Pointer buttons currently held down
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointerButtons: u8 {
        const BUTTON1 = 1 << 0;
        const BUTTON2 = 1 << 1;
        const BUTTON3 = 1 << 2;
    }
}

impl PointerButtons {
    fn for_button(button: u8) -> Self {
        match button {
            1 => Self::BUTTON1,
            2 => Self::BUTTON2,
            3 => Self::BUTTON3,
            _ => Self::empty(),
        }
    }

    pub fn press(&mut self, button: u8) {
        self.insert(Self::for_button(button));
    }

    pub fn release(&mut self, button: u8) {
        self.remove(Self::for_button(button));
    }
}

/// How the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Exit,
    /// Re-execute ourselves, or run the given command in our place
    Restart(Option<String>),
}

/// Session phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    /// Event dispatch is paused while resources are rebuilt
    Reconfiguring,
    Stopping(SessionEnd),
}

/// Result of one main-loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Dispatched,
    /// Nothing to dispatch; the caller should wait for input
    Idle,
    Finished(SessionEnd),
}

/// Window manager session
pub struct Session<D: Display> {
    pub(crate) display: D,
    /// Value handed to spawned commands as `DISPLAY`
    pub(crate) display_name: String,
    pub(crate) store: StyleStore,
    pub(crate) resources: Resources,
    pub(crate) registry: Registry,
    pub(crate) clients: HashMap<Window, Client>,
    pub(crate) workspaces: WorkspaceManager,
    pub(crate) menus: Menus,
    pub(crate) root_menu: MenuId,
    /// Window menu currently built, with the client it acts on
    pub(crate) window_menu: Option<(MenuId, Window)>,
    pub(crate) dialog: ReconfigureDialog,
    pub(crate) keys: KeyBindings,
    pub(crate) buttons: PointerButtons,
    pub(crate) focus: FocusTracker,
    pub(crate) phase: Phase,
}

impl<D: Display> Session<D> {
    /// Take over the display and adopt every window already on it
    pub fn start(mut display: D, config: &Config, display_name: String) -> Result<Self> {
        display
            .select_root_events()
            .context("Failed to select window management events on the root")?;
        info!("Acquired window management on {}", display_name);

        let mut store = StyleStore::new(config.style.clone());
        let database = display.resource_database()?;
        store.reload(database.as_deref());
        let resources = Resources::load(&mut display, &store)?;

        let keys = KeyBindings::new(
            &config.keybindings.cycle_modifier,
            &config.keybindings.workspace_modifier,
        );
        keys.grab(&mut display)?;

        let mut registry = Registry::new();
        let mut menus = Menus::new();
        let tree = load_menu(&store.menu_file());
        let root_menu = menus.build_tree(&mut display, &resources, &tree, None)?;
        for (window, id) in menus.windows(root_menu) {
            registry.register(window, ObjectRef::Menu(id));
        }

        let workspaces = WorkspaceManager::new(&mut display, &resources, store.workspaces())?;
        registry.register(workspaces.indicator.window, ObjectRef::Indicator);

        let dialog = ReconfigureDialog::create(&mut display, &resources)?;

        let mut session = Self {
            display,
            display_name,
            store,
            resources,
            registry,
            clients: HashMap::new(),
            workspaces,
            menus,
            root_menu,
            window_menu: None,
            dialog,
            keys,
            buttons: PointerButtons::empty(),
            focus: FocusTracker::new(),
            phase: Phase::Starting,
        };

        // The dialog is a client of our own that starts out withdrawn
        let dialog_window = session.dialog.window;
        session.display.manage(dialog_window)?;
        session
            .clients
            .insert(dialog_window, Client::new(dialog_window, 0, DIALOG_TITLE.to_string()));
        session.registry.register(dialog_window, ObjectRef::Client(dialog_window));

        session.rebuild_workspace_menus()?;
        session.workspaces.stack_windows(&mut session.display)?;
        session.adopt_existing()?;

        session.workspaces.check_clock(&mut session.display, &session.resources, Local::now())?;
        session.workspaces.draw_indicator(&mut session.display, &session.resources)?;
        session.display.flush()?;

        session.phase = Phase::Running;
        info!("Session started with {} managed window(s)", session.clients.len() - 1);
        Ok(session)
    }

    /// Adopt every mapped, non override-redirect top-level window
    fn adopt_existing(&mut self) -> Result<()> {
        self.display.grab_server()?;
        let windows = self.display.top_level_windows()?;
        for window in windows {
            if self.is_own_window(window) {
                continue;
            }
            match self.display.attributes(window)? {
                Some(attributes) if !attributes.override_redirect && attributes.mapped => {
                    self.adopt(window)?;
                }
                Some(_) => {}
                None => debug!("Window {} vanished before adoption", window),
            }
        }

        // Startup generated a burst of events against half-built state
        let dropped = self.display.discard_pending()?;
        debug!("Discarded {} startup event(s)", dropped);
        // The unmaps adoption expected were part of that burst
        for client in self.clients.values_mut() {
            client.pending_unmaps = 0;
        }
        self.display.ungrab_server()?;
        Ok(())
    }

    fn is_own_window(&self, window: Window) -> bool {
        self.dialog.owns(window)
            || window == self.workspaces.indicator.window
            || self.registry.contains(window, Category::Menu)
            || self.registry.contains(window, Category::Icon)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Dispatch at most one queued event
    pub fn step(&mut self) -> Result<Step> {
        match &self.phase {
            Phase::Stopping(end) => return Ok(Step::Finished(end.clone())),
            Phase::Reconfiguring => return Ok(Step::Idle),
            Phase::Starting | Phase::Running => {}
        }

        match self.display.poll_event()? {
            Some(event) => {
                self.dispatch(event)?;
                if let Phase::Stopping(end) = &self.phase {
                    return Ok(Step::Finished(end.clone()));
                }
                Ok(Step::Dispatched)
            }
            None => Ok(Step::Idle),
        }
    }

    /// Idle tick from the main loop
    pub fn idle(&mut self) -> Result<()> {
        self.workspaces
            .check_clock(&mut self.display, &self.resources, Local::now())?;
        self.display.flush()
    }

    /// Resolve `window` in `category`, processing a queued destroy first
    pub(crate) fn lookup(&mut self, window: Window, category: Category) -> Result<Option<ObjectRef>> {
        match self.registry.resolve(&mut self.display, window, category) {
            Lookup::Found(object) => Ok(Some(object)),
            Lookup::PendingDestroy(event) => {
                self.destroy_notify(event.window())?;
                Ok(None)
            }
            Lookup::NotFound => Ok(None),
        }
    }

    /// Resolve `window` in every category, clients first
    pub(crate) fn route(&mut self, window: Window) -> Result<Option<ObjectRef>> {
        for category in [
            Category::Window,
            Category::Icon,
            Category::Menu,
            Category::Indicator,
        ] {
            if let Some(object) = self.lookup(window, category)? {
                return Ok(Some(object));
            }
        }
        Ok(None)
    }

    /// Switch workspaces, wrapping `requested` into range
    pub fn change_workspace(&mut self, requested: i64) -> Result<()> {
        if !self
            .workspaces
            .change_workspace(&mut self.display, &mut self.clients, requested)?
        {
            return Ok(());
        }

        let current = self.workspaces.current_index();
        if let Some(focused) = self.focus.focused() {
            if self.workspaces.workspace_of(focused) != Some(current) {
                self.display.focus_root()?;
                self.clear_focus_flag(focused)?;
            }
        }
        self.workspaces.draw_indicator(&mut self.display, &self.resources)?;
        Ok(())
    }

    /// Move `window` to workspace `index`, showing or hiding it to match.
    ///
    /// Withdrawn windows belong to no workspace and are left alone.
    pub fn send_to_workspace(&mut self, window: Window, index: usize) -> Result<()> {
        if index >= self.workspaces.count() {
            debug!("No workspace {} to send {} to", index, window);
            return Ok(());
        }
        let Some(old) = self.workspaces.workspace_of(window) else {
            return Ok(());
        };
        if old == index {
            return Ok(());
        }

        if let Some(ws) = self.workspaces.get_mut(old) {
            ws.remove(window);
        }
        if let Some(ws) = self.workspaces.get_mut(index) {
            ws.add(window);
        }
        self.sync_client_visibility(window)?;

        if index == self.workspaces.current_index() {
            self.workspaces.raise_window(&mut self.display, window)?;
        } else if self.focus.focused() == Some(window) {
            self.display.focus_root()?;
            self.clear_focus_flag(window)?;
        }
        self.rebuild_workspace_menu(old)?;
        self.rebuild_workspace_menu(index)?;
        info!("Sent window {} from workspace {} to {}", window, old, index);
        Ok(())
    }

    /// Build the window menu for `client` and pop it up at the pointer
    pub(crate) fn popup_window_menu(&mut self, client: Window, x: i16, y: i16) -> Result<()> {
        if let Some((id, _)) = self.window_menu.take() {
            self.destroy_menu(id)?;
        }
        let Some(title) = self.clients.get(&client).map(|c| c.display_title().to_string()) else {
            return Ok(());
        };

        let menu = self
            .menus
            .create(&mut self.display, &self.resources, &title, Vec::new(), None)?;
        let targets: Vec<MenuItem> = self
            .workspaces
            .iter()
            .map(|ws| {
                let command = MenuCommand::Window(client, WindowCommand::SendTo(ws.id));
                MenuItem::new(ws.name.clone(), command)
            })
            .collect();
        let send_to = self
            .menus
            .create(&mut self.display, &self.resources, "Send To", targets, Some(menu))?;
        let items = vec![
            MenuItem::new("Send To", MenuCommand::Submenu(send_to)),
            MenuItem::new("Iconify", MenuCommand::Window(client, WindowCommand::Iconify)),
            MenuItem::new("Raise", MenuCommand::Window(client, WindowCommand::Raise)),
            MenuItem::new("Lower", MenuCommand::Window(client, WindowCommand::Lower)),
        ];
        self.menus.set_items(&mut self.display, menu, items)?;
        for (window, id) in self.menus.windows(menu) {
            self.registry.register(window, ObjectRef::Menu(id));
        }
        self.window_menu = Some((menu, client));

        self.menus.show(&mut self.display, menu, x, y)?;
        self.menus.draw(&mut self.display, &self.resources, menu)
    }

    /// Drop the window menu if it acts on `client`
    pub(crate) fn forget_window_menu(&mut self, client: Window) -> Result<()> {
        match self.window_menu {
            Some((id, target)) if target == client => {
                self.window_menu = None;
                self.destroy_menu(id)
            }
            _ => Ok(()),
        }
    }

    /// Run a window menu operation
    pub(crate) fn window_command(&mut self, client: Window, command: WindowCommand) -> Result<()> {
        debug!("Window command {:?} on {}", command, client);
        match command {
            WindowCommand::Iconify => self.iconify(client),
            WindowCommand::Raise => {
                self.workspaces.raise_window(&mut self.display, client)?;
                Ok(())
            }
            WindowCommand::Lower => {
                self.workspaces.lower_window(&mut self.display, client)?;
                Ok(())
            }
            WindowCommand::SendTo(index) => self.send_to_workspace(client, index),
        }
    }

    /// Rebuild the window list menu of every workspace
    pub(crate) fn rebuild_workspace_menus(&mut self) -> Result<()> {
        for index in 0..self.workspaces.count() {
            self.rebuild_workspace_menu(index)?;
        }
        Ok(())
    }

    pub(crate) fn rebuild_workspace_menu(&mut self, index: usize) -> Result<()> {
        let Some(workspace) = self.workspaces.get(index) else {
            return Ok(());
        };
        let items: Vec<MenuItem> = workspace
            .windows()
            .iter()
            .filter_map(|window| self.clients.get(window))
            .map(|client| MenuItem::new(client.display_title(), MenuCommand::Focus(client.window)))
            .collect();
        let name = workspace.name.clone();
        let existing = workspace.menu;

        match existing {
            Some(id) if self.menus.get(id).is_some() => {
                self.menus.set_items(&mut self.display, id, items)?;
                self.menus.draw(&mut self.display, &self.resources, id)?;
            }
            _ => {
                let id = self
                    .menus
                    .create(&mut self.display, &self.resources, &name, items, None)?;
                let window = self.menus.get(id).map(|menu| menu.window);
                if let Some(window) = window {
                    self.registry.register(window, ObjectRef::Menu(id));
                }
                if let Some(workspace) = self.workspaces.get_mut(index) {
                    workspace.menu = Some(id);
                }
            }
        }
        Ok(())
    }

    /// Destroy a menu tree and drop its windows from the registry
    pub(crate) fn destroy_menu(&mut self, id: MenuId) -> Result<()> {
        for window in self.menus.destroy(&mut self.display, id)? {
            self.registry.unregister(window, Category::Menu);
        }
        Ok(())
    }

    /// Run a menu action
    pub fn perform(&mut self, action: MenuAction) -> Result<()> {
        info!("Menu action {:?}", action);
        match action {
            MenuAction::Execute(command) => {
                self.spawn(&command);
                Ok(())
            }
            MenuAction::Reconfigure => self.reconfigure(),
            MenuAction::Restart => self.restart(None),
            MenuAction::RestartOther(command) => self.restart(Some(command)),
            MenuAction::Shutdown => {
                self.shutdown();
                Ok(())
            }
            MenuAction::Exit => self.exit(),
        }
    }

    /// Launch `sh -c command` on our display without waiting for it
    fn spawn(&self, command: &str) {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.env("DISPLAY", &self.display_name);
        if let Ok(xauth) = std::env::var("XAUTHORITY") {
            cmd.env("XAUTHORITY", xauth);
        }
        match cmd.spawn() {
            Ok(child) => debug!("Launched {:?} as pid {}", command, child.id()),
            Err(e) => warn!("Failed to launch {:?}: {}", command, e),
        }
    }

    /// Stop the main loop; windows are dissociated on the way out
    pub fn shutdown(&mut self) {
        if !matches!(self.phase, Phase::Stopping(_)) {
            info!("Shutting down");
            self.phase = Phase::Stopping(SessionEnd::Exit);
        }
    }

    /// Return focus to the root, then shut down
    pub fn exit(&mut self) -> Result<()> {
        self.display.focus_root()?;
        self.shutdown();
        Ok(())
    }

    /// Dissociate every window and stop so the process can re-execute
    pub fn restart(&mut self, command: Option<String>) -> Result<()> {
        info!("Restarting ({:?})", command);
        self.dissociate()?;
        self.display.focus_root()?;
        self.phase = Phase::Stopping(SessionEnd::Restart(command));
        Ok(())
    }

    /// Hand every managed window back to the server in a clean state
    pub fn dissociate(&mut self) -> Result<()> {
        let windows: Vec<Window> = self.clients.keys().copied().collect();
        for window in windows {
            if window == self.dialog.window {
                continue;
            }
            if let Some(mut client) = self.clients.remove(&window) {
                if let Some(icon) = client.icon.take() {
                    self.registry.unregister(icon.window, Category::Icon);
                    self.display.destroy_window(icon.window)?;
                }
                self.registry.unregister(window, Category::Window);
                if let Some(index) = self.workspaces.workspace_of(window) {
                    if let Some(workspace) = self.workspaces.get_mut(index) {
                        workspace.remove(window);
                    }
                }
                self.display.release(window)?;
                debug!("Released window {} ({:?})", window, client.state);
            }
        }
        self.focus.clear_all(&mut self.clients);
        self.display.flush()?;
        info!("Dissociated all windows");
        Ok(())
    }

    /// Reload style preferences and rebuild everything derived from them.
    ///
    /// Skipped while the reconfigure dialog is up. A font that fails to load
    /// keeps the previous resources in use.
    pub fn reconfigure(&mut self) -> Result<()> {
        if self.dialog.visible {
            debug!("Reconfigure dialog is open, not reconfiguring");
            return Ok(());
        }

        self.phase = Phase::Reconfiguring;
        self.display.grab_server()?;
        let result = self.rebuild_resources();
        let ungrab = self.display.ungrab_server();
        if self.phase == Phase::Reconfiguring {
            self.phase = Phase::Running;
        }
        result?;
        ungrab
    }

    fn rebuild_resources(&mut self) -> Result<()> {
        info!("Reconfiguring");
        let database = self.display.resource_database()?;
        self.store.reload(database.as_deref());

        match Resources::load(&mut self.display, &self.store) {
            Ok(resources) => {
                let old = std::mem::replace(&mut self.resources, resources);
                old.release(&mut self.display)?;
            }
            Err(e) if e.downcast_ref::<StartupError>().is_some() => {
                warn!("{}; keeping the previous style", e);
            }
            Err(e) => return Err(e),
        }

        // Workspace set
        for removed in self.workspaces.set_count(self.store.workspaces()) {
            if !removed.windows().is_empty() {
                debug!("Windows {:?} moved off removed {}", removed.windows(), removed.name);
            }
            if let Some(id) = removed.menu {
                self.destroy_menu(id)?;
            }
        }
        self.sync_visibility()?;
        if let Some((id, _)) = self.window_menu.take() {
            self.destroy_menu(id)?;
        }

        // Root menu, keeping its place on screen
        let (was_visible, x, y) = self
            .menus
            .get(self.root_menu)
            .map(|menu| (menu.visible, menu.x, menu.y))
            .unwrap_or((false, 0, 0));
        self.destroy_menu(self.root_menu)?;
        let tree = load_menu(&self.store.menu_file());
        self.root_menu = self
            .menus
            .build_tree(&mut self.display, &self.resources, &tree, None)?;
        for (window, id) in self.menus.windows(self.root_menu) {
            self.registry.register(window, ObjectRef::Menu(id));
        }
        if was_visible {
            self.menus.show(&mut self.display, self.root_menu, x, y)?;
            self.menus.draw(&mut self.display, &self.resources, self.root_menu)?;
        }

        // Workspace menus are recreated with the new fonts
        let stale: Vec<MenuId> = self.workspaces.iter().filter_map(|ws| ws.menu).collect();
        for id in stale {
            self.destroy_menu(id)?;
        }
        for index in 0..self.workspaces.count() {
            if let Some(workspace) = self.workspaces.get_mut(index) {
                workspace.menu = None;
            }
        }
        self.rebuild_workspace_menus()?;

        // Decorations
        let windows: Vec<Window> = self.clients.keys().copied().collect();
        for window in windows {
            self.apply_border(window)?;
        }
        let indicator = self.workspaces.indicator.window;
        self.display
            .set_background(indicator, self.resources.toolbox.colors.from)?;
        self.workspaces.draw_indicator(&mut self.display, &self.resources)?;
        self.dialog.restyle(&mut self.display, &self.resources)?;

        self.workspaces.stack_windows(&mut self.display)?;
        Ok(())
    }

    /// Make every client's mapping match its workspace after membership moved
    fn sync_visibility(&mut self) -> Result<()> {
        let windows: Vec<Window> = self.clients.keys().copied().collect();
        for window in windows {
            self.sync_client_visibility(window)?;
        }
        Ok(())
    }

    /// Map `window` (or its icon) when its workspace is current, unmap it otherwise
    fn sync_client_visibility(&mut self, window: Window) -> Result<()> {
        let Some(index) = self.workspaces.workspace_of(window) else {
            return Ok(());
        };
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.workspace = index;
        let on_current = index == self.workspaces.current_index();
        if client.is_normal() {
            if on_current && !client.mapped {
                client.mapped = true;
                self.display.map(window)?;
            } else if !on_current && client.mapped {
                client.mapped = false;
                client.pending_unmaps += 1;
                self.display.unmap(window)?;
            }
        } else if let Some(icon) = client.icon {
            if on_current {
                self.display.map(icon.window)?;
            } else {
                self.display.unmap(icon.window)?;
            }
        }
        Ok(())
    }
}
