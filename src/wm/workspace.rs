//! Workspace Module
//!
//! Virtual desktops: membership and stacking per workspace, switching, and
//! the workspace indicator strip with its clock.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::{debug, info, trace};
use x11rb::protocol::xproto::Window;

use crate::wm::client::{Client, WindowState};
use crate::wm::display::{Display, Rect, WindowSpec};
use crate::wm::events::{Restack, WindowChanges};
use crate::wm::menu::MenuId;
use crate::wm::style::Resources;

/// One virtual desktop
#[derive(Debug)]
pub struct Workspace {
    pub id: usize,
    pub name: String,
    /// Membership order, used for focus cycling and the window menu
    windows: Vec<Window>,
    /// Stacking order, topmost first
    stacking: Vec<Window>,
    /// Window list menu
    pub menu: Option<MenuId>,
}

impl Workspace {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: format!("Workspace {}", id + 1),
            windows: Vec::new(),
            stacking: Vec::new(),
            menu: None,
        }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn stacking(&self) -> &[Window] {
        &self.stacking
    }

    pub fn contains(&self, window: Window) -> bool {
        self.windows.contains(&window)
    }

    /// Append `window` to the membership and put it on top of the stack
    pub fn add(&mut self, window: Window) -> bool {
        if self.contains(window) {
            return false;
        }
        self.windows.push(window);
        self.stacking.insert(0, window);
        true
    }

    pub fn remove(&mut self, window: Window) -> bool {
        let before = self.windows.len();
        self.windows.retain(|&w| w != window);
        self.stacking.retain(|&w| w != window);
        self.windows.len() != before
    }

    fn restack_top(&mut self, window: Window) -> bool {
        if !self.contains(window) {
            return false;
        }
        self.stacking.retain(|&w| w != window);
        self.stacking.insert(0, window);
        true
    }

    fn restack_bottom(&mut self, window: Window) -> bool {
        if !self.contains(window) {
            return false;
        }
        self.stacking.retain(|&w| w != window);
        self.stacking.push(window);
        true
    }
}

/// Bottom strip showing the current workspace and the time
#[derive(Debug)]
pub struct Indicator {
    pub window: Window,
    pub rect: Rect,
    /// `HH:MM` currently drawn
    clock: String,
}

impl Indicator {
    pub fn create<D: Display>(display: &mut D, resources: &Resources) -> Result<Self> {
        let (screen_width, screen_height) = display.screen_size();
        let height = resources.title_font.line_height();
        let width = (screen_width / 3).max(1);
        let rect = Rect::new(
            0,
            screen_height.saturating_sub(height + 2) as i16,
            width,
            height,
        );
        let window = display.create_window(&WindowSpec {
            parent: None,
            rect,
            border_width: 1,
            background: resources.toolbox.colors.from,
            border: resources.frame,
            override_redirect: true,
            title: Some("umbra indicator".to_string()),
        })?;
        display.map(window)?;

        Ok(Self {
            window,
            rect,
            clock: String::new(),
        })
    }

    pub fn clock(&self) -> &str {
        &self.clock
    }

    /// Remember the minute shown for `now`; true when it changed
    fn update_clock(&mut self, now: &DateTime<Local>) -> bool {
        let text = now.format("%H:%M").to_string();
        if text == self.clock {
            return false;
        }
        self.clock = text;
        true
    }

    pub fn draw<D: Display>(&self, display: &mut D, resources: &Resources, name: &str) -> Result<()> {
        let font = &resources.title_font;
        let baseline = font.ascent + 3;
        let pixel = resources.toolbox.text;
        display.clear(self.window)?;
        display.draw_text(self.window, font, pixel, 4, baseline, name)?;
        let clock_x = self.rect.width.saturating_sub(48) as i16;
        display.draw_text(self.window, font, pixel, clock_x, baseline, self.clock())?;
        Ok(())
    }
}

/// Workspace manager
#[derive(Debug)]
pub struct WorkspaceManager {
    workspaces: Vec<Workspace>,
    /// Current workspace index (0-based)
    current: usize,
    pub indicator: Indicator,
}

impl WorkspaceManager {
    /// Create `count` workspaces (at least one) and the indicator
    pub fn new<D: Display>(display: &mut D, resources: &Resources, count: usize) -> Result<Self> {
        let indicator = Indicator::create(display, resources)?;
        let workspaces = (0..count.max(1)).map(Workspace::new).collect();
        info!("Created {} workspace(s)", count.max(1));
        Ok(Self {
            workspaces,
            current: 0,
            indicator,
        })
    }

    pub fn count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Workspace {
        &self.workspaces[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Workspace {
        &mut self.workspaces[self.current]
    }

    pub fn get(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Workspace> {
        self.workspaces.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    /// Index of the workspace `window` is a member of
    pub fn workspace_of(&self, window: Window) -> Option<usize> {
        self.workspaces.iter().position(|ws| ws.contains(window))
    }

    /// Wrap any requested index into `[0, count)`
    pub fn wrap_index(&self, requested: i64) -> usize {
        requested.rem_euclid(self.count() as i64) as usize
    }

    /// Switch to workspace `requested` (wrapped into range).
    ///
    /// The old workspace's windows and icons are unmapped without being
    /// released, the new one's are mapped and restacked. Returns whether the
    /// current workspace changed.
    pub fn change_workspace<D: Display>(
        &mut self,
        display: &mut D,
        clients: &mut HashMap<Window, Client>,
        requested: i64,
    ) -> Result<bool> {
        let target = self.wrap_index(requested);
        if target == self.current {
            debug!("Already on workspace {}", target);
            return Ok(false);
        }

        info!("Switching from workspace {} to {}", self.current, target);
        let old = self.current;
        for &window in self.workspaces[old].windows() {
            let Some(client) = clients.get_mut(&window) else {
                continue;
            };
            match client.state {
                WindowState::Normal if client.mapped => {
                    client.pending_unmaps += 1;
                    client.mapped = false;
                    display.unmap(window)?;
                }
                WindowState::Iconic => {
                    if let Some(icon) = client.icon {
                        display.unmap(icon.window)?;
                    }
                }
                WindowState::Normal | WindowState::Withdrawn => {}
            }
        }

        self.current = target;
        for &window in self.workspaces[target].windows() {
            let Some(client) = clients.get_mut(&window) else {
                continue;
            };
            match client.state {
                WindowState::Normal => {
                    client.mapped = true;
                    display.map(window)?;
                }
                WindowState::Iconic => {
                    if let Some(icon) = client.icon {
                        display.map(icon.window)?;
                    }
                }
                WindowState::Withdrawn => {}
            }
        }

        self.stack_windows(display)?;
        Ok(true)
    }

    /// Raise `window` within its workspace; only meaningful on the current one
    pub fn raise_window<D: Display>(&mut self, display: &mut D, window: Window) -> Result<bool> {
        if self.workspace_of(window) != Some(self.current) {
            trace!("Not raising {}: not on the current workspace", window);
            return Ok(false);
        }
        self.current_mut().restack_top(window);
        display.raise(window)?;
        display.raise(self.indicator.window)?;
        Ok(true)
    }

    /// Lower `window` within its workspace; only meaningful on the current one
    pub fn lower_window<D: Display>(&mut self, display: &mut D, window: Window) -> Result<bool> {
        if self.workspace_of(window) != Some(self.current) {
            trace!("Not lowering {}: not on the current workspace", window);
            return Ok(false);
        }
        self.current_mut().restack_bottom(window);
        display.configure(
            window,
            &WindowChanges {
                stack_mode: Some(Restack::Below),
                ..Default::default()
            },
        )?;
        Ok(true)
    }

    /// Re-apply the current workspace's full stacking order
    pub fn stack_windows<D: Display>(&self, display: &mut D) -> Result<()> {
        let order = self.current().stacking();
        if !order.is_empty() {
            display.restack(order)?;
        }
        display.raise(self.indicator.window)?;
        Ok(())
    }

    /// Idle tick: redraw the indicator when the displayed minute changes
    pub fn check_clock<D: Display>(
        &mut self,
        display: &mut D,
        resources: &Resources,
        now: DateTime<Local>,
    ) -> Result<bool> {
        if !self.indicator.update_clock(&now) {
            return Ok(false);
        }
        self.draw_indicator(display, resources)?;
        Ok(true)
    }

    pub fn draw_indicator<D: Display>(&self, display: &mut D, resources: &Resources) -> Result<()> {
        self.indicator.draw(display, resources, &self.current().name)
    }

    /// Resize the workspace set.
    ///
    /// Windows of removed workspaces join the last remaining one; the current
    /// index is clamped. Returns the removed workspaces so their menus can be
    /// destroyed.
    pub fn set_count(&mut self, count: usize) -> Vec<Workspace> {
        let count = count.max(1);
        let mut removed = Vec::new();
        if count < self.workspaces.len() {
            removed.extend(self.workspaces.drain(count..));
            if let Some(last) = self.workspaces.last_mut() {
                for &window in removed.iter().flat_map(|ws| ws.windows()) {
                    last.add(window);
                }
            }
        } else {
            while self.workspaces.len() < count {
                let id = self.workspaces.len();
                self.workspaces.push(Workspace::new(id));
            }
        }
        if self.current >= count {
            self.current = count - 1;
        }
        info!("Workspace count is now {}", count);
        removed
    }
}
