//! Menu Module
//!
//! Popup menus: the root menu built from the menu description, one window
//! list per workspace and the per-window menu. Menus live in an arena and
//! refer to each other by [`MenuId`]; the registry maps their windows back to
//! those ids.

use anyhow::Result;
use tracing::{debug, trace};
use x11rb::protocol::xproto::Window;

use crate::wm::display::{Display, Rect, WindowSpec};
use crate::wm::menu_file::{MenuAction, MenuEntry, MenuTree};
use crate::wm::style::Resources;

/// Index of a menu in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuId(pub usize);

/// Operation offered by the window menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Iconify,
    Raise,
    Lower,
    /// Move the window to the workspace with this index
    SendTo(usize),
}

/// What choosing an item does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    Action(MenuAction),
    Submenu(MenuId),
    /// Bring a managed window forward (workspace window lists)
    Focus(Window),
    /// Apply a window menu operation to a managed window
    Window(Window, WindowCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    pub command: MenuCommand,
}

impl MenuItem {
    pub fn new(label: impl Into<String>, command: MenuCommand) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

/// One popup menu
#[derive(Debug)]
pub struct Menu {
    pub window: Window,
    pub title: String,
    pub items: Vec<MenuItem>,
    pub visible: bool,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    row_height: u16,
    pub parent: Option<MenuId>,
    /// Submenu currently shown next to this one
    pub open_child: Option<MenuId>,
    /// Item under a pressed button
    pub pressed: Option<usize>,
}

impl Menu {
    /// Title row plus one row per item
    pub fn height(&self) -> u16 {
        self.row_height.saturating_mul(self.items.len() as u16 + 1)
    }

    pub fn row_height(&self) -> u16 {
        self.row_height
    }

    /// Item under window-relative `y`; the title row has none
    pub fn item_at(&self, y: i16) -> Option<usize> {
        let row_height = i32::from(self.row_height.max(1));
        let row = i32::from(y) / row_height;
        if y < 0 || row == 0 {
            return None;
        }
        let index = (row - 1) as usize;
        (index < self.items.len()).then_some(index)
    }
}

/// Clamp a computed position into window coordinates
fn coordinate(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Arena of every menu in the session
#[derive(Debug, Default)]
pub struct Menus {
    slots: Vec<Option<Menu>>,
}

impl Menus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MenuId) -> Option<&Menu> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: MenuId) -> Option<&mut Menu> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Create a hidden menu window
    pub fn create<D: Display>(
        &mut self,
        display: &mut D,
        resources: &Resources,
        title: &str,
        items: Vec<MenuItem>,
        parent: Option<MenuId>,
    ) -> Result<MenuId> {
        let row_height = resources.menu_font.line_height();
        let width = resources.menu_width;
        let height = row_height.saturating_mul(items.len() as u16 + 1);
        let window = display.create_window(&WindowSpec {
            parent: None,
            rect: Rect::new(0, 0, width, height),
            border_width: 1,
            background: resources.menu.colors.from,
            border: resources.frame,
            override_redirect: true,
            title: Some(title.to_string()),
        })?;

        let menu = Menu {
            window,
            title: title.to_string(),
            items,
            visible: false,
            x: 0,
            y: 0,
            width,
            row_height,
            parent,
            open_child: None,
            pressed: None,
        };

        let id = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(menu);
                MenuId(free)
            }
            None => {
                self.slots.push(Some(menu));
                MenuId(self.slots.len() - 1)
            }
        };
        debug!("Created menu {:?} ({:?}) as window {}", id, title, window);
        Ok(id)
    }

    /// Build a menu and all its submenus from a parsed description
    pub fn build_tree<D: Display>(
        &mut self,
        display: &mut D,
        resources: &Resources,
        tree: &MenuTree,
        parent: Option<MenuId>,
    ) -> Result<MenuId> {
        let id = self.create(display, resources, &tree.label, Vec::new(), parent)?;
        let mut items = Vec::with_capacity(tree.entries.len());
        for entry in &tree.entries {
            match entry {
                MenuEntry::Item { label, action } => {
                    items.push(MenuItem::new(label.clone(), MenuCommand::Action(action.clone())));
                }
                MenuEntry::Submenu(sub) => {
                    let child = self.build_tree(display, resources, sub, Some(id))?;
                    items.push(MenuItem::new(sub.label.clone(), MenuCommand::Submenu(child)));
                }
            }
        }
        self.set_items(display, id, items)?;
        Ok(id)
    }

    /// Replace the items of a menu and resize its window
    pub fn set_items<D: Display>(
        &mut self,
        display: &mut D,
        id: MenuId,
        items: Vec<MenuItem>,
    ) -> Result<()> {
        if let Some(menu) = self.get_mut(id) {
            menu.items = items;
            menu.pressed = None;
            display.resize_window(menu.window, menu.width, menu.height())?;
        }
        Ok(())
    }

    /// Every window belonging to `id` and its submenus
    pub fn windows(&self, id: MenuId) -> Vec<(Window, MenuId)> {
        let mut out = Vec::new();
        self.collect(id, &mut out);
        out
    }

    fn collect(&self, id: MenuId, out: &mut Vec<(Window, MenuId)>) {
        if let Some(menu) = self.get(id) {
            out.push((menu.window, id));
            for item in &menu.items {
                if let MenuCommand::Submenu(child) = item.command {
                    self.collect(child, out);
                }
            }
        }
    }

    /// Destroy `id` and its submenus; returns the destroyed windows
    pub fn destroy<D: Display>(&mut self, display: &mut D, id: MenuId) -> Result<Vec<Window>> {
        let doomed = self.windows(id);
        for &(window, menu) in &doomed {
            display.destroy_window(window)?;
            if let Some(slot) = self.slots.get_mut(menu.0) {
                *slot = None;
            }
        }
        Ok(doomed.into_iter().map(|(window, _)| window).collect())
    }

    /// Map `id` at (x, y), clamped to the screen
    pub fn show<D: Display>(&mut self, display: &mut D, id: MenuId, x: i16, y: i16) -> Result<()> {
        let (screen_width, screen_height) = display.screen_size();
        if let Some(menu) = self.get_mut(id) {
            let max_x = screen_width.saturating_sub(menu.width + 2) as i16;
            let max_y = screen_height.saturating_sub(menu.height() + 2) as i16;
            menu.x = x.clamp(0, max_x.max(0));
            menu.y = y.clamp(0, max_y.max(0));
            menu.visible = true;
            display.move_window(menu.window, menu.x, menu.y)?;
            display.map(menu.window)?;
            display.raise(menu.window)?;
            trace!("Showing menu {:?} at ({}, {})", id, menu.x, menu.y);
        }
        Ok(())
    }

    /// Unmap `id` and any submenu opened from it
    pub fn hide<D: Display>(&mut self, display: &mut D, id: MenuId) -> Result<()> {
        let mut next = Some(id);
        while let Some(current) = next {
            next = None;
            if let Some(menu) = self.get_mut(current) {
                next = menu.open_child.take();
                menu.pressed = None;
                if menu.visible {
                    menu.visible = false;
                    display.unmap(menu.window)?;
                }
            }
        }
        Ok(())
    }

    /// Topmost ancestor of `id`
    pub fn root_of(&self, id: MenuId) -> MenuId {
        let mut current = id;
        while let Some(parent) = self.get(current).and_then(|menu| menu.parent) {
            current = parent;
        }
        current
    }

    /// Toggle the submenu `child` next to item `index` of `id`
    pub fn toggle_submenu<D: Display>(
        &mut self,
        display: &mut D,
        resources: &Resources,
        id: MenuId,
        index: usize,
        child: MenuId,
    ) -> Result<()> {
        let Some(menu) = self.get(id) else {
            return Ok(());
        };
        let previous = menu.open_child;
        let row = i32::try_from(index + 1).unwrap_or(i32::MAX);
        let x = coordinate(i32::from(menu.x) + i32::from(menu.width) + 1);
        let y = coordinate(
            i32::from(menu.y).saturating_add(i32::from(menu.row_height()).saturating_mul(row)),
        );

        if let Some(open) = previous {
            self.hide(display, open)?;
        }
        if let Some(menu) = self.get_mut(id) {
            menu.open_child = None;
        }
        if previous == Some(child) {
            return Ok(());
        }

        self.show(display, child, x, y)?;
        self.draw(display, resources, child)?;
        if let Some(menu) = self.get_mut(id) {
            menu.open_child = Some(child);
        }
        Ok(())
    }

    /// Redraw title and items
    pub fn draw<D: Display>(&self, display: &mut D, resources: &Resources, id: MenuId) -> Result<()> {
        let Some(menu) = self.get(id) else {
            return Ok(());
        };
        if !menu.visible {
            return Ok(());
        }

        let font = &resources.menu_font;
        let baseline = |row: usize| {
            let row = i32::try_from(row).unwrap_or(i32::MAX);
            coordinate(
                i32::from(menu.row_height)
                    .saturating_mul(row)
                    .saturating_add(i32::from(font.ascent) + 3),
            )
        };
        display.clear(menu.window)?;
        display.draw_text(menu.window, font, resources.menu.text, 4, baseline(0), &menu.title)?;
        for (index, item) in menu.items.iter().enumerate() {
            let pixel = if menu.pressed == Some(index) {
                resources.menu_item_pressed.text
            } else {
                resources.menu_item.text
            };
            let label = match item.command {
                MenuCommand::Submenu(_) => format!("{} >", item.label),
                _ => item.label.clone(),
            };
            display.draw_text(menu.window, font, pixel, 8, baseline(index + 1), &label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::style::StyleStore;
    use crate::wm::testing::FakeDisplay;
    use std::collections::HashMap;

    fn setup() -> (FakeDisplay, Resources) {
        let mut display = FakeDisplay::new();
        let resources = Resources::load(&mut display, &StyleStore::new(HashMap::new())).unwrap();
        (display, resources)
    }

    #[test]
    fn test_build_tree_links_submenus() {
        let (mut display, resources) = setup();
        let mut menus = Menus::new();
        let tree = MenuTree {
            label: "Root".into(),
            entries: vec![
                MenuEntry::Submenu(MenuTree {
                    label: "Apps".into(),
                    entries: vec![MenuEntry::Item {
                        label: "xterm".into(),
                        action: MenuAction::Execute("xterm".into()),
                    }],
                }),
                MenuEntry::Item {
                    label: "Exit".into(),
                    action: MenuAction::Exit,
                },
            ],
        };

        let root = menus.build_tree(&mut display, &resources, &tree, None).unwrap();
        let windows = menus.windows(root);
        assert_eq!(windows.len(), 2);

        let child = match menus.get(root).unwrap().items[0].command {
            MenuCommand::Submenu(child) => child,
            ref other => panic!("expected submenu, got {:?}", other),
        };
        assert_eq!(menus.root_of(child), root);

        let destroyed = menus.destroy(&mut display, root).unwrap();
        assert_eq!(destroyed.len(), 2);
        assert!(menus.get(root).is_none());
        assert!(menus.get(child).is_none());
    }

    #[test]
    fn test_item_hit_testing() {
        let (mut display, resources) = setup();
        let mut menus = Menus::new();
        let items = vec![
            MenuItem::new("a", MenuCommand::Action(MenuAction::Restart)),
            MenuItem::new("b", MenuCommand::Action(MenuAction::Exit)),
        ];
        let id = menus.create(&mut display, &resources, "T", items, None).unwrap();
        let menu = menus.get(id).unwrap();
        let row = menu.row_height() as i16;

        assert_eq!(menu.item_at(row / 2), None);
        assert_eq!(menu.item_at(row + 1), Some(0));
        assert_eq!(menu.item_at(2 * row + 1), Some(1));
        assert_eq!(menu.item_at(3 * row + 1), None);
        assert_eq!(menu.item_at(-4), None);
    }

    #[test]
    fn test_hide_closes_open_submenus() {
        let (mut display, resources) = setup();
        let mut menus = Menus::new();
        let child = menus.create(&mut display, &resources, "Child", Vec::new(), None).unwrap();
        let items = vec![MenuItem::new("sub", MenuCommand::Submenu(child))];
        let root = menus.create(&mut display, &resources, "Root", items, None).unwrap();

        menus.show(&mut display, root, 10, 10).unwrap();
        menus.toggle_submenu(&mut display, &resources, root, 0, child).unwrap();
        assert!(menus.get(child).unwrap().visible);

        menus.hide(&mut display, root).unwrap();
        assert!(!menus.get(root).unwrap().visible);
        assert!(!menus.get(child).unwrap().visible);
    }

    #[test]
    fn test_submenu_of_long_menu_stays_on_screen() {
        let (mut display, resources) = setup();
        let mut menus = Menus::new();
        let child = menus.create(&mut display, &resources, "Child", Vec::new(), None).unwrap();
        let mut items = vec![MenuItem::new("x", MenuCommand::Action(MenuAction::Exit)); 1999];
        items.push(MenuItem::new("sub", MenuCommand::Submenu(child)));
        let root = menus.create(&mut display, &resources, "Root", items, None).unwrap();

        menus.show(&mut display, root, 10, 10).unwrap();
        menus.toggle_submenu(&mut display, &resources, root, 1999, child).unwrap();

        let (_, screen_height) = display.screen_size();
        let submenu = menus.get(child).unwrap();
        assert!(submenu.visible);
        let lowest = (screen_height - submenu.height() - 2) as i16;
        assert_eq!(submenu.y, lowest);
        menus.draw(&mut display, &resources, root).unwrap();
    }
}
