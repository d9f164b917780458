//! Registry Module
//!
//! Maps server window handles to the objects that own them. There are four
//! independent tables (client windows, icons, menus, the workspace indicator);
//! the same handle is always looked up with an explicit category.
//!
//! Entries are associations, not owners: clients live in the session's client
//! table, menus in the menu arena.

use std::collections::HashMap;

use tracing::trace;
use x11rb::protocol::xproto::Window;

use crate::wm::display::Display;
use crate::wm::events::{EventKind, WmEvent};
use crate::wm::menu::MenuId;

/// Lookup table a handle is registered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Window,
    Icon,
    Menu,
    Indicator,
}

/// Object a handle resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    /// Managed client, keyed by its client window
    Client(Window),
    /// Icon of the client keyed by the inner window
    Icon(Window),
    Menu(MenuId),
    Indicator,
}

impl ObjectRef {
    pub fn category(&self) -> Category {
        match self {
            ObjectRef::Client(_) => Category::Window,
            ObjectRef::Icon(_) => Category::Icon,
            ObjectRef::Menu(_) => Category::Menu,
            ObjectRef::Indicator => Category::Indicator,
        }
    }
}

/// Outcome of resolving a handle against the live server state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ObjectRef),
    /// The server already reported the handle destroyed; the caller must process
    /// this notification and then treat the handle as unknown
    PendingDestroy(WmEvent),
    NotFound,
}

/// Handle registry
#[derive(Debug, Default)]
pub struct Registry {
    windows: HashMap<Window, ObjectRef>,
    icons: HashMap<Window, ObjectRef>,
    menus: HashMap<Window, ObjectRef>,
    indicators: HashMap<Window, ObjectRef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, category: Category) -> &HashMap<Window, ObjectRef> {
        match category {
            Category::Window => &self.windows,
            Category::Icon => &self.icons,
            Category::Menu => &self.menus,
            Category::Indicator => &self.indicators,
        }
    }

    fn table_mut(&mut self, category: Category) -> &mut HashMap<Window, ObjectRef> {
        match category {
            Category::Window => &mut self.windows,
            Category::Icon => &mut self.icons,
            Category::Menu => &mut self.menus,
            Category::Indicator => &mut self.indicators,
        }
    }

    /// Associate `handle` with `object` in the object's category
    pub fn register(&mut self, handle: Window, object: ObjectRef) {
        trace!("Registering {} as {:?}", handle, object);
        self.table_mut(object.category()).insert(handle, object);
    }

    pub fn unregister(&mut self, handle: Window, category: Category) -> Option<ObjectRef> {
        self.table_mut(category).remove(&handle)
    }

    /// Drop `handle` from every table
    pub fn unregister_all(&mut self, handle: Window) {
        for category in [
            Category::Window,
            Category::Icon,
            Category::Menu,
            Category::Indicator,
        ] {
            self.table_mut(category).remove(&handle);
        }
    }

    /// Plain table lookup, no server involvement
    pub fn get(&self, handle: Window, category: Category) -> Option<ObjectRef> {
        self.table(category).get(&handle).copied()
    }

    pub fn contains(&self, handle: Window, category: Category) -> bool {
        self.table(category).contains_key(&handle)
    }

    /// Look `handle` up, first draining a destroy notification the server has
    /// already queued for it so nothing is dispatched to an object that is
    /// about to disappear.
    pub fn resolve<D: Display>(
        &self,
        display: &mut D,
        handle: Window,
        category: Category,
    ) -> Lookup {
        if let Some(destroy) = display.take_pending(handle, EventKind::DestroyNotify) {
            trace!("Handle {} has a queued DestroyNotify, draining it first", handle);
            return Lookup::PendingDestroy(destroy);
        }

        match self.get(handle, category) {
            Some(object) => Lookup::Found(object),
            None => Lookup::NotFound,
        }
    }

    pub fn len(&self, category: Category) -> usize {
        self.table(category).len()
    }
}
