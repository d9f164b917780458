//! Focus Module
//!
//! Tracks which managed window holds the focus flag and implements
//! keyboard focus cycling over a workspace.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, trace};
use x11rb::protocol::xproto::Window;

use crate::wm::client::Client;

/// Holder of the global focus flag
#[derive(Debug, Default)]
pub struct FocusTracker {
    focused: Option<Window>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently focused window, `None` when focus rests with the root
    pub fn focused(&self) -> Option<Window> {
        self.focused
    }

    /// Give the flag to `window`.
    ///
    /// The previous holder loses its flag first; its handle is returned so the
    /// caller can redraw it. Unknown windows are ignored.
    pub fn set(&mut self, clients: &mut HashMap<Window, Client>, window: Window) -> Option<Window> {
        if !clients.contains_key(&window) {
            trace!("Ignoring focus flag for unmanaged window {}", window);
            return None;
        }

        let previous = self.focused.filter(|&old| old != window);
        if let Some(old) = previous {
            if let Some(client) = clients.get_mut(&old) {
                client.focused = false;
            }
        }

        if let Some(client) = clients.get_mut(&window) {
            client.focused = true;
        }
        self.focused = Some(window);
        debug!("Focus flag moved to window {} (from {:?})", window, previous);
        previous
    }

    /// Drop the flag from `window` if it holds it; returns whether it did
    pub fn clear(&mut self, clients: &mut HashMap<Window, Client>, window: Window) -> bool {
        if let Some(client) = clients.get_mut(&window) {
            client.focused = false;
        }
        if self.focused == Some(window) {
            self.focused = None;
            true
        } else {
            false
        }
    }

    /// Drop the flag from whoever holds it
    pub fn clear_all(&mut self, clients: &mut HashMap<Window, Client>) -> Option<Window> {
        let previous = self.focused.take();
        if let Some(old) = previous {
            if let Some(client) = clients.get_mut(&old) {
                client.focused = false;
            }
        }
        previous
    }

    /// Forget `window` entirely (it was destroyed)
    pub fn forget(&mut self, window: Window) {
        if self.focused == Some(window) {
            self.focused = None;
        }
    }
}

/// Find the next window in `order` that takes focus.
///
/// Candidates are visited once, starting right after `focused` and wrapping.
/// `eligible` filters out windows that never take part (iconic ones);
/// `try_focus` asks a candidate to accept focus. With nothing focused the walk
/// starts at the front and may pick any window. The walk never revisits the
/// starting window, so it stops after at most `order.len()` checks and returns
/// `None` when everyone refuses.
pub fn cycle_next<E, F>(
    order: &[Window],
    focused: Option<Window>,
    mut eligible: E,
    mut try_focus: F,
) -> Result<Option<Window>>
where
    E: FnMut(Window) -> bool,
    F: FnMut(Window) -> Result<bool>,
{
    if order.is_empty() {
        return Ok(None);
    }

    let start = focused.and_then(|window| order.iter().position(|&w| w == window));
    let candidates: Vec<Window> = match start {
        Some(index) => (1..order.len())
            .map(|step| order[(index + step) % order.len()])
            .collect(),
        None => order.to_vec(),
    };

    for candidate in candidates {
        if !eligible(candidate) {
            trace!("Cycle skipping window {}", candidate);
            continue;
        }
        if try_focus(candidate)? {
            return Ok(Some(candidate));
        }
        debug!("Window {} refused focus, trying the next one", candidate);
    }

    Ok(None)
}
