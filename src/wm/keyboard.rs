//! Keyboard Module
//!
//! Global key bindings: focus cycling and workspace switching.

use anyhow::Result;
use tracing::{debug, warn};

use crate::wm::display::Display;

/// Keysyms of the bound keys
pub mod keysym {
    pub const TAB: u32 = 0xff09;
    pub const LEFT: u32 = 0xff51;
    pub const RIGHT: u32 = 0xff53;
}

/// Core modifier masks
pub mod modifier {
    pub const SHIFT: u16 = 1 << 0;
    pub const LOCK: u16 = 1 << 1;
    pub const CONTROL: u16 = 1 << 2;
    pub const MOD1: u16 = 1 << 3;
    pub const MOD2: u16 = 1 << 4;
    pub const MOD4: u16 = 1 << 6;
}

/// Bits ignored when matching a binding (Caps Lock, Num Lock)
const IGNORED_MODIFIERS: u16 = modifier::LOCK | modifier::MOD2;

/// Action triggered by a global key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    CycleFocus,
    PreviousWorkspace,
    NextWorkspace,
}

/// Parse a modifier name as written in the config file
pub fn parse_modifier(name: &str) -> Option<u16> {
    match name.trim().to_ascii_lowercase().as_str() {
        "shift" => Some(modifier::SHIFT),
        "control" | "ctrl" => Some(modifier::CONTROL),
        "mod1" | "alt" => Some(modifier::MOD1),
        "mod4" | "super" => Some(modifier::MOD4),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyBinding {
    keysym: u32,
    modifiers: u16,
    action: KeyAction,
}

/// Key binding table
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: Vec<KeyBinding>,
}

impl KeyBindings {
    /// Bindings for the configured modifier names; unknown names fall back to
    /// Mod1 for cycling and Control for workspace switching
    pub fn new(cycle_modifier: &str, workspace_modifier: &str) -> Self {
        let cycle = parse_modifier(cycle_modifier).unwrap_or_else(|| {
            warn!("Unknown cycle modifier {:?}, using Mod1", cycle_modifier);
            modifier::MOD1
        });
        let workspace = parse_modifier(workspace_modifier).unwrap_or_else(|| {
            warn!("Unknown workspace modifier {:?}, using Control", workspace_modifier);
            modifier::CONTROL
        });

        Self {
            bindings: vec![
                KeyBinding {
                    keysym: keysym::TAB,
                    modifiers: cycle,
                    action: KeyAction::CycleFocus,
                },
                KeyBinding {
                    keysym: keysym::LEFT,
                    modifiers: workspace,
                    action: KeyAction::PreviousWorkspace,
                },
                KeyBinding {
                    keysym: keysym::RIGHT,
                    modifiers: workspace,
                    action: KeyAction::NextWorkspace,
                },
            ],
        }
    }

    /// Grab every binding on the root, with and without lock modifiers
    pub fn grab<D: Display>(&self, display: &mut D) -> Result<()> {
        for binding in &self.bindings {
            for extra in [0, modifier::LOCK, modifier::MOD2, modifier::LOCK | modifier::MOD2] {
                display.grab_key(binding.keysym, binding.modifiers | extra)?;
            }
            debug!(
                "Grabbed keysym {:#x} with modifiers {:#x} for {:?}",
                binding.keysym, binding.modifiers, binding.action
            );
        }
        Ok(())
    }

    /// Action bound to `keysym` pressed with modifier `state`
    pub fn lookup(&self, keysym: u32, state: u16) -> Option<KeyAction> {
        let state = state & !IGNORED_MODIFIERS & 0xff;
        self.bindings
            .iter()
            .find(|binding| binding.keysym == keysym && binding.modifiers == state)
            .map(|binding| binding.action)
    }
}
