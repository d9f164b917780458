//! ICCCM atoms
//!
//! The handful of atoms the core reads and writes. `RESOURCE_MANAGER`, `WM_NAME`
//! and friends are predefined and come straight from `AtomEnum`.

use anyhow::Result;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _};

/// Predefined `RESOURCE_MANAGER` atom
pub const RESOURCE_MANAGER: Atom = 23;

/// Predefined `WM_NAME` atom
pub const WM_NAME: Atom = 39;

/// Holds all interned atoms
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    pub wm_state: Atom,
    pub wm_protocols: Atom,
    pub wm_take_focus: Atom,
    pub wm_change_state: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        debug_assert_eq!(Atom::from(AtomEnum::RESOURCE_MANAGER), RESOURCE_MANAGER);
        debug_assert_eq!(Atom::from(AtomEnum::WM_NAME), WM_NAME);

        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            wm_state: intern("WM_STATE")?,
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_take_focus: intern("WM_TAKE_FOCUS")?,
            wm_change_state: intern("WM_CHANGE_STATE")?,
        })
    }
}
