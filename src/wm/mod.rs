//! Window Manager Module
//!
//! The session core: window lifecycle, workspaces, focus, menus and the
//! reconfigure dialog, all driven through the [`display::Display`] seam.

pub mod atoms;
pub mod client;
pub mod connection;
pub mod dialog;
pub mod display;
pub mod error;
pub mod events;
pub mod focus;
pub mod keyboard;
pub mod menu;
pub mod menu_file;
pub mod registry;
pub mod session;
pub mod style;
pub mod workspace;

mod dispatch;
mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::X11Display;
pub use session::{Session, SessionEnd, Step};
