//! Events Module
//!
//! Translates raw X11 events into the subset the window manager core acts on.
//! The dispatcher only ever sees [`WmEvent`], which keeps it independent of the
//! wire library and lets tests feed events without a server.

use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    Atom, ConfigWindow, NotifyDetail, NotifyMode, Property, StackMode, Window,
};

use crate::wm::atoms::Atoms;

/// Stacking request carried by a configure request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restack {
    Above,
    Below,
    Other(u32),
}

/// Geometry/stacking changes requested by a client (or applied by us)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub border_width: Option<u32>,
    pub sibling: Option<Window>,
    pub stack_mode: Option<Restack>,
}

impl WindowChanges {
    /// Same changes without any stacking component
    pub fn geometry_only(&self) -> Self {
        Self {
            sibling: None,
            stack_mode: None,
            ..*self
        }
    }
}

/// Event kinds, used to look for a specific queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ButtonPress,
    ButtonRelease,
    ConfigureRequest,
    MapRequest,
    MapNotify,
    UnmapNotify,
    DestroyNotify,
    PropertyNotify,
    EnterNotify,
    LeaveNotify,
    Expose,
    FocusIn,
    FocusOut,
    KeyPress,
    ChangeState,
}

/// Window manager event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WmEvent {
    ButtonPress {
        window: Window,
        button: u8,
        state: u16,
        x: i16,
        y: i16,
        root_x: i16,
        root_y: i16,
    },
    ButtonRelease {
        window: Window,
        button: u8,
        x: i16,
        y: i16,
    },
    ConfigureRequest {
        window: Window,
        changes: WindowChanges,
    },
    MapRequest {
        window: Window,
    },
    MapNotify {
        window: Window,
    },
    /// `event` is the window the notification was reported on: the root for
    /// substructure notifications, the unmapped window itself otherwise
    UnmapNotify {
        event: Window,
        window: Window,
    },
    DestroyNotify {
        event: Window,
        window: Window,
    },
    PropertyNotify {
        window: Window,
        atom: Atom,
        deleted: bool,
    },
    EnterNotify {
        window: Window,
    },
    LeaveNotify {
        window: Window,
    },
    Expose {
        window: Window,
        count: u16,
    },
    FocusIn {
        window: Window,
    },
    FocusOut {
        window: Window,
        /// Mode was NotifyNormal (not a grab/ungrab)
        normal: bool,
        /// Detail was NotifyAncestor
        ancestor: bool,
    },
    KeyPress {
        window: Window,
        keycode: u8,
        state: u16,
    },
    /// `WM_CHANGE_STATE` client message asking for `state`
    ChangeState {
        window: Window,
        state: u32,
    },
}

impl WmEvent {
    /// Translate an X11 event; events the core never acts on yield `None`
    pub fn from_x11(event: Event, atoms: &Atoms) -> Option<Self> {
        let translated = match event {
            Event::ButtonPress(e) => WmEvent::ButtonPress {
                window: e.event,
                button: e.detail,
                state: u16::from(e.state),
                x: e.event_x,
                y: e.event_y,
                root_x: e.root_x,
                root_y: e.root_y,
            },
            Event::ButtonRelease(e) => WmEvent::ButtonRelease {
                window: e.event,
                button: e.detail,
                x: e.event_x,
                y: e.event_y,
            },
            Event::ConfigureRequest(e) => {
                let mask = e.value_mask;
                let changes = WindowChanges {
                    x: mask.contains(ConfigWindow::X).then_some(i32::from(e.x)),
                    y: mask.contains(ConfigWindow::Y).then_some(i32::from(e.y)),
                    width: mask.contains(ConfigWindow::WIDTH).then_some(u32::from(e.width)),
                    height: mask.contains(ConfigWindow::HEIGHT).then_some(u32::from(e.height)),
                    border_width: mask
                        .contains(ConfigWindow::BORDER_WIDTH)
                        .then_some(u32::from(e.border_width)),
                    sibling: mask.contains(ConfigWindow::SIBLING).then_some(e.sibling),
                    stack_mode: mask.contains(ConfigWindow::STACK_MODE).then(|| {
                        match e.stack_mode {
                            StackMode::ABOVE => Restack::Above,
                            StackMode::BELOW => Restack::Below,
                            other => Restack::Other(u32::from(other)),
                        }
                    }),
                };
                WmEvent::ConfigureRequest {
                    window: e.window,
                    changes,
                }
            }
            Event::MapRequest(e) => WmEvent::MapRequest { window: e.window },
            Event::MapNotify(e) => WmEvent::MapNotify { window: e.window },
            Event::UnmapNotify(e) => WmEvent::UnmapNotify {
                event: e.event,
                window: e.window,
            },
            Event::DestroyNotify(e) => WmEvent::DestroyNotify {
                event: e.event,
                window: e.window,
            },
            Event::PropertyNotify(e) => WmEvent::PropertyNotify {
                window: e.window,
                atom: e.atom,
                deleted: e.state == Property::DELETE,
            },
            Event::EnterNotify(e) => WmEvent::EnterNotify { window: e.event },
            Event::LeaveNotify(e) => WmEvent::LeaveNotify { window: e.event },
            Event::Expose(e) => WmEvent::Expose {
                window: e.window,
                count: e.count,
            },
            Event::FocusIn(e) => WmEvent::FocusIn { window: e.event },
            Event::FocusOut(e) => WmEvent::FocusOut {
                window: e.event,
                normal: e.mode == NotifyMode::NORMAL,
                ancestor: e.detail == NotifyDetail::ANCESTOR,
            },
            Event::KeyPress(e) => WmEvent::KeyPress {
                window: e.event,
                keycode: e.detail,
                state: u16::from(e.state),
            },
            Event::ClientMessage(e) if e.type_ == atoms.wm_change_state && e.format == 32 => {
                WmEvent::ChangeState {
                    window: e.window,
                    state: e.data.as_data32()[0],
                }
            }
            _ => return None,
        };
        Some(translated)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            WmEvent::ButtonPress { .. } => EventKind::ButtonPress,
            WmEvent::ButtonRelease { .. } => EventKind::ButtonRelease,
            WmEvent::ConfigureRequest { .. } => EventKind::ConfigureRequest,
            WmEvent::MapRequest { .. } => EventKind::MapRequest,
            WmEvent::MapNotify { .. } => EventKind::MapNotify,
            WmEvent::UnmapNotify { .. } => EventKind::UnmapNotify,
            WmEvent::DestroyNotify { .. } => EventKind::DestroyNotify,
            WmEvent::PropertyNotify { .. } => EventKind::PropertyNotify,
            WmEvent::EnterNotify { .. } => EventKind::EnterNotify,
            WmEvent::LeaveNotify { .. } => EventKind::LeaveNotify,
            WmEvent::Expose { .. } => EventKind::Expose,
            WmEvent::FocusIn { .. } => EventKind::FocusIn,
            WmEvent::FocusOut { .. } => EventKind::FocusOut,
            WmEvent::KeyPress { .. } => EventKind::KeyPress,
            WmEvent::ChangeState { .. } => EventKind::ChangeState,
        }
    }

    /// Window the event is reported against
    pub fn window(&self) -> Window {
        match *self {
            WmEvent::ButtonPress { window, .. }
            | WmEvent::ButtonRelease { window, .. }
            | WmEvent::ConfigureRequest { window, .. }
            | WmEvent::MapRequest { window }
            | WmEvent::MapNotify { window }
            | WmEvent::UnmapNotify { window, .. }
            | WmEvent::DestroyNotify { window, .. }
            | WmEvent::PropertyNotify { window, .. }
            | WmEvent::EnterNotify { window }
            | WmEvent::LeaveNotify { window }
            | WmEvent::Expose { window, .. }
            | WmEvent::FocusIn { window }
            | WmEvent::FocusOut { window, .. }
            | WmEvent::KeyPress { window, .. }
            | WmEvent::ChangeState { window, .. } => window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::xproto::{
        ClientMessageEvent, ConfigureRequestEvent, DestroyNotifyEvent, FocusOutEvent,
        UnmapNotifyEvent,
    };

    const ATOMS: Atoms = Atoms {
        wm_state: 300,
        wm_protocols: 301,
        wm_take_focus: 302,
        wm_change_state: 303,
    };

    #[test]
    fn test_configure_request_keeps_only_masked_fields() {
        let raw = ConfigureRequestEvent {
            response_type: 23,
            stack_mode: StackMode::BELOW,
            sequence: 0,
            parent: 1,
            window: 42,
            sibling: 7,
            x: 10,
            y: 20,
            width: 300,
            height: 200,
            border_width: 2,
            value_mask: ConfigWindow::WIDTH | ConfigWindow::HEIGHT | ConfigWindow::STACK_MODE,
        };

        let event = WmEvent::from_x11(Event::ConfigureRequest(raw), &ATOMS).unwrap();
        match event {
            WmEvent::ConfigureRequest { window, changes } => {
                assert_eq!(window, 42);
                assert_eq!(changes.x, None);
                assert_eq!(changes.width, Some(300));
                assert_eq!(changes.height, Some(200));
                assert_eq!(changes.sibling, None);
                assert_eq!(changes.stack_mode, Some(Restack::Below));
                assert_eq!(changes.geometry_only().stack_mode, None);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_focus_out_flags() {
        let raw = FocusOutEvent {
            response_type: 10,
            detail: NotifyDetail::ANCESTOR,
            sequence: 0,
            event: 9,
            mode: NotifyMode::NORMAL,
        };
        let event = WmEvent::from_x11(Event::FocusOut(raw), &ATOMS).unwrap();
        assert_eq!(
            event,
            WmEvent::FocusOut {
                window: 9,
                normal: true,
                ancestor: true
            }
        );
        assert_eq!(event.kind(), EventKind::FocusOut);
    }

    #[test]
    fn test_destroy_reports_child_window() {
        let raw = DestroyNotifyEvent {
            response_type: 17,
            sequence: 0,
            event: 1,
            window: 55,
        };
        let event = WmEvent::from_x11(Event::DestroyNotify(raw), &ATOMS).unwrap();
        assert_eq!(event, WmEvent::DestroyNotify { event: 1, window: 55 });
        assert_eq!(event.window(), 55);
        assert_eq!(event.kind(), EventKind::DestroyNotify);
    }

    #[test]
    fn test_unmap_keeps_reporting_window() {
        let raw = UnmapNotifyEvent {
            response_type: 18,
            sequence: 0,
            event: 55,
            window: 55,
            from_configure: false,
        };
        let event = WmEvent::from_x11(Event::UnmapNotify(raw), &ATOMS).unwrap();
        assert_eq!(event, WmEvent::UnmapNotify { event: 55, window: 55 });
    }

    #[test]
    fn test_change_state_message() {
        let iconify = ClientMessageEvent::new(32, 60, ATOMS.wm_change_state, [3, 0, 0, 0, 0]);
        assert_eq!(
            WmEvent::from_x11(Event::ClientMessage(iconify), &ATOMS),
            Some(WmEvent::ChangeState { window: 60, state: 3 })
        );

        let other = ClientMessageEvent::new(32, 60, ATOMS.wm_protocols, [3, 0, 0, 0, 0]);
        assert_eq!(WmEvent::from_x11(Event::ClientMessage(other), &ATOMS), None);
    }
}
