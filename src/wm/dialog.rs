//! Reconfigure Dialog
//!
//! A small managed window asking whether changed style preferences on the
//! display should be applied. It is created withdrawn at startup and shown
//! when the root `RESOURCE_MANAGER` property changes.

use anyhow::Result;
use tracing::{debug, info};
use x11rb::protocol::xproto::Window;

use crate::wm::display::{Display, Rect, WindowSpec};
use crate::wm::style::Resources;

pub const DIALOG_TITLE: &str = "Apply New Style?";

const DIALOG_TEXT: [&str; 3] = [
    "The style preferences stored on the display have changed.",
    "Choose \"Yes\" to apply them now, or \"No\" to keep the current",
    "style. Reconfigure in the root menu applies them later.",
];

/// Button the user picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Yes,
    No,
}

#[derive(Debug)]
pub struct ReconfigureDialog {
    /// Top-level window, managed like a client
    pub window: Window,
    text_window: Window,
    yes_button: Window,
    no_button: Window,
    line_height: u16,
    pub visible: bool,
}

impl ReconfigureDialog {
    /// Create the dialog windows; the top-level stays unmapped
    pub fn create<D: Display>(display: &mut D, resources: &Resources) -> Result<Self> {
        let font = resources.title_font;
        let line_height = font.line_height();
        let mut text_width = 0;
        for line in DIALOG_TEXT {
            text_width = text_width.max(display.text_width(&font, line)? + 6);
        }
        let text_height = line_height * DIALOG_TEXT.len() as u16;
        let (screen_width, screen_height) = display.screen_size();
        let width = text_width + 10;
        let height = text_height + line_height * 3;

        let background = resources.toolbox.colors.from;
        let border = resources.toolbox.text;
        let window = display.create_window(&WindowSpec {
            parent: None,
            rect: Rect::new(
                (screen_width.saturating_sub(width) / 2) as i16,
                (screen_height.saturating_sub(height) / 2) as i16,
                width,
                height,
            ),
            border_width: 0,
            background,
            border,
            override_redirect: false,
            title: Some(DIALOG_TITLE.to_string()),
        })?;

        let mut child = |rect: Rect, border_width: u16| {
            display.create_window(&WindowSpec {
                parent: Some(window),
                rect,
                border_width,
                background,
                border,
                override_redirect: false,
                title: None,
            })
        };
        let button_width = (text_width / 2).saturating_sub(10).max(1);
        let button_y = (text_height + line_height) as i16;
        let text_window = child(Rect::new(5, 5, text_width.max(1), text_height.max(1)), 0)?;
        let yes_button = child(Rect::new(5, button_y, button_width, line_height), 1)?;
        let no_button = child(
            Rect::new((text_width / 2 + 10) as i16, button_y, button_width, line_height),
            1,
        )?;

        for part in [text_window, yes_button, no_button] {
            display.map(part)?;
        }
        debug!("Created reconfigure dialog {}", window);

        Ok(Self {
            window,
            text_window,
            yes_button,
            no_button,
            line_height,
            visible: false,
        })
    }

    /// Which button `window` is, if any
    pub fn choice_for(&self, window: Window) -> Option<DialogChoice> {
        if window == self.yes_button {
            Some(DialogChoice::Yes)
        } else if window == self.no_button {
            Some(DialogChoice::No)
        } else {
            None
        }
    }

    pub fn owns(&self, window: Window) -> bool {
        [self.window, self.text_window, self.yes_button, self.no_button].contains(&window)
    }

    /// Redraw the part of the dialog `window` belongs to
    pub fn draw<D: Display>(&self, display: &mut D, resources: &Resources, window: Window) -> Result<()> {
        let font = &resources.title_font;
        let pixel = resources.toolbox.text;
        let baseline = self.line_height as i16 - 3;
        if window == self.text_window {
            display.clear(window)?;
            for (row, line) in DIALOG_TEXT.iter().enumerate() {
                display.draw_text(window, font, pixel, 3, baseline * (row as i16 + 1), line)?;
            }
        } else if window == self.yes_button {
            display.clear(window)?;
            display.draw_text(window, font, pixel, 3, baseline, "Yes")?;
        } else if window == self.no_button {
            display.clear(window)?;
            display.draw_text(window, font, pixel, 3, baseline, "No")?;
        }
        Ok(())
    }

    pub fn redraw<D: Display>(&self, display: &mut D, resources: &Resources) -> Result<()> {
        for part in [self.text_window, self.yes_button, self.no_button] {
            self.draw(display, resources, part)?;
        }
        Ok(())
    }

    /// Pick up colours from a new resource set
    pub fn restyle<D: Display>(&self, display: &mut D, resources: &Resources) -> Result<()> {
        for part in [self.window, self.text_window, self.yes_button, self.no_button] {
            display.set_background(part, resources.toolbox.colors.from)?;
        }
        for button in [self.yes_button, self.no_button] {
            display.set_border(button, resources.toolbox.text)?;
        }
        info!("Restyled reconfigure dialog");
        Ok(())
    }

    pub fn destroy<D: Display>(&self, display: &mut D) -> Result<()> {
        display.destroy_window(self.window)
    }
}
