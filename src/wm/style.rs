//! Style Module
//!
//! The preference store (string keys with documented defaults, layered from
//! the config file and the root `RESOURCE_MANAGER` property) and the server
//! resources derived from it: colours, fonts and decoration styles.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::wm::display::{Display, FontInfo};
use crate::wm::error::StartupError;

/// Font used when a requested font cannot be loaded
pub const DEFAULT_FONT: &str = "-*-charter-medium-r-*-*-*-120-*-*-*-*-*-*";

/// Last resort font, present on every X server
pub const FALLBACK_FONT: &str = "fixed";

/// Every preference key with its default value
const DEFAULTS: &[(&str, &str)] = &[
    ("session.toolboxTexture", "solidraised"),
    ("session.windowTexture", "solidraised"),
    ("window.buttonTexture", "solidraised"),
    ("menu.menuTexture", "solidraised"),
    ("menu.menuItemPressedTexture", "solidflat"),
    ("menu.menuItemTexture", "solidraised"),
    ("session.frameColor", "black"),
    ("session.toolboxColor", "grey"),
    ("session.toolboxToColor", "black"),
    ("window.focusColor", "darkgrey"),
    ("window.focusToColor", "black"),
    ("window.unfocusColor", "black"),
    ("window.unfocusToColor", "black"),
    ("window.buttonColor", "grey"),
    ("window.buttonToColor", "black"),
    ("menu.menuColor", "darkgrey"),
    ("menu.menuToColor", "black"),
    ("menu.menuItemColor", "black"),
    ("menu.menuItemToColor", "grey"),
    ("session.focusTextColor", "white"),
    ("session.unfocusTextColor", "darkgrey"),
    ("session.menuTextColor", "white"),
    ("session.menuItemTextColor", "grey"),
    ("session.menuPressedTextColor", "darkgrey"),
    ("session.iconTextColor", "black"),
    ("session.toolboxTextColor", "black"),
    ("session.menuFile", "/usr/share/umbra/menu"),
    ("session.workspaces", "1"),
    ("session.orientation", "righthanded"),
    ("session.titleFont", DEFAULT_FONT),
    ("session.menuFont", DEFAULT_FONT),
    ("session.iconFont", DEFAULT_FONT),
    ("menu.width", "160"),
];

/// Documented default for `key`
pub fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gradient {
    Solid,
    Diagonal,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relief {
    Raised,
    Sunken,
    Flat,
}

/// Decoration texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub gradient: Gradient,
    pub relief: Relief,
}

impl Texture {
    /// Parse names like `solidraised`, `VGradientSunken` or `dgradient`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let (gradient, rest) = [
            ("solid", Gradient::Solid),
            ("dgradient", Gradient::Diagonal),
            ("hgradient", Gradient::Horizontal),
            ("vgradient", Gradient::Vertical),
        ]
        .into_iter()
        .find_map(|(prefix, gradient)| value.strip_prefix(prefix).map(|rest| (gradient, rest)))?;

        let relief = match rest {
            "" | "raised" => Relief::Raised,
            "sunken" => Relief::Sunken,
            "flat" => Relief::Flat,
            _ => return None,
        };

        Some(Self { gradient, relief })
    }
}

/// Which side of the screen the pointer hand is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    LeftHanded,
    RightHanded,
}

impl Orientation {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("lefthanded") {
            Orientation::LeftHanded
        } else {
            Orientation::RightHanded
        }
    }
}

/// Parse `umbra.<key>: <value>` lines out of a resource database string
pub fn parse_resource_database(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('!'))
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let key = name
                .trim()
                .strip_prefix("umbra.")
                .or_else(|| name.trim().strip_prefix("Umbra."))?;
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Preference store
#[derive(Debug, Clone, Default)]
pub struct StyleStore {
    /// Values from the `[style]` table of the config file
    file_layer: HashMap<String, String>,
    /// Effective stored values; keys missing here fall back to their default
    values: HashMap<String, String>,
}

impl StyleStore {
    pub fn new(file_layer: HashMap<String, String>) -> Self {
        let mut store = Self {
            file_layer,
            values: HashMap::new(),
        };
        store.reload(None);
        store
    }

    /// Rebuild the stored values from the config file layer and the resource
    /// database. Values `set` since the last reload are dropped.
    pub fn reload(&mut self, resource_database: Option<&str>) {
        self.values = self.file_layer.clone();
        if let Some(text) = resource_database {
            for (key, value) in parse_resource_database(text) {
                debug!("Resource database sets {} = {}", key, value);
                self.values.insert(key, value);
            }
        }
        for key in self.values.keys().filter(|key| default_for(key).is_none()) {
            debug!("Unknown style key {} is stored but never read", key);
        }
    }

    /// Value for `key`, or its documented default. Unknown keys without a
    /// stored value read as the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(key)
            .map(String::as_str)
            .or_else(|| default_for(key))
            .unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn texture(&self, key: &str) -> Texture {
        Texture::parse(self.get(key))
            .or_else(|| default_for(key).and_then(Texture::parse))
            .unwrap_or(Texture {
                gradient: Gradient::Solid,
                relief: Relief::Raised,
            })
    }

    /// Workspace count, at least one
    pub fn workspaces(&self) -> usize {
        match self.get("session.workspaces").trim().parse::<usize>() {
            Ok(count) if count >= 1 => count,
            _ => {
                warn!(
                    "Invalid session.workspaces value {:?}, using 1",
                    self.get("session.workspaces")
                );
                1
            }
        }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::parse(self.get("session.orientation"))
    }

    pub fn menu_file(&self) -> PathBuf {
        PathBuf::from(self.get("session.menuFile"))
    }

    pub fn menu_width(&self) -> u16 {
        match self.get("menu.width").trim().parse::<u16>() {
            Ok(width) if width > 0 => width,
            _ => 160,
        }
    }
}

/// Colour pair of a gradient texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPair {
    pub from: u32,
    pub to: u32,
}

/// Visual style of one decoration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoration {
    pub texture: Texture,
    pub colors: ColorPair,
    pub text: u32,
}

/// Server resources derived from the preference store
#[derive(Debug, Clone)]
pub struct Resources {
    pub frame: u32,
    pub focus: Decoration,
    pub unfocus: Decoration,
    pub button: Decoration,
    pub toolbox: Decoration,
    pub menu: Decoration,
    pub menu_item: Decoration,
    pub menu_item_pressed: Decoration,
    pub icon_text: u32,
    pub title_font: FontInfo,
    pub menu_font: FontInfo,
    pub icon_font: FontInfo,
    pub orientation: Orientation,
    pub menu_width: u16,
    pub workspaces: usize,
}

impl Resources {
    /// Allocate colours and fonts for `store`.
    ///
    /// Unknown colours degrade to pixel 0; fonts fall back to the default font
    /// and then `fixed`. Only a server without even `fixed` yields
    /// [`StartupError::NoFont`].
    pub fn load<D: Display>(display: &mut D, store: &StyleStore) -> Result<Self> {
        let mut color = |key: &str| -> Result<u32> {
            let name = store.get(key);
            match display.lookup_color(name)? {
                Some(pixel) => Ok(pixel),
                None => {
                    warn!("Unable to resolve colour {:?} for {}, using pixel 0", name, key);
                    Ok(0)
                }
            }
        };

        let frame = color("session.frameColor")?;
        let focus = Decoration {
            texture: store.texture("session.windowTexture"),
            colors: ColorPair {
                from: color("window.focusColor")?,
                to: color("window.focusToColor")?,
            },
            text: color("session.focusTextColor")?,
        };
        let unfocus = Decoration {
            texture: store.texture("session.windowTexture"),
            colors: ColorPair {
                from: color("window.unfocusColor")?,
                to: color("window.unfocusToColor")?,
            },
            text: color("session.unfocusTextColor")?,
        };
        let button = Decoration {
            texture: store.texture("window.buttonTexture"),
            colors: ColorPair {
                from: color("window.buttonColor")?,
                to: color("window.buttonToColor")?,
            },
            text: color("session.focusTextColor")?,
        };
        let toolbox = Decoration {
            texture: store.texture("session.toolboxTexture"),
            colors: ColorPair {
                from: color("session.toolboxColor")?,
                to: color("session.toolboxToColor")?,
            },
            text: color("session.toolboxTextColor")?,
        };
        let menu = Decoration {
            texture: store.texture("menu.menuTexture"),
            colors: ColorPair {
                from: color("menu.menuColor")?,
                to: color("menu.menuToColor")?,
            },
            text: color("session.menuTextColor")?,
        };
        let menu_item = Decoration {
            texture: store.texture("menu.menuItemTexture"),
            colors: ColorPair {
                from: color("menu.menuItemColor")?,
                to: color("menu.menuItemToColor")?,
            },
            text: color("session.menuItemTextColor")?,
        };
        let menu_item_pressed = Decoration {
            texture: store.texture("menu.menuItemPressedTexture"),
            colors: menu_item.colors,
            text: color("session.menuPressedTextColor")?,
        };
        let icon_text = color("session.iconTextColor")?;

        let title_font = load_font(display, store.get("session.titleFont"))?;
        let menu_font = load_font(display, store.get("session.menuFont"))?;
        let icon_font = load_font(display, store.get("session.iconFont"))?;

        info!("Loaded style resources");
        Ok(Self {
            frame,
            focus,
            unfocus,
            button,
            toolbox,
            menu,
            menu_item,
            menu_item_pressed,
            icon_text,
            title_font,
            menu_font,
            icon_font,
            orientation: store.orientation(),
            menu_width: store.menu_width(),
            workspaces: store.workspaces(),
        })
    }

    /// Decoration style for a window in the given focus state
    pub fn window_style(&self, focused: bool) -> &Decoration {
        if focused { &self.focus } else { &self.unfocus }
    }

    /// Free the fonts held by this resource set
    pub fn release<D: Display>(&self, display: &mut D) -> Result<()> {
        for font in [&self.title_font, &self.menu_font, &self.icon_font] {
            display.free_font(font)?;
        }
        Ok(())
    }
}

fn load_font<D: Display>(display: &mut D, requested: &str) -> Result<FontInfo> {
    for name in [requested, DEFAULT_FONT, FALLBACK_FONT] {
        if let Some(font) = display.load_font(name)? {
            if name != requested {
                warn!("Font {:?} unavailable, using {:?}", requested, name);
            }
            return Ok(font);
        }
    }
    Err(StartupError::NoFont {
        requested: requested.to_string(),
    }
    .into())
}
