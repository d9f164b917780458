//! Menu File Module
//!
//! Reads the line-oriented root menu description:
//!
//! ```text
//! [begin] (Umbra)
//!   "xterm" (xterm -ls)
//!   [begin] (Session)
//!     "Reconfigure" (reconfigure)
//!     [restart] (Start twm) {twm}
//!   [end]
//!   "Exit" (exit)
//! [end]
//! ```
//!
//! Malformed lines are skipped with a warning. Anything that leaves the root
//! menu unusable falls back to a Restart/Exit menu.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Action attached to a menu item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Execute(String),
    Reconfigure,
    Restart,
    RestartOther(String),
    Shutdown,
    Exit,
}

impl MenuAction {
    /// Map an item command; the keywords are matched case-insensitively
    fn from_command(command: &str) -> Self {
        match command.trim().to_ascii_lowercase().as_str() {
            "reconfigure" => MenuAction::Reconfigure,
            "restart" => MenuAction::Restart,
            "exit" => MenuAction::Exit,
            "shutdown" => MenuAction::Shutdown,
            _ => MenuAction::Execute(command.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Item { label: String, action: MenuAction },
    Submenu(MenuTree),
}

/// Parsed menu with its title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuTree {
    pub label: String,
    pub entries: Vec<MenuEntry>,
}

impl MenuTree {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    /// The Restart/Exit menu used when no usable description exists
    pub fn fallback() -> Self {
        Self {
            label: "Umbra".to_string(),
            entries: vec![
                MenuEntry::Item {
                    label: "Restart".to_string(),
                    action: MenuAction::Restart,
                },
                MenuEntry::Item {
                    label: "Exit".to_string(),
                    action: MenuAction::Exit,
                },
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum MenuFileError {
    #[error("unable to read menu file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("menu description must start with [begin] (label), found {0:?}")]
    MissingBegin(String),

    #[error("root menu has no items")]
    Empty,
}

/// One classified line of the description
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Begin(&'a str),
    End,
    Restart { label: &'a str, command: Option<&'a str> },
    Item { label: &'a str, command: Option<&'a str> },
    Unknown(&'a str),
    /// A `(`, `{` or `[` that is never closed
    Unterminated(char),
    Blank,
}

/// Text between the first `open` and the last `close`
fn enclosed(line: &str, open: char, close: char) -> Option<&str> {
    let start = line.find(open)? + open.len_utf8();
    let end = line.rfind(close)?;
    (start <= end).then(|| &line[start..end])
}

/// First opening bracket in `text` with no closing one after it
fn unterminated(text: &str) -> Option<char> {
    [('(', ')'), ('{', '}'), ('[', ']')]
        .into_iter()
        .find_map(|(open, close)| {
            let start = text.find(open)?;
            (!text[start..].contains(close)).then_some(open)
        })
}

fn tokenize(line: &str) -> Token<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Token::Blank;
    }

    if line.starts_with('"') {
        if let Some(label) = enclosed(line, '"', '"') {
            let after = &line[1 + label.len() + 1..];
            if let Some(open) = unterminated(after) {
                return Token::Unterminated(open);
            }
            return Token::Item {
                label,
                command: enclosed(after, '(', ')'),
            };
        }
    }

    if let Some(open) = unterminated(line) {
        return Token::Unterminated(open);
    }
    match enclosed(line, '[', ']') {
        Some(tag) if tag.trim().eq_ignore_ascii_case("begin") => {
            Token::Begin(enclosed(line, '(', ')').unwrap_or("").trim())
        }
        Some(tag) if tag.trim().eq_ignore_ascii_case("end") => Token::End,
        Some(tag) if tag.trim().eq_ignore_ascii_case("restart") => Token::Restart {
            label: enclosed(line, '(', ')').unwrap_or("").trim(),
            command: enclosed(line, '{', '}'),
        },
        _ => Token::Unknown(line),
    }
}

/// Parse a complete description into its root menu
pub fn parse_menu(text: &str) -> Result<MenuTree, MenuFileError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, tokenize(line)))
        .filter(|(_, token)| *token != Token::Blank);

    let root_label = match lines.next() {
        Some((_, Token::Begin(label))) => label,
        Some((_, other)) => return Err(MenuFileError::MissingBegin(format!("{:?}", other))),
        None => return Err(MenuFileError::MissingBegin(String::new())),
    };

    // Stack of open menus, root at the bottom
    let mut stack = vec![MenuTree::new(root_label)];
    for (number, token) in lines {
        match token {
            Token::Begin(label) => stack.push(MenuTree::new(label)),
            Token::End => {
                if stack.len() == 1 {
                    break;
                }
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.entries.push(MenuEntry::Submenu(done));
                    }
                }
            }
            Token::Item { label, command: Some(command) } => {
                if let Some(menu) = stack.last_mut() {
                    menu.entries.push(MenuEntry::Item {
                        label: label.to_string(),
                        action: MenuAction::from_command(command),
                    });
                }
            }
            Token::Item { label, command: None } => {
                warn!("Menu line {}: item {:?} has no (command), skipping", number, label);
            }
            Token::Restart { label, command: Some(command) } => {
                if let Some(menu) = stack.last_mut() {
                    menu.entries.push(MenuEntry::Item {
                        label: label.to_string(),
                        action: MenuAction::RestartOther(command.trim().to_string()),
                    });
                }
            }
            Token::Restart { label, command: None } => {
                warn!("Menu line {}: [restart] {:?} has no {{command}}, skipping", number, label);
            }
            Token::Unterminated(open) => {
                warn!("Menu line {}: unterminated {:?}, skipping", number, open);
            }
            Token::Unknown(line) => {
                warn!("Menu line {}: unrecognised entry {:?}, skipping", number, line);
            }
            Token::Blank => {}
        }
    }

    // Unterminated submenus are closed at end of input
    while stack.len() > 1 {
        if let Some(done) = stack.pop() {
            warn!("Menu {:?} is missing its [end]", done.label);
            if let Some(parent) = stack.last_mut() {
                parent.entries.push(MenuEntry::Submenu(done));
            }
        }
    }

    match stack.pop() {
        Some(root) if !root.entries.is_empty() => Ok(root),
        _ => Err(MenuFileError::Empty),
    }
}

pub fn read_menu(path: &Path) -> Result<MenuTree, MenuFileError> {
    let text = fs::read_to_string(path).map_err(|source| MenuFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_menu(&text)
}

/// Load the root menu from `path`, falling back to Restart/Exit on any error
pub fn load_menu(path: &Path) -> MenuTree {
    match read_menu(path) {
        Ok(tree) => {
            debug!("Loaded menu {:?} from {:?}", tree.label, path);
            tree
        }
        Err(e) => {
            warn!("{}; using the default menu", e);
            MenuTree::fallback()
        }
    }
}
