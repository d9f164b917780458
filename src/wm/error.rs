//! Fatal startup errors and their process exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to open display {0}")]
    NoDisplay(String),

    #[error("no usable font (tried {requested}, the default font and fixed)")]
    NoFont { requested: String },

    #[error("another window manager is already running")]
    OtherWindowManager,
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::NoDisplay(_) | StartupError::NoFont { .. } => 2,
            StartupError::OtherWindowManager => 3,
        }
    }
}

/// Exit code for a fatal error chain; 1 when no startup error is in it
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StartupError>())
        .map(StartupError::exit_code)
        .unwrap_or(1)
}
