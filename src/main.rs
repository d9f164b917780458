//! Umbra Window Manager
//!
//! A small stacking window manager for X11: workspaces, icons, popup menus
//! and live restyling from the server's resource database.

mod config;
mod wm;
mod x11_async;

use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::wm::error::exit_code_for;
use crate::wm::display::Display;
use crate::wm::{Session, SessionEnd, Step, X11Display};
use crate::x11_async::X11Readiness;

const USAGE: &str = "\
Usage: umbra [options]

Options:
  -display <name>, --display <name>   X display to manage
  --version                           print version and exit
  --help                              print this text and exit";

/// What the command line asked for
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run { display: Option<String> },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut display = None;
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-display" | "--display" => {
                let name = args
                    .next()
                    .with_context(|| format!("{} requires a display name", arg))?;
                display = Some(name.clone());
            }
            "--version" | "-version" => return Ok(Invocation::Version),
            "--help" | "-help" | "-h" => return Ok(Invocation::Help),
            other => anyhow::bail!("unknown option {:?}", other),
        }
    }
    Ok(Invocation::Run { display })
}

/// Run the session until it ends; windows are handed back on the way out
async fn run(config: &Config, display: Option<String>) -> Result<SessionEnd> {
    let display = display.or_else(|| config.session.display.clone());
    let connection = X11Display::connect(display.as_deref())?;
    let display_name = display
        .or_else(|| std::env::var("DISPLAY").ok())
        .unwrap_or_default();
    let readiness = X11Readiness::new(connection.connection())?;
    let mut session = Session::start(connection, config, display_name)?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let idle_timeout = config.session.idle_timeout();
    info!("Entering event loop (idle tick every {:?})", idle_timeout);

    let end = loop {
        match session.step()? {
            Step::Dispatched => continue,
            Step::Finished(end) => break end,
            Step::Idle => {}
        }
        session.display_mut().flush()?;

        tokio::select! {
            readable = readiness.wait(idle_timeout) => {
                if !readable {
                    debug!("Idle tick");
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                session.shutdown();
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                session.shutdown();
            }
        }
        session.idle()?;
    };

    session.dissociate()?;
    Ok(end)
}

/// Replace this process; only returns on failure
fn restart(args: &[String], command: Option<String>) -> anyhow::Error {
    let failure = match command {
        Some(command) => {
            info!("Executing {:?} in place of umbra", command);
            Command::new("sh").arg("-c").arg(&command).exec()
        }
        None => match std::env::current_exe() {
            Ok(exe) => {
                info!("Re-executing {:?}", exe);
                Command::new(exe).args(args).exec()
            }
            Err(e) => e,
        },
    };
    anyhow::Error::new(failure).context("Failed to restart")
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "umbra=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let display = match parse_args(&args) {
        Ok(Invocation::Run { display }) => display,
        Ok(Invocation::Version) => {
            println!("umbra {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Ok(Invocation::Help) => {
            println!("{}", USAGE);
            return;
        }
        Err(e) => {
            eprintln!("umbra: {}\n\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    info!("Starting umbra {}", env!("CARGO_PKG_VERSION"));
    let config = Config::load();

    let error = match run(&config, display).await {
        Ok(SessionEnd::Exit) => {
            info!("Session ended");
            return;
        }
        Ok(SessionEnd::Restart(command)) => restart(&args, command),
        Err(e) => e,
    };
    error!("{:#}", error);
    eprintln!("umbra: {:#}", error);
    std::process::exit(exit_code_for(&error));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(&args(&[])).unwrap(),
            Invocation::Run { display: None }
        );
        assert_eq!(
            parse_args(&args(&["-display", ":1"])).unwrap(),
            Invocation::Run {
                display: Some(":1".into())
            }
        );
        assert_eq!(
            parse_args(&args(&["--display", "host:0.0"])).unwrap(),
            Invocation::Run {
                display: Some("host:0.0".into())
            }
        );
        assert_eq!(parse_args(&args(&["--version"])).unwrap(), Invocation::Version);
        assert_eq!(parse_args(&args(&["--help"])).unwrap(), Invocation::Help);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(&args(&["--display"])).is_err());
        assert!(parse_args(&args(&["--replace"])).is_err());
    }
}
