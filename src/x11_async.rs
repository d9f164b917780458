//! X11 Readiness
//!
//! Async wakeups for X11 connection readability using mio, following LeftWM's
//! architecture: a blocking thread polls the connection's file descriptor and
//! pokes a `Notify` the main loop awaits.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Notify, oneshot};
use x11rb::rust_connection::RustConnection;

/// How often the polling thread checks whether it should stop
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wakes the main loop when the X server has sent something
pub struct X11Readiness {
    notify: Arc<Notify>,
    _task_guard: oneshot::Receiver<()>,
}

impl X11Readiness {
    /// Spawn the polling thread for `conn`; it stops once this value is dropped
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        let (guard, task_guard) = oneshot::channel::<()>();
        let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
        let mut events = mio::Events::with_capacity(1);

        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .context("Failed to register X11 FD with mio")?;

        tokio::task::spawn_blocking(move || {
            // Keeps the descriptor alive for as long as we poll it
            let _conn = conn;
            loop {
                if guard.is_closed() {
                    tracing::debug!("X11 socket polling thread shutting down");
                    return;
                }

                if let Err(err) = poll.poll(&mut events, Some(POLL_INTERVAL)) {
                    tracing::warn!("X11 socket poll failed: {:?}", err);
                    continue;
                }

                events
                    .iter()
                    .filter(|event| event.token() == mio::Token(0))
                    .for_each(|_| task_notify.notify_one());
            }
        });

        Ok(Self {
            notify,
            _task_guard: task_guard,
        })
    }

    /// Wait until the connection becomes readable or `timeout` passes.
    ///
    /// Returns `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}
