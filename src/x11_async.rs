//! Readiness of the X connection for the async main loop.
//!
//! x11rb reads are blocking, so a dedicated thread watches the socket with
//! mio and pokes a [`Notify`] whenever it has bytes. The loop itself only
//! ever drains events that are already buffered.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

const X_SOCKET: mio::Token = mio::Token(0);

/// How long the watcher sleeps before checking whether it should stop
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct X11EventStream {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    /// The watcher thread exits once this end is dropped
    _stop: oneshot::Receiver<()>,
}

impl X11EventStream {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let readable = Arc::new(Notify::new());
        let (alive, stop) = oneshot::channel::<()>();
        spawn_watcher(conn.stream().as_raw_fd(), readable.clone(), alive)?;

        Ok(Self {
            conn,
            readable,
            _stop: stop,
        })
    }

    /// Take every event already received, without blocking.
    ///
    /// Fails only when the connection itself is broken.
    pub fn drain(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("X11 connection lost")?
        {
            events.push(event);
        }
        Ok(events)
    }

    /// Resolves once the socket has data (or had data since the last call)
    pub async fn wait_readable(&self) {
        self.readable.notified().await;
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush().context("Failed to flush X11 requests")?;
        Ok(())
    }
}

fn spawn_watcher(fd: RawFd, readable: Arc<Notify>, alive: oneshot::Sender<()>) -> Result<()> {
    let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
    poll.registry()
        .register(&mut mio::unix::SourceFd(&fd), X_SOCKET, mio::Interest::READABLE)
        .context("Failed to watch the X11 socket")?;

    tokio::task::spawn_blocking(move || {
        let mut events = mio::Events::with_capacity(1);
        while !alive.is_closed() {
            if let Err(err) = poll.poll(&mut events, Some(POLL_INTERVAL)) {
                tracing::warn!("Polling the X11 socket failed: {:?}", err);
                continue;
            }
            if events.iter().any(|event| event.token() == X_SOCKET) {
                readable.notify_one();
            }
        }
        tracing::debug!("X11 socket watcher stopped");
    });
    Ok(())
}
