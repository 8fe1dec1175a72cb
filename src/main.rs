//! SmallWM
//!
//! A small floating X11 window manager: virtual desktops, sticky windows,
//! iconification, stacking layers, edge snapping and keyboard focus
//! cycling, driven by a single-threaded event dispatcher.

mod config;
mod shared;
mod wm;
mod x11_async;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, WmConfig};
use wm::display::X11Display;
use wm::event_filter::coalesce_motion;
use wm::WindowManager;
use x11_async::X11EventStream;

/// Command line options
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = iter.next().context("--config needs a path")?;
                    args.config = Some(PathBuf::from(path));
                }
                other => bail!("Unknown argument '{}'", other),
            }
        }
        Ok(args)
    }
}

/// Main event loop: drain the connection, translate, coalesce, dispatch
async fn run(
    wm: &mut WindowManager<X11Display>,
    stream: &X11EventStream,
    shutdown: &mut mpsc::Receiver<()>,
) -> Result<()> {
    info!("Starting main event loop");

    loop {
        stream.flush()?;

        let raw = stream.drain()?;
        if raw.is_empty() {
            tokio::select! {
                () = stream.wait_readable() => continue,
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            }
        }

        let mut events = Vec::with_capacity(raw.len());
        for event in raw {
            match wm.display_mut().translate(event) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Failed to handle X event: {:#}", e),
            }
        }

        for event in coalesce_motion(events) {
            if !wm.step(event) {
                info!("Exiting");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;
    let config = Config::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SmallWM");

    let wm_config = WmConfig::try_from(&config).context("Invalid configuration")?;

    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
    let conn = Arc::new(conn);

    let mut display = X11Display::new(conn.clone(), screen_num)?;
    display.grab_bindings(&wm_config)?;

    let mut wm = WindowManager::new(display, wm_config)?;
    wm.import_existing()?;

    let stream = X11EventStream::new(conn)?;

    // Handle SIGTERM and SIGINT
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    if let Err(e) = run(&mut wm, &stream, &mut shutdown_rx).await {
        error!("Window manager error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
