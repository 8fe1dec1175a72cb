//! Window Manager Module
//!
//! Handles X11 window management: the client model, the interaction state
//! around it (icons, move/resize, focus cycling) and the event dispatcher
//! that ties them together.

pub mod client;
pub mod cycle;
pub mod display;
pub mod effects;
pub mod event_filter;
pub mod events;
pub mod hints;
pub mod icons;
pub mod keyboard;
pub mod manage;
pub mod moveresize;
pub mod placement;
pub mod registry;
pub mod screen;
pub mod stacking;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::WmConfig;
use crate::shared::Point;
use crate::wm::cycle::FocusCycle;
use crate::wm::display::WindowSystem;
use crate::wm::icons::IconStore;
use crate::wm::moveresize::MoveResizeManager;
use crate::wm::registry::ClientRegistry;

/// The window manager: one value owns the model and every piece of
/// interaction state, and is driven one event at a time by
/// [`WindowManager::step`].
pub struct WindowManager<S: WindowSystem> {
    display: S,
    config: WmConfig,
    registry: ClientRegistry,
    cycle: FocusCycle,
    icons: IconStore,
    move_resize: MoveResizeManager,
    /// Pointer position of the last button press, where sessions start
    last_pointer: Point,
    done: bool,
}

impl<S: WindowSystem> WindowManager<S> {
    /// Create a window manager over `display`
    pub fn new(display: S, config: WmConfig) -> Result<Self> {
        let screens = display
            .screen_boxes()
            .context("Failed to query screen layout")?;
        info!(
            "Managing {} desktop(s) across {} screen(s)",
            config.desktops,
            screens.len()
        );

        let registry = ClientRegistry::new(config.desktops, config.border_width, screens);
        Ok(Self {
            display,
            config,
            registry,
            cycle: FocusCycle::new(),
            icons: IconStore::new(),
            move_resize: MoveResizeManager::new(),
            last_pointer: Point::default(),
            done: false,
        })
    }

    pub fn display_mut(&mut self) -> &mut S {
        &mut self.display
    }
}
