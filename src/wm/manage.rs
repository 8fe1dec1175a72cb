//! Manage Module
//!
//! Bringing windows under management: reconciling a window that was just
//! mapped with the registry, and importing the windows that already exist
//! when the window manager starts.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::config::{ActionFlags, ClassActions};
use crate::shared::Point;
use crate::wm::client::{ClientMode, Desktop, InitialState, Layer};
use crate::wm::display::WindowSystem;
use crate::wm::moveresize::MoveResizeMode;
use crate::wm::placement;
use crate::wm::WindowManager;

impl<S: WindowSystem> WindowManager<S> {
    /// Manage the windows that were already viewable before startup
    pub fn import_existing(&mut self) -> Result<()> {
        let windows = self.display.top_level_windows()?;
        let mut imported = 0usize;

        for window in windows {
            let attributes = match self.display.attributes(window) {
                Ok(attributes) => attributes,
                Err(e) => {
                    debug!("Skipping window {}: {:#}", window, e);
                    continue;
                }
            };
            if attributes.override_redirect || !attributes.viewable {
                continue;
            }

            match self.reconcile(window) {
                Ok(()) => imported += 1,
                Err(e) => warn!("Failed to import window {}: {:#}", window, e),
            }
        }

        info!("Imported {} existing window(s)", imported);
        self.apply_changes()?;
        self.display.flush()
    }

    /// Bring a freshly mapped window in line with the registry.
    ///
    /// A known client is pulled back onto the active desktop (out of its
    /// icon or an interrupted move/resize). An unknown window is registered
    /// and its class rules applied.
    pub(crate) fn reconcile(&mut self, window: Window) -> Result<()> {
        match self.registry.find_desktop(window) {
            Some(desktop) => self.remap_client(window, desktop),
            None => self.add_window(window),
        }
    }

    fn remap_client(&mut self, window: Window, desktop: Desktop) -> Result<()> {
        debug!("Known window {} mapped from {:?}", window, desktop);

        if desktop.is_icon() {
            self.registry.deiconify(window);
        }
        if desktop.is_moving_or_resizing() {
            self.commit_session(window)?;
        }

        let settled = self.registry.find_desktop(window);
        if settled.is_some_and(|d| !d.is_all()) {
            self.registry.client_reset_desktop(window);
        }

        if self.registry.get(window).is_some_and(|c| c.focusable) {
            self.cycle.add(window);
        }
        Ok(())
    }

    /// Finish an interrupted move/resize of `client` where the placeholder
    /// currently is
    fn commit_session(&mut self, client: Window) -> Result<()> {
        let Some(session) = self.move_resize.session().copied() else {
            return Ok(());
        };
        if session.client != client {
            return Ok(());
        }

        let geometry = self.display.attributes(session.placeholder)?.geometry;
        match session.mode {
            MoveResizeMode::Move => self.registry.stop_moving(client, geometry.origin()),
            MoveResizeMode::Resize => self.registry.stop_resizing(client, geometry.size()),
        }
        Ok(())
    }

    fn add_window(&mut self, window: Window) -> Result<()> {
        // Gather everything first so a vanished window leaves no trace
        let attributes = self.display.attributes(window)?;
        if attributes.override_redirect {
            debug!("Ignoring override-redirect window {}", window);
            return Ok(());
        }
        let hints = self.display.wm_hints(window)?;
        let class = self.display.class_name(window)?;
        let transient_for = self.display.transient_for(window)?;

        let focusable = match &class {
            Some(class) => !self.config.no_autofocus.contains(class),
            None => true,
        };

        let geometry = attributes.geometry;
        info!(
            "Managing window {} (class {:?}) at {:?}",
            window, class, geometry
        );
        self.registry.add_client(
            window,
            hints.initial_state,
            geometry.origin(),
            geometry.size(),
            focusable,
        );

        if let Some(parent) = transient_for {
            debug!("Window {} is a dialog for {}", window, parent);
            self.registry.set_layer(window, Layer::DIALOG);
        }

        if hints.initial_state == InitialState::Hidden {
            return Ok(());
        }

        let actions = class
            .as_ref()
            .and_then(|class| self.config.class_actions.get(class))
            .copied();
        if let Some(actions) = actions {
            self.apply_class_actions(window, actions);
        }
        Ok(())
    }

    fn apply_class_actions(&mut self, window: Window, actions: ClassActions) {
        if actions.flags.contains(ActionFlags::STICK) {
            self.registry.toggle_stick(window);
        }
        if actions.flags.contains(ActionFlags::MAXIMIZE) {
            self.registry.change_mode(window, ClientMode::Maximized);
        }
        if let Some(layer) = actions.layer {
            self.registry.set_layer(window, layer);
        }
        if let Some(direction) = actions.snap {
            self.registry.change_mode(window, ClientMode::snapped(direction));
        }

        if actions.relative_x.is_none() && actions.relative_y.is_none() {
            return;
        }
        let Some(screen) = self.registry.get_screen(window) else {
            return;
        };
        let Some(current) = self.registry.get(window).map(|c| c.geometry.origin()) else {
            return;
        };

        let target = placement::fractional_position(
            &screen,
            actions.relative_x.unwrap_or(0.0),
            actions.relative_y.unwrap_or(0.0),
        );
        let position = Point::new(
            if actions.relative_x.is_some() { target.x } else { current.x },
            if actions.relative_y.is_some() { target.y } else { current.y },
        );

        self.registry.change_mode(window, ClientMode::Floating);
        self.registry.change_location(window, position);
    }
}
