//! Effects Module
//!
//! Applies the changes queued by the registry to the window system and to
//! the interaction state (icons, the move/resize session, the focus cycle).
//! This is the only place where model changes turn into X requests.

use anyhow::Result;
use tracing::{debug, trace, warn};
use x11rb::protocol::xproto::Window;

use crate::shared::{Geometry, Point};
use crate::wm::client::Desktop;
use crate::wm::display::WindowSystem;
use crate::wm::icons::Icon;
use crate::wm::placement;
use crate::wm::registry::Change;
use crate::wm::stacking::stacking_order;
use crate::wm::WindowManager;

impl<S: WindowSystem> WindowManager<S> {
    /// Drain and apply every queued change, then restack once if needed.
    ///
    /// A failing change is logged and skipped so the rest still apply.
    pub(crate) fn apply_changes(&mut self) -> Result<()> {
        let mut restack = false;
        loop {
            let changes = self.registry.flush_changes();
            if changes.is_empty() {
                break;
            }
            for change in changes {
                trace!("Applying {:?}", change);
                match self.apply_change(change) {
                    Ok(needs_restack) => restack |= needs_restack,
                    Err(e) => warn!("Failed to apply {:?}: {:#}", change, e),
                }
            }
        }

        if restack {
            self.restack()?;
        }
        Ok(())
    }

    /// Returns whether the stacking order may have changed
    fn apply_change(&mut self, change: Change) -> Result<bool> {
        match change {
            Change::Added { window } => {
                if self.registry.get(window).is_some_and(|c| c.focusable) {
                    self.cycle.add(window);
                }
                self.display.manage(window, self.config.border_width)?;
                Ok(false)
            }
            Change::Removed { window, desktop } => {
                self.cycle.remove(window);
                match desktop {
                    Desktop::Icon => self.remove_icon(window)?,
                    Desktop::Moving | Desktop::Resizing => {
                        if self.move_resize.client() == Some(window) {
                            self.end_session()?;
                        }
                    }
                    _ => {}
                }
                Ok(true)
            }
            Change::Unmapped { window } => {
                self.cycle.remove(window);
                Ok(false)
            }
            Change::DesktopChanged { window, from, to } => {
                self.move_between_slots(window, from, to)?;
                Ok(true)
            }
            Change::CurrentDesktopChanged { from, to } => {
                debug!("Switching from desktop {} to {}", from, to);
                let numbered: Vec<Window> = self
                    .registry
                    .clients()
                    .filter(|c| matches!(c.desktop, Desktop::Numbered(_)))
                    .map(|c| c.window)
                    .collect();
                for window in numbered {
                    self.sync_visibility(window)?;
                }
                Ok(true)
            }
            Change::LayerChanged { .. } => Ok(true),
            Change::FocusChanged { old, new } => {
                trace!("Focus {:?} -> {:?}", old, new);
                self.cycle.set_current(new);
                self.display.set_focus(new)?;
                Ok(true)
            }
            Change::GeometryChanged { window, geometry } => {
                let shown = self
                    .registry
                    .find_desktop(window)
                    .is_some_and(|d| !d.is_hidden_slot());
                if shown {
                    self.display.configure(window, geometry)?;
                }
                Ok(false)
            }
            Change::ModeChanged { window, mode } => {
                debug!("Window {} is now {:?}", window, mode);
                Ok(false)
            }
        }
    }

    fn move_between_slots(&mut self, window: Window, from: Desktop, to: Desktop) -> Result<()> {
        if from != to {
            if from == Desktop::Icon {
                self.remove_icon(window)?;
            }
            if from.is_moving_or_resizing() && self.move_resize.client() == Some(window) {
                self.end_session()?;
            }

            match to {
                Desktop::Icon => self.add_icon(window)?,
                Desktop::Moving | Desktop::Resizing => self.begin_session(window, to)?,
                Desktop::Numbered(_) | Desktop::All => {}
            }
        }
        self.sync_visibility(window)
    }

    /// Map or unmap a client to match the active desktop
    fn sync_visibility(&mut self, window: Window) -> Result<()> {
        if self.registry.is_visible(window) {
            self.display.map(window)
        } else {
            self.display.unmap(window)
        }
    }

    fn add_icon(&mut self, client: Window) -> Result<()> {
        if self.icons.find_by_client(client).is_some() {
            return Ok(());
        }

        let geometry = Geometry::from_parts(Point::new(0, 0), self.config.icon_size);
        let (window, gc) = self.display.create_icon(geometry)?;
        let icon = Icon { client, window, gc };
        if self.icons.register(icon).is_none() {
            warn!("Icon window {} is already registered", window);
            self.display.destroy_icon(&icon)?;
            return Ok(());
        }

        debug!("Iconified window {} as icon {}", client, window);
        self.reflow_icons()
    }

    fn remove_icon(&mut self, client: Window) -> Result<()> {
        let Some((id, _)) = self.icons.find_by_client(client) else {
            return Ok(());
        };
        if let Some(icon) = self.icons.unregister(id) {
            self.display.destroy_icon(&icon)?;
        }
        self.reflow_icons()
    }

    /// Lay the icons out in a grid on the primary screen
    pub(crate) fn reflow_icons(&mut self) -> Result<()> {
        let Some(screen) = self.registry.screens().primary() else {
            return Ok(());
        };

        let size = self.config.icon_size;
        let icons = self.icons.all();
        let positions = placement::icon_grid(icons.len(), size, &screen);
        for (icon, position) in icons.iter().zip(positions) {
            self.display
                .configure(icon.window, Geometry::from_parts(position, size))?;
        }
        Ok(())
    }

    fn begin_session(&mut self, client: Window, slot: Desktop) -> Result<()> {
        let Some(geometry) = self.registry.get(client).map(|c| c.geometry) else {
            return Ok(());
        };

        let placeholder = match self.display.create_placeholder(geometry) {
            Ok(placeholder) => placeholder,
            Err(e) => {
                // Put the client straight back where it was
                warn!("Cannot start move/resize of window {}: {:#}", client, e);
                match slot {
                    Desktop::Moving => self.registry.stop_moving(client, geometry.origin()),
                    _ => self.registry.stop_resizing(client, geometry.size()),
                }
                return Ok(());
            }
        };

        let pointer = self.last_pointer;
        let entered = match slot {
            Desktop::Moving => self.move_resize.enter_move(client, placeholder, pointer),
            _ => self.move_resize.enter_resize(client, placeholder, pointer),
        };
        if !entered {
            self.display.destroy_placeholder(placeholder)?;
        }
        Ok(())
    }

    /// End the active move/resize session, if any, and drop its placeholder
    pub(crate) fn end_session(&mut self) -> Result<()> {
        if let Some(session) = self.move_resize.exit_move_resize() {
            debug!("Ending {:?} of window {}", session.mode, session.client);
            self.display.destroy_placeholder(session.placeholder)?;
        }
        Ok(())
    }

    fn restack(&mut self) -> Result<()> {
        let mut overlays: Vec<Window> = self.icons.all().iter().map(|i| i.window).collect();
        overlays.extend(self.move_resize.placeholder());

        let order = stacking_order(self.registry.visible_clients(), overlays);
        self.display.restack(&order)
    }
}

#[cfg(test)]
mod tests {
    use crate::shared::{Geometry, Point, Size};
    use crate::wm::client::{Desktop, InitialState, Layer};
    use crate::wm::testing::{test_manager, Command, FakeDisplay, FakeWindow};
    use crate::wm::WindowManager;

    fn managed(windows: &[u32]) -> WindowManager<FakeDisplay> {
        let mut wm = test_manager();
        for (i, &w) in windows.iter().enumerate() {
            let geometry = Geometry::new(i as i32 * 100, 0, 80, 80);
            wm.display.add_window(w, FakeWindow::at(geometry));
            wm.registry
                .add_client(w, InitialState::Visible, geometry.origin(), geometry.size(), true);
        }
        wm.apply_changes().expect("apply");
        wm
    }

    #[test]
    fn test_desktop_switch_maps_and_unmaps() {
        let mut wm = managed(&[10, 11]);
        wm.registry.change_desktop(11, 2);
        wm.registry.toggle_stick(10);
        wm.apply_changes().expect("apply");
        assert!(wm.display.commands.contains(&Command::Unmap(11)));

        wm.display.commands.clear();
        wm.registry.next_desktop();
        wm.apply_changes().expect("apply");

        assert!(wm.display.commands.contains(&Command::Map(11)));
        // Sticky clients are left alone
        assert!(!wm.display.commands.contains(&Command::Unmap(10)));
        assert!(!wm.display.commands.contains(&Command::Map(10)));
    }

    #[test]
    fn test_restack_orders_by_layer_then_focus() {
        let mut wm = managed(&[10, 11, 12]);
        wm.registry.set_layer(10, Layer::MAX);
        wm.registry.focus(11);
        wm.display.commands.clear();
        wm.apply_changes().expect("apply");

        let restack = wm
            .display
            .commands
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::Restack(order) => Some(order.clone()),
                _ => None,
            })
            .expect("restack");
        assert_eq!(restack, vec![12, 11, 10]);
    }

    #[test]
    fn test_icons_reflow_on_removal() {
        let mut wm = managed(&[10, 11]);
        wm.registry.iconify(10);
        wm.registry.iconify(11);
        wm.apply_changes().expect("apply");
        assert_eq!(wm.icons.len(), 2);

        let second = wm.icons.find_by_client(11).expect("icon").1.window;
        assert_eq!(wm.display.geometry(second), Some(Geometry::new(75, 0, 75, 20)));

        wm.registry.deiconify(10);
        wm.apply_changes().expect("apply");
        assert_eq!(wm.icons.len(), 1);
        assert_eq!(wm.display.geometry(second), Some(Geometry::new(0, 0, 75, 20)));

        // Icons stay above every client
        let last_restack = wm.display.commands.iter().rev().find_map(|c| match c {
            Command::Restack(order) => Some(order.clone()),
            _ => None,
        });
        assert_eq!(last_restack.and_then(|o| o.last().copied()), Some(second));
    }

    #[test]
    fn test_failed_placeholder_restores_client() {
        let mut wm = managed(&[10]);
        wm.display.fail_placeholder = true;
        wm.registry.start_resizing(10);
        wm.apply_changes().expect("apply");

        assert!(!wm.move_resize.is_active());
        assert_eq!(wm.registry.find_desktop(10), Some(Desktop::Numbered(1)));
        assert_eq!(wm.registry.get(10).map(|c| c.geometry.size()), Some(Size::new(80, 80)));
    }

    #[test]
    fn test_session_placeholder_tracks_pointer_origin() {
        let mut wm = managed(&[10]);
        wm.last_pointer = Point::new(40, 40);
        wm.registry.start_moving(10);
        wm.apply_changes().expect("apply");

        let session = wm.move_resize.session().copied().expect("session");
        assert_eq!(session.pointer, Point::new(40, 40));
        assert_eq!(wm.display.geometry(session.placeholder), Some(Geometry::new(0, 0, 80, 80)));
        assert!(wm.display.commands.contains(&Command::Unmap(10)));
    }
}
