//! Event Handling Module
//!
//! The dispatcher: one [`WmEvent`] is processed to completion at a time,
//! turned into registry and interaction-state operations, and the resulting
//! changes are then applied to the window system.

use anyhow::Result;
use tracing::{debug, info, trace, warn};
use x11rb::protocol::xproto::Window;
use x11rb::NONE;

use crate::config::HotkeyMode;
use crate::shared::{Geometry, Point};
use crate::wm::client::{ClientMode, Layer};
use crate::wm::display::WindowSystem;
use crate::wm::keyboard::{modifiers, KeyAction, KeyBinding, Keysym};
use crate::wm::moveresize::MoveResizeMode;
use crate::wm::WindowManager;

/// A window system event, reduced to what the dispatcher needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmEvent {
    /// The output layout changed
    ScreenChange,
    KeyPress {
        keysym: Keysym,
        state: u16,
        window: Window,
        /// Child of the root under the pointer
        subwindow: Window,
    },
    ButtonPress {
        button: u8,
        state: u16,
        window: Window,
        subwindow: Window,
        pointer: Point,
    },
    ButtonRelease {
        window: Window,
    },
    Motion {
        window: Window,
        pointer: Point,
    },
    Map {
        window: Window,
    },
    Unmap {
        window: Window,
    },
    Expose {
        window: Window,
    },
    Destroy {
        window: Window,
    },
}

impl WmEvent {
    pub fn is_motion(&self) -> bool {
        matches!(self, WmEvent::Motion { .. })
    }
}

impl<S: WindowSystem> WindowManager<S> {
    /// Process one event. Returns `false` once the exit action has run.
    ///
    /// Window system failures abandon the event; whatever the model already
    /// recorded is still applied so the two never drift apart.
    pub fn step(&mut self, event: WmEvent) -> bool {
        if let Err(e) = self.dispatch(event) {
            warn!("Abandoned {:?}: {:#}", event, e);
        }
        if let Err(e) = self.apply_changes() {
            warn!("Failed to apply changes after {:?}: {:#}", event, e);
        }
        if let Err(e) = self.display.flush() {
            warn!("Failed to flush requests: {:#}", e);
        }
        !self.done
    }

    fn dispatch(&mut self, event: WmEvent) -> Result<()> {
        match event {
            WmEvent::ScreenChange => self.handle_screen_change(),
            WmEvent::KeyPress {
                keysym,
                state,
                window,
                subwindow,
            } => self.handle_key_press(keysym, state, window, subwindow),
            WmEvent::ButtonPress {
                button,
                state,
                window,
                subwindow,
                pointer,
            } => self.handle_button_press(button, state, window, subwindow, pointer),
            WmEvent::ButtonRelease { window } => self.handle_button_release(window),
            WmEvent::Motion { pointer, .. } => self.handle_motion(pointer),
            WmEvent::Map { window } => self.reconcile(window),
            WmEvent::Unmap { window } => {
                self.registry.unmap_client(window);
                Ok(())
            }
            WmEvent::Expose { window } => self.handle_expose(window),
            WmEvent::Destroy { window } => {
                self.registry.remove_client(window);
                Ok(())
            }
        }
    }

    fn handle_screen_change(&mut self) -> Result<()> {
        let screens = self.display.screen_boxes()?;
        info!("Screen layout changed: {} screen(s)", screens.len());
        self.registry.update_screens(screens);
        self.reflow_icons()
    }

    fn handle_key_press(
        &mut self,
        keysym: Keysym,
        state: u16,
        window: Window,
        subwindow: Window,
    ) -> Result<()> {
        let state = modifiers::clean(state);
        let secondary = state & self.config.secondary_modifier != 0;
        let Some(action) = self.config.key_bindings.action(KeyBinding { keysym, secondary }) else {
            debug!("No action bound to keysym 0x{:x} (secondary={})", keysym, secondary);
            return Ok(());
        };
        debug!("Key action {:?}", action);

        if !action.needs_target() {
            return self.run_global_action(action);
        }

        let target = match self.config.hotkey_mode {
            HotkeyMode::Mouse if subwindow != NONE => Some(subwindow),
            HotkeyMode::Mouse => Some(window),
            HotkeyMode::Focus => self.registry.focused(),
        };
        let Some(client) = target.filter(|&w| self.registry.is_client(w)) else {
            debug!("Key action {:?} has no target client", action);
            return Ok(());
        };

        match action {
            KeyAction::ClientNextDesktop => self.registry.client_next_desktop(client),
            KeyAction::ClientPrevDesktop => self.registry.client_prev_desktop(client),
            KeyAction::ToggleStick => self.registry.toggle_stick(client),
            KeyAction::Iconify => self.registry.iconify(client),
            KeyAction::Maximize => self.registry.change_mode(client, ClientMode::Maximized),
            KeyAction::RequestClose => self.display.request_close(client)?,
            KeyAction::ForceClose => self.display.destroy(client)?,
            KeyAction::Snap(direction) => {
                self.registry.change_mode(client, ClientMode::snapped(direction))
            }
            KeyAction::Screen(direction) => self.registry.to_relative_screen(client, direction),
            KeyAction::LayerAbove => self.registry.up_layer(client),
            KeyAction::LayerBelow => self.registry.down_layer(client),
            KeyAction::LayerTop => self.registry.set_layer(client, Layer::MAX),
            KeyAction::LayerBottom => self.registry.set_layer(client, Layer::MIN),
            KeyAction::SetLayer(layer) => self.registry.set_layer(client, layer),
            KeyAction::Run
            | KeyAction::CycleFocus
            | KeyAction::CycleFocusBack
            | KeyAction::NextDesktop
            | KeyAction::PrevDesktop
            | KeyAction::Exit => {}
        }
        Ok(())
    }

    fn run_global_action(&mut self, action: KeyAction) -> Result<()> {
        match action {
            KeyAction::Run => {
                let launcher = self.config.launcher.clone();
                self.display.spawn(&launcher)?;
            }
            KeyAction::CycleFocus | KeyAction::CycleFocusBack => {
                let registry = &self.registry;
                let eligible = |w: Window| {
                    registry.is_visible(w) && registry.get(w).is_some_and(|c| c.focusable)
                };
                let next = if action == KeyAction::CycleFocus {
                    self.cycle.get_next(eligible)
                } else {
                    self.cycle.get_prev(eligible)
                };
                if let Some(next) = next {
                    self.registry.focus(next);
                }
            }
            KeyAction::NextDesktop => self.registry.next_desktop(),
            KeyAction::PrevDesktop => self.registry.prev_desktop(),
            KeyAction::Exit => {
                info!("Exit requested");
                self.done = true;
            }
            other => debug!("{:?} needs a target client", other),
        }
        Ok(())
    }

    fn handle_button_press(
        &mut self,
        button: u8,
        state: u16,
        window: Window,
        subwindow: Window,
        pointer: Point,
    ) -> Result<()> {
        self.last_pointer = pointer;

        // Any click on an icon restores its client, modifiers or not
        // With a modifier held the root grab reports the icon as the child
        let icon = [window, subwindow]
            .into_iter()
            .filter(|&w| w != NONE)
            .find_map(|w| self.icons.find_by_window(w));
        if let Some((_, icon)) = icon {
            self.registry.deiconify(icon.client);
            return Ok(());
        }

        let state = modifiers::clean(state);
        let with_action = state == self.config.action_modifier;
        let client = [subwindow, window]
            .into_iter()
            .find(|&w| w != NONE && self.registry.is_client(w));

        match client {
            None => {
                if with_action && button == self.config.launch_button {
                    let shell = self.config.shell.clone();
                    self.display.spawn(&shell)?;
                }
            }
            Some(client) if with_action => {
                if button == self.config.move_button {
                    self.registry.start_moving(client);
                } else if button == self.config.resize_button {
                    self.registry.start_resizing(client);
                }
            }
            Some(client) => {
                self.registry.focus(client);
            }
        }
        Ok(())
    }

    fn handle_motion(&mut self, pointer: Point) -> Result<()> {
        let Some(session) = self.move_resize.session().copied() else {
            return Ok(());
        };

        let current = self.display.attributes(session.placeholder)?.geometry;
        let Some(delta) = self.move_resize.update_pointer(pointer) else {
            return Ok(());
        };
        trace!("Pointer moved by {:?} during {:?}", delta, session.mode);

        let updated = match session.mode {
            MoveResizeMode::Move => Geometry::new(
                current.x + delta.x,
                current.y + delta.y,
                current.width,
                current.height,
            ),
            MoveResizeMode::Resize => {
                // Never let the placeholder collapse to a non-positive size
                let grow = |size: u32, by: i32| {
                    let next = size as i64 + by as i64;
                    if next <= 0 { size } else { next as u32 }
                };
                Geometry::new(
                    current.x,
                    current.y,
                    grow(current.width, delta.x),
                    grow(current.height, delta.y),
                )
            }
        };
        self.display.configure(session.placeholder, updated)
    }

    fn handle_button_release(&mut self, window: Window) -> Result<()> {
        let Some(session) = self.move_resize.session().copied() else {
            return Ok(());
        };
        if session.placeholder != window {
            return Ok(());
        }

        let final_geometry = self.display.attributes(session.placeholder)?.geometry;
        match session.mode {
            MoveResizeMode::Move => {
                self.registry
                    .stop_moving(session.client, final_geometry.origin())
            }
            MoveResizeMode::Resize => {
                self.registry
                    .stop_resizing(session.client, final_geometry.size())
            }
        }

        // The client may have vanished without the registry knowing;
        // never leave the pointer grabbed.
        if !self.registry.is_client(session.client) {
            self.end_session()?;
        }
        Ok(())
    }

    fn handle_expose(&mut self, window: Window) -> Result<()> {
        let Some((_, icon)) = self.icons.find_by_window(window) else {
            return Ok(());
        };

        self.display.clear(icon.window)?;

        let mut text_x = 0;
        if self.config.show_icons {
            if let Some(pixmap) = self.display.wm_hints(icon.client)?.icon_pixmap {
                text_x = self.display.copy_pixmap(&icon, pixmap)?.width as i32;
            }
        }

        let name = self.display.icon_name(icon.client)?;
        // Text is drawn upwards from its baseline, so start at the bottom edge
        let baseline = Point::new(text_x, self.config.icon_size.height as i32);
        self.display.draw_text(&icon, baseline, &name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Size;
    use crate::wm::client::Desktop;
    use crate::wm::testing::{test_manager, Command, FakeWindow, ROOT};

    const SUPER: u16 = modifiers::MOD4;

    fn press(button: u8, state: u16, window: Window, subwindow: Window, pointer: Point) -> WmEvent {
        WmEvent::ButtonPress {
            button,
            state,
            window,
            subwindow,
            pointer,
        }
    }

    fn key(keysym: Keysym, state: u16, subwindow: Window) -> WmEvent {
        WmEvent::KeyPress {
            keysym,
            state,
            window: 1,
            subwindow,
        }
    }

    #[test]
    fn test_map_manages_new_window() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(5, 5, 200, 100)));
        assert!(wm.step(WmEvent::Map { window: 10 }));

        assert!(wm.registry.is_client(10));
        assert_eq!(wm.registry.focused(), Some(10));
        assert!(wm.display.commands.contains(&Command::Manage(10)));
        assert!(wm.display.commands.contains(&Command::Focus(Some(10))));
    }

    #[test]
    fn test_move_session_roundtrip() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(100, 100, 200, 100)));
        wm.step(WmEvent::Map { window: 10 });

        wm.step(press(1, SUPER, 1, 10, Point::new(150, 150)));
        let placeholder = wm.move_resize.placeholder().expect("session");
        assert_eq!(wm.registry.find_desktop(10), Some(Desktop::Moving));
        assert!(wm.display.commands.contains(&Command::Unmap(10)));

        // Only the latest motion matters, and it moves the placeholder
        wm.step(WmEvent::Motion { window: placeholder, pointer: Point::new(170, 140) });
        assert_eq!(
            wm.display.geometry(placeholder),
            Some(Geometry::new(120, 90, 200, 100))
        );

        wm.step(WmEvent::ButtonRelease { window: placeholder });
        assert!(!wm.move_resize.is_active());
        assert_eq!(wm.registry.find_desktop(10), Some(Desktop::Numbered(1)));
        assert_eq!(
            wm.registry.get(10).map(|c| c.geometry),
            Some(Geometry::new(120, 90, 200, 100))
        );
        assert!(wm.display.commands.contains(&Command::DestroyPlaceholder(placeholder)));
        assert!(wm.display.commands.contains(&Command::Configure(10, Geometry::new(120, 90, 200, 100))));
    }

    #[test]
    fn test_resize_never_collapses() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });

        wm.step(press(3, SUPER, 1, 10, Point::new(40, 40)));
        let placeholder = wm.move_resize.placeholder().expect("session");
        assert_eq!(wm.move_resize.mode(), Some(MoveResizeMode::Resize));

        wm.step(WmEvent::Motion { window: placeholder, pointer: Point::new(-100, 60) });
        assert_eq!(wm.display.geometry(placeholder), Some(Geometry::new(0, 0, 50, 70)));

        wm.step(WmEvent::ButtonRelease { window: placeholder });
        assert_eq!(wm.registry.get(10).map(|c| c.geometry.size()), Some(Size::new(50, 70)));
    }

    #[test]
    fn test_second_session_is_dropped() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.display.add_window(11, FakeWindow::at(Geometry::new(100, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });
        wm.step(WmEvent::Map { window: 11 });

        wm.step(press(1, SUPER, 1, 10, Point::new(10, 10)));
        wm.step(press(3, SUPER, 1, 11, Point::new(110, 10)));

        assert_eq!(wm.move_resize.client(), Some(10));
        assert_eq!(wm.move_resize.mode(), Some(MoveResizeMode::Move));
        assert_eq!(wm.registry.find_desktop(11), Some(Desktop::Numbered(1)));
    }

    #[test]
    fn test_destroy_mid_resize_clears_session() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });
        wm.step(press(3, SUPER, 1, 10, Point::new(10, 10)));
        let placeholder = wm.move_resize.placeholder().expect("session");

        wm.step(WmEvent::Destroy { window: 10 });
        assert!(!wm.move_resize.is_active());
        assert!(!wm.registry.is_client(10));
        assert!(wm.display.commands.contains(&Command::DestroyPlaceholder(placeholder)));

        // A late release for the old placeholder is ignored
        wm.step(WmEvent::ButtonRelease { window: placeholder });
        assert!(!wm.move_resize.is_active());
    }

    #[test]
    fn test_plain_click_focuses() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.display.add_window(11, FakeWindow::at(Geometry::new(100, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });
        wm.step(WmEvent::Map { window: 11 });
        assert_eq!(wm.registry.focused(), Some(11));

        wm.step(press(1, 0, 10, NONE, Point::new(5, 5)));
        assert_eq!(wm.registry.focused(), Some(10));
        assert!(!wm.move_resize.is_active());
    }

    #[test]
    fn test_click_on_empty_space_launches_shell() {
        let mut wm = test_manager();
        let root = ROOT;
        wm.step(press(1, SUPER | modifiers::MOD2, root, NONE, Point::new(5, 5)));
        assert!(wm.display.commands.contains(&Command::Spawn("xterm".to_string())));

        // Without the modifier nothing happens
        wm.display.commands.clear();
        wm.step(press(1, 0, root, NONE, Point::new(5, 5)));
        assert!(wm.display.commands.is_empty());
    }

    #[test]
    fn test_icon_click_deiconifies() {
        let mut wm = test_manager();
        wm.display.add_window(42, FakeWindow::at(Geometry::new(0, 0, 100, 100)));
        wm.step(WmEvent::Map { window: 42 });

        // Super+h iconifies the client under the pointer
        wm.step(key(0x68, SUPER, 42));
        assert_eq!(wm.registry.find_desktop(42), Some(Desktop::Icon));
        let (_, icon) = wm.icons.find_by_client(42).expect("icon");
        assert_eq!(wm.icons.find_by_window(icon.window).map(|(_, i)| i.client), Some(42));

        wm.step(press(2, 0, icon.window, NONE, Point::new(1, 1)));
        assert_eq!(wm.registry.find_desktop(42), Some(Desktop::Numbered(1)));
        assert_eq!(wm.registry.get(42).map(|c| c.geometry), Some(Geometry::new(0, 0, 100, 100)));
        assert!(wm.icons.find_by_client(42).is_none());
        assert!(wm.icons.find_by_window(icon.window).is_none());
        assert!(wm.display.commands.contains(&Command::DestroyIcon(icon.window)));
    }

    #[test]
    fn test_modified_icon_click_through_root_deiconifies() {
        let mut wm = test_manager();
        wm.display.add_window(42, FakeWindow::at(Geometry::new(0, 0, 100, 100)));
        wm.step(WmEvent::Map { window: 42 });
        wm.step(key(0x68, SUPER, 42));
        let (_, icon) = wm.icons.find_by_client(42).expect("icon");
        let root = ROOT;

        wm.display.commands.clear();
        wm.step(press(1, SUPER, root, icon.window, Point::new(1, 1)));
        assert_eq!(wm.registry.find_desktop(42), Some(Desktop::Numbered(1)));
        assert!(wm.icons.find_by_client(42).is_none());
        assert!(!wm.display.commands.iter().any(|c| matches!(c, Command::Spawn(_))));
    }

    #[test]
    fn test_expose_draws_pixmap_then_name() {
        let mut wm = test_manager();
        let mut window = FakeWindow::at(Geometry::new(0, 0, 100, 100));
        window.name = "editor".to_string();
        window.hints.icon_pixmap = Some(0x500);
        wm.display.add_window(42, window);
        wm.display.pixmap_size = Size::new(16, 16);
        wm.step(WmEvent::Map { window: 42 });
        wm.step(key(0x68, SUPER, 42));
        let (_, icon) = wm.icons.find_by_client(42).expect("icon");

        wm.display.commands.clear();
        wm.step(WmEvent::Expose { window: icon.window });
        assert_eq!(
            wm.display.commands,
            vec![
                Command::Clear(icon.window),
                Command::CopyPixmap(icon.window, 0x500),
                Command::DrawText(icon.window, Point::new(16, 20), "editor".to_string()),
            ]
        );
    }

    #[test]
    fn test_focus_mode_targets_focused_client() {
        let mut wm = test_manager();
        wm.config.hotkey_mode = HotkeyMode::Focus;
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });

        // The pointer is elsewhere, but the focused client is the target
        wm.step(key(0x6d, SUPER, NONE));
        assert_eq!(wm.registry.get(10).map(|c| c.mode), Some(ClientMode::Maximized));
    }

    #[test]
    fn test_cycle_skips_iconified_and_hidden() {
        let mut wm = test_manager();
        for (i, w) in [10, 11, 12].into_iter().enumerate() {
            wm.display
                .add_window(w, FakeWindow::at(Geometry::new(i as i32 * 60, 0, 50, 50)));
            wm.step(WmEvent::Map { window: w });
        }
        wm.step(key(0x68, SUPER, 11));
        wm.step(key(0x5d, SUPER, 12));

        let tab = 0xff09;
        let mut seen = Vec::new();
        for _ in 0..4 {
            wm.step(key(tab, SUPER, NONE));
            seen.extend(wm.registry.focused());
        }
        assert!(seen.iter().all(|&w| w == 10));

        // Shift+Tab goes the other way and still only finds the one candidate
        wm.step(key(tab, SUPER | modifiers::SHIFT, NONE));
        assert_eq!(wm.registry.focused(), Some(10));
    }

    #[test]
    fn test_unmap_drops_focus_but_keeps_client() {
        let mut wm = test_manager();
        wm.display.add_window(10, FakeWindow::at(Geometry::new(0, 0, 50, 50)));
        wm.step(WmEvent::Map { window: 10 });
        wm.step(WmEvent::Unmap { window: 10 });

        assert!(wm.registry.is_client(10));
        assert_eq!(wm.registry.focused(), None);
        assert!(!wm.cycle.contains(10));

        wm.step(WmEvent::Map { window: 10 });
        assert!(wm.cycle.contains(10));
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let mut wm = test_manager();
        assert!(wm.step(key(0x72, SUPER, NONE)));
        assert!(wm.display.commands.contains(&Command::Spawn("dmenu_run".to_string())));
        assert!(!wm.step(key(0xff1b, SUPER, NONE)));
    }

    #[test]
    fn test_transport_failure_leaves_model_unchanged() {
        let mut wm = test_manager();
        // Never registered with the fake display, so attribute queries fail
        assert!(wm.step(WmEvent::Map { window: 77 }));
        assert!(!wm.registry.is_client(77));
    }
}
