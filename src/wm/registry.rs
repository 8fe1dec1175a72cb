//! Client Registry
//!
//! The authoritative table of managed windows. Every mutation validates the
//! target and the transition first; unknown windows and illegal transitions
//! are ignored (logged at debug level), since X routinely reports windows
//! this process does not track.
//!
//! The registry never talks to the X server. Each mutation queues a
//! [`Change`], which the effects layer drains and applies.

use std::collections::HashMap;

use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::shared::{Direction, Geometry, Point, Size};
use crate::wm::client::{Client, ClientMode, Desktop, InitialState, Layer};
use crate::wm::placement;
use crate::wm::screen::ScreenLayout;

/// A notification that some part of the model changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new client was registered
    Added { window: Window },
    /// A client was removed; `desktop` is the slot it occupied at removal
    Removed { window: Window, desktop: Desktop },
    /// A client hid itself without being destroyed
    Unmapped { window: Window },
    /// A client moved between desktop slots
    DesktopChanged { window: Window, from: Desktop, to: Desktop },
    /// The active desktop changed
    CurrentDesktopChanged { from: u32, to: u32 },
    /// A client's stacking layer changed
    LayerChanged { window: Window, layer: Layer },
    /// Focus moved
    FocusChanged { old: Option<Window>, new: Option<Window> },
    /// A client's committed geometry changed
    GeometryChanged { window: Window, geometry: Geometry },
    /// A client's placement policy changed
    ModeChanged { window: Window, mode: ClientMode },
}

/// Registry of all managed clients
pub struct ClientRegistry {
    clients: HashMap<Window, Client>,
    current_desktop: u32,
    desktop_count: u32,
    focused: Option<Window>,
    screens: ScreenLayout,
    border_width: u32,
    next_raise: u64,
    changes: Vec<Change>,
}

impl ClientRegistry {
    /// Create an empty registry with `desktop_count` numbered desktops (at least one)
    pub fn new(desktop_count: u32, border_width: u32, screens: Vec<Geometry>) -> Self {
        Self {
            clients: HashMap::new(),
            current_desktop: 1,
            desktop_count: desktop_count.max(1),
            focused: None,
            screens: ScreenLayout::new(screens),
            border_width,
            next_raise: 0,
            changes: Vec::new(),
        }
    }

    /// Take all queued changes, oldest first
    pub fn flush_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_client(&self, window: Window) -> bool {
        self.clients.contains_key(&window)
    }

    pub fn get(&self, window: Window) -> Option<&Client> {
        self.clients.get(&window)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn find_desktop(&self, window: Window) -> Option<Desktop> {
        self.clients.get(&window).map(|c| c.desktop)
    }

    pub fn find_layer(&self, window: Window) -> Option<Layer> {
        self.clients.get(&window).map(|c| c.layer)
    }

    #[cfg(test)]
    pub fn current_desktop(&self) -> u32 {
        self.current_desktop
    }

    pub fn focused(&self) -> Option<Window> {
        self.focused
    }

    pub fn screens(&self) -> &ScreenLayout {
        &self.screens
    }

    fn desktop_visible(&self, desktop: Desktop) -> bool {
        match desktop {
            Desktop::All => true,
            Desktop::Numbered(n) => n == self.current_desktop,
            _ => false,
        }
    }

    /// Whether the client is shown on the active desktop
    pub fn is_visible(&self, window: Window) -> bool {
        self.clients
            .get(&window)
            .is_some_and(|c| self.desktop_visible(c.desktop))
    }

    /// Clients shown on the active desktop
    pub fn visible_clients(&self) -> impl Iterator<Item = &Client> {
        self.clients
            .values()
            .filter(|c| self.desktop_visible(c.desktop))
    }

    /// Whether a client is currently being moved or resized
    pub fn has_move_resize(&self) -> bool {
        self.clients
            .values()
            .any(|c| c.desktop.is_moving_or_resizing())
    }

    /// The screen containing the client's center
    pub fn get_screen(&self, window: Window) -> Option<Geometry> {
        let client = self.clients.get(&window)?;
        self.screens.screen_of(&client.geometry)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register a new client on the active desktop.
    ///
    /// A client that asks to start hidden is iconified immediately.
    /// Returns `false` if the window is already registered.
    pub fn add_client(
        &mut self,
        window: Window,
        initial: InitialState,
        position: Point,
        size: Size,
        focusable: bool,
    ) -> bool {
        if self.clients.contains_key(&window) {
            debug!("Window {} is already a client", window);
            return false;
        }

        let desktop = Desktop::Numbered(self.current_desktop);
        let geometry = Geometry::from_parts(position, size);
        self.clients
            .insert(window, Client::new(window, desktop, geometry, focusable));

        self.changes.push(Change::Added { window });
        self.changes.push(Change::DesktopChanged {
            window,
            from: desktop,
            to: desktop,
        });
        self.changes.push(Change::LayerChanged {
            window,
            layer: Layer::DEFAULT,
        });

        match initial {
            InitialState::Hidden => {
                self.iconify(window);
            }
            InitialState::Visible => {
                self.autofocus(window);
            }
        }
        true
    }

    /// Forget a client. Focus is released first; the queued
    /// [`Change::Removed`] carries the slot so icons and move/resize
    /// sessions can be torn down.
    pub fn remove_client(&mut self, window: Window) -> bool {
        if !self.clients.contains_key(&window) {
            return false;
        }

        self.unfocus_if_focused(window);
        if let Some(client) = self.clients.remove(&window) {
            self.changes.push(Change::Removed {
                window,
                desktop: client.desktop,
            });
        }
        true
    }

    /// A client unmapped itself without being destroyed. It keeps its
    /// record but loses the focus.
    pub fn unmap_client(&mut self, window: Window) {
        if !self.clients.contains_key(&window) {
            return;
        }
        self.unfocus_if_focused(window);
        self.changes.push(Change::Unmapped { window });
    }

    // ------------------------------------------------------------------
    // Focus
    // ------------------------------------------------------------------

    /// Focus a visible client, regardless of its auto-focus flag
    pub fn focus(&mut self, window: Window) -> bool {
        if !self.is_visible(window) {
            debug!("Refusing to focus invisible or unknown window {}", window);
            return false;
        }

        self.next_raise += 1;
        let serial = self.next_raise;
        if let Some(client) = self.clients.get_mut(&window) {
            client.raise_serial = serial;
        }

        let old = self.focused.replace(window);
        self.changes.push(Change::FocusChanged {
            old,
            new: Some(window),
        });
        true
    }

    /// Focus a client only if it accepts automatic focus
    pub fn autofocus(&mut self, window: Window) -> bool {
        match self.clients.get(&window) {
            Some(client) if client.focusable => self.focus(window),
            _ => false,
        }
    }

    pub fn unfocus(&mut self) {
        if let Some(old) = self.focused.take() {
            self.changes.push(Change::FocusChanged {
                old: Some(old),
                new: None,
            });
        }
    }

    pub fn unfocus_if_focused(&mut self, window: Window) {
        if self.focused == Some(window) {
            self.unfocus();
        }
    }

    // ------------------------------------------------------------------
    // Desktops
    // ------------------------------------------------------------------

    fn move_to_slot(&mut self, window: Window, to: Desktop) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        let from = client.desktop;
        if from == to {
            return;
        }
        client.desktop = to;
        self.changes.push(Change::DesktopChanged { window, from, to });

        if !self.desktop_visible(to) {
            self.unfocus_if_focused(window);
        }
    }

    /// Move a client to numbered desktop `desktop`. Only clients on a
    /// visible slot (numbered or sticky) can be moved this way.
    pub fn change_desktop(&mut self, window: Window, desktop: u32) {
        if desktop == 0 || desktop > self.desktop_count {
            debug!("Desktop {} out of range", desktop);
            return;
        }
        match self.find_desktop(window) {
            Some(Desktop::Numbered(_)) | Some(Desktop::All) => {
                self.move_to_slot(window, Desktop::Numbered(desktop));
            }
            _ => {}
        }
    }

    pub fn client_next_desktop(&mut self, window: Window) {
        if let Some(Desktop::Numbered(n)) = self.find_desktop(window) {
            let next = if n >= self.desktop_count { 1 } else { n + 1 };
            self.change_desktop(window, next);
        }
    }

    pub fn client_prev_desktop(&mut self, window: Window) {
        if let Some(Desktop::Numbered(n)) = self.find_desktop(window) {
            let prev = if n <= 1 { self.desktop_count } else { n - 1 };
            self.change_desktop(window, prev);
        }
    }

    /// Put a client back on the active desktop
    pub fn client_reset_desktop(&mut self, window: Window) {
        self.change_desktop(window, self.current_desktop);
    }

    pub fn toggle_stick(&mut self, window: Window) {
        match self.find_desktop(window) {
            Some(Desktop::All) => {
                self.move_to_slot(window, Desktop::Numbered(self.current_desktop));
            }
            Some(Desktop::Numbered(_)) => self.move_to_slot(window, Desktop::All),
            _ => {}
        }
    }

    fn switch_desktop(&mut self, to: u32) {
        if self.has_move_resize() {
            debug!("Desktop switch refused during move/resize");
            return;
        }
        let from = self.current_desktop;
        if from == to {
            return;
        }

        if let Some(focused) = self.focused {
            if self.find_desktop(focused) != Some(Desktop::All) {
                self.unfocus();
            }
        }

        self.current_desktop = to;
        self.changes
            .push(Change::CurrentDesktopChanged { from, to });
    }

    pub fn next_desktop(&mut self) {
        let next = if self.current_desktop >= self.desktop_count {
            1
        } else {
            self.current_desktop + 1
        };
        self.switch_desktop(next);
    }

    pub fn prev_desktop(&mut self) {
        let prev = if self.current_desktop <= 1 {
            self.desktop_count
        } else {
            self.current_desktop - 1
        };
        self.switch_desktop(prev);
    }

    // ------------------------------------------------------------------
    // Icons
    // ------------------------------------------------------------------

    pub fn iconify(&mut self, window: Window) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.desktop.is_hidden_slot() {
            debug!("Cannot iconify window {} from {:?}", window, client.desktop);
            return;
        }
        client.saved_desktop = Some(client.desktop);
        self.move_to_slot(window, Desktop::Icon);
    }

    /// Restore an iconified client onto the slot it was iconified from
    pub fn deiconify(&mut self, window: Window) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.desktop != Desktop::Icon {
            return;
        }
        let to = client
            .saved_desktop
            .take()
            .unwrap_or(Desktop::Numbered(self.current_desktop));
        self.move_to_slot(window, to);
        self.focus(window);
    }

    // ------------------------------------------------------------------
    // Move / resize
    // ------------------------------------------------------------------

    fn start_session(&mut self, window: Window, slot: Desktop) {
        if self.has_move_resize() {
            debug!("Move/resize already in progress, ignoring window {}", window);
            return;
        }
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.desktop.is_hidden_slot() {
            return;
        }
        client.saved_desktop = Some(client.desktop);
        self.move_to_slot(window, slot);
    }

    pub fn start_moving(&mut self, window: Window) {
        self.start_session(window, Desktop::Moving);
    }

    pub fn start_resizing(&mut self, window: Window) {
        self.start_session(window, Desktop::Resizing);
    }

    fn finish_session(&mut self, window: Window, geometry: Geometry) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        let to = client
            .saved_desktop
            .take()
            .unwrap_or(Desktop::Numbered(self.current_desktop));
        client.geometry = geometry;
        let mode_changed = client.mode != ClientMode::Floating;
        client.mode = ClientMode::Floating;

        self.move_to_slot(window, to);
        if mode_changed {
            self.changes.push(Change::ModeChanged {
                window,
                mode: ClientMode::Floating,
            });
        }
        self.changes
            .push(Change::GeometryChanged { window, geometry });
        self.autofocus(window);
    }

    /// Commit a move to `position`; the client must be moving
    pub fn stop_moving(&mut self, window: Window, position: Point) {
        let Some(client) = self.clients.get(&window) else {
            return;
        };
        if client.desktop != Desktop::Moving {
            return;
        }
        let geometry = Geometry::from_parts(position, client.geometry.size());
        self.finish_session(window, geometry);
    }

    /// Commit a resize to `size`; the client must be resizing and the size
    /// must be non-empty
    pub fn stop_resizing(&mut self, window: Window, size: Size) {
        let Some(client) = self.clients.get(&window) else {
            return;
        };
        if client.desktop != Desktop::Resizing || size.width == 0 || size.height == 0 {
            return;
        }
        let geometry = Geometry::from_parts(client.geometry.origin(), size);
        self.finish_session(window, geometry);
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    pub fn set_layer(&mut self, window: Window, layer: Layer) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.layer != layer {
            client.layer = layer;
            self.changes.push(Change::LayerChanged { window, layer });
        }
    }

    pub fn up_layer(&mut self, window: Window) {
        if let Some(layer) = self.find_layer(window) {
            self.set_layer(window, layer.above());
        }
    }

    pub fn down_layer(&mut self, window: Window) {
        if let Some(layer) = self.find_layer(window) {
            self.set_layer(window, layer.below());
        }
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    fn set_geometry(&mut self, window: Window, geometry: Geometry) {
        if let Some(client) = self.clients.get_mut(&window) {
            if client.geometry != geometry {
                client.geometry = geometry;
                self.changes
                    .push(Change::GeometryChanged { window, geometry });
            }
        }
    }

    /// Apply a placement policy on the client's current screen
    pub fn change_mode(&mut self, window: Window, mode: ClientMode) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.desktop.is_hidden_slot() || client.mode == mode {
            return;
        }
        client.mode = mode;
        self.changes.push(Change::ModeChanged { window, mode });
        self.reapply_mode(window);
    }

    fn reapply_mode(&mut self, window: Window) {
        let Some(client) = self.clients.get(&window) else {
            return;
        };
        let Some(screen) = self.screens.screen_of(&client.geometry) else {
            return;
        };
        if let Some(geometry) = placement::mode_geometry(client.mode, &screen, self.border_width) {
            self.set_geometry(window, geometry);
        }
    }

    pub fn change_location(&mut self, window: Window, position: Point) {
        match self.clients.get(&window) {
            Some(client) if !client.desktop.is_hidden_slot() => {
                let geometry = Geometry::from_parts(position, client.geometry.size());
                self.set_geometry(window, geometry);
            }
            _ => {}
        }
    }

    // Sizes only change through resize sessions today
    #[allow(dead_code)]
    pub fn change_size(&mut self, window: Window, size: Size) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        match self.clients.get(&window) {
            Some(client) if !client.desktop.is_hidden_slot() => {
                let geometry = Geometry::from_parts(client.geometry.origin(), size);
                self.set_geometry(window, geometry);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Screens
    // ------------------------------------------------------------------

    /// Install a new screen list and re-fit clients with a non-floating mode
    pub fn update_screens(&mut self, screens: Vec<Geometry>) {
        self.screens.update(screens);

        let snapped: Vec<Window> = self
            .clients
            .values()
            .filter(|c| c.mode != ClientMode::Floating && !c.desktop.is_hidden_slot())
            .map(|c| c.window)
            .collect();
        for window in snapped {
            self.reapply_mode(window);
        }
    }

    /// Move a client onto the neighboring screen in `direction`
    pub fn to_relative_screen(&mut self, window: Window, direction: Direction) {
        let Some(client) = self.clients.get(&window) else {
            return;
        };
        if client.desktop.is_hidden_slot() {
            return;
        }
        let Some(from) = self.screens.screen_of(&client.geometry) else {
            return;
        };
        let Some(to) = self.screens.neighbor(&from, direction) else {
            debug!("No screen {:?} of {:?}", direction, from);
            return;
        };

        let position = placement::migrate_to_screen(&client.geometry, &from, &to);
        let mut geometry = Geometry::from_parts(position, client.geometry.size());
        if let Some(fitted) = placement::mode_geometry(client.mode, &to, self.border_width) {
            geometry = fitted;
        }
        self.set_geometry(window, geometry);
    }
}
