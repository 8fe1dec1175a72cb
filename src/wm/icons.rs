//! Icons Module
//!
//! Bookkeeping for iconified clients. Each icon pairs the hidden client
//! with the small override-redirect window drawn in its place; both
//! directions of the lookup are kept in step.

use std::collections::HashMap;

use tracing::debug;
use x11rb::protocol::xproto::{Gcontext, Window};

/// Identifier of a registered icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconId(u64);

/// An iconified client and the window standing in for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icon {
    pub client: Window,
    pub window: Window,
    pub gc: Gcontext,
}

/// Icon registry
#[derive(Debug, Default)]
pub struct IconStore {
    icons: HashMap<IconId, Icon>,
    by_client: HashMap<Window, IconId>,
    by_window: HashMap<Window, IconId>,
    next_id: u64,
}

impl IconStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an icon. Returns `None` if either the client or the icon
    /// window already belongs to an icon.
    pub fn register(&mut self, icon: Icon) -> Option<IconId> {
        if self.by_client.contains_key(&icon.client) || self.by_window.contains_key(&icon.window) {
            debug!("Icon for client {} already registered", icon.client);
            return None;
        }

        self.next_id += 1;
        let id = IconId(self.next_id);
        self.by_client.insert(icon.client, id);
        self.by_window.insert(icon.window, id);
        self.icons.insert(id, icon);
        Some(id)
    }

    /// Drop an icon from every index at once
    pub fn unregister(&mut self, id: IconId) -> Option<Icon> {
        let icon = self.icons.remove(&id)?;
        self.by_client.remove(&icon.client);
        self.by_window.remove(&icon.window);
        Some(icon)
    }

    pub fn find_by_client(&self, client: Window) -> Option<(IconId, Icon)> {
        let id = *self.by_client.get(&client)?;
        self.icons.get(&id).map(|icon| (id, *icon))
    }

    pub fn find_by_window(&self, window: Window) -> Option<(IconId, Icon)> {
        let id = *self.by_window.get(&window)?;
        self.icons.get(&id).map(|icon| (id, *icon))
    }

    /// Icons in registration order
    pub fn all(&self) -> Vec<Icon> {
        let mut entries: Vec<(&IconId, &Icon)> = self.icons.iter().collect();
        entries.sort_by_key(|(id, _)| id.0);
        entries.into_iter().map(|(_, icon)| *icon).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}
