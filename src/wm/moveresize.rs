//! MoveResize Module
//!
//! State of the single interactive move or resize. While a session is
//! active the client stays hidden and an override-redirect placeholder
//! follows the pointer; the geometry is only committed on release.

use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::shared::Point;

/// Move/resize operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResizeMode {
    Move,
    Resize,
}

/// An active move/resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResize {
    pub client: Window,
    pub placeholder: Window,
    pub mode: MoveResizeMode,
    /// Last pointer position seen, in root coordinates
    pub pointer: Point,
}

/// Move/resize manager; holds at most one session
#[derive(Debug, Default)]
pub struct MoveResizeManager {
    session: Option<MoveResize>,
}

impl MoveResizeManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, client: Window, placeholder: Window, pointer: Point, mode: MoveResizeMode) -> bool {
        if let Some(active) = &self.session {
            debug!(
                "Ignoring {:?} of window {}, window {} is already in {:?}",
                mode, client, active.client, active.mode
            );
            return false;
        }

        debug!("Starting {:?} of window {}", mode, client);
        self.session = Some(MoveResize {
            client,
            placeholder,
            mode,
            pointer,
        });
        true
    }

    /// Start moving `client`; a session already in progress wins
    pub fn enter_move(&mut self, client: Window, placeholder: Window, pointer: Point) -> bool {
        self.enter(client, placeholder, pointer, MoveResizeMode::Move)
    }

    /// Start resizing `client`; a session already in progress wins
    pub fn enter_resize(&mut self, client: Window, placeholder: Window, pointer: Point) -> bool {
        self.enter(client, placeholder, pointer, MoveResizeMode::Resize)
    }

    /// End the session; returns it if one was active
    pub fn exit_move_resize(&mut self) -> Option<MoveResize> {
        self.session.take()
    }

    pub fn session(&self) -> Option<&MoveResize> {
        self.session.as_ref()
    }

    pub fn client(&self) -> Option<Window> {
        self.session.map(|s| s.client)
    }

    pub fn placeholder(&self) -> Option<Window> {
        self.session.map(|s| s.placeholder)
    }

    #[cfg(test)]
    pub fn mode(&self) -> Option<MoveResizeMode> {
        self.session.map(|s| s.mode)
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Record a new pointer position and return how far it moved since the
    /// last one. Returns `None` when no session is active.
    pub fn update_pointer(&mut self, pointer: Point) -> Option<Point> {
        let session = self.session.as_mut()?;
        let delta = pointer.delta(session.pointer);
        session.pointer = pointer;
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_session_wins() {
        let mut manager = MoveResizeManager::new();
        assert!(manager.enter_move(7, 99, Point::new(0, 0)));
        assert!(!manager.enter_resize(8, 100, Point::new(5, 5)));

        assert_eq!(manager.client(), Some(7));
        assert_eq!(manager.placeholder(), Some(99));
        assert_eq!(manager.mode(), Some(MoveResizeMode::Move));
    }

    #[test]
    fn test_exit_is_idempotent() {
        let mut manager = MoveResizeManager::new();
        manager.enter_resize(1, 2, Point::new(0, 0));
        assert_eq!(manager.exit_move_resize().map(|s| s.client), Some(1));
        assert!(manager.exit_move_resize().is_none());
        assert!(!manager.is_active());
        assert_eq!(manager.client(), None);
    }

    #[test]
    fn test_update_pointer_returns_delta() {
        let mut manager = MoveResizeManager::new();
        assert_eq!(manager.update_pointer(Point::new(1, 1)), None);

        manager.enter_move(1, 2, Point::new(100, 100));
        assert_eq!(manager.update_pointer(Point::new(110, 95)), Some(Point::new(10, -5)));
        assert_eq!(manager.update_pointer(Point::new(110, 100)), Some(Point::new(0, 5)));
    }
}
