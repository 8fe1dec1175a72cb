//! Cycle Module
//!
//! Keyboard focus cycling (Super+Tab). The cycle keeps every focusable
//! client in insertion order; whether a client may receive focus right now
//! is decided by the caller, since that depends on the registry.

use tracing::debug;
use x11rb::protocol::xproto::Window;

/// Ordered ring of cycle candidates
#[derive(Debug, Default)]
pub struct FocusCycle {
    windows: Vec<Window>,
    current: Option<Window>,
}

impl FocusCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a window; adding one that is already present does nothing
    pub fn add(&mut self, window: Window) {
        if !self.windows.contains(&window) {
            self.windows.push(window);
        }
    }

    pub fn remove(&mut self, window: Window) {
        self.windows.retain(|&w| w != window);
        if self.current == Some(window) {
            self.current = None;
        }
    }

    #[cfg(test)]
    pub fn contains(&self, window: Window) -> bool {
        self.windows.contains(&window)
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<Window> {
        self.current
    }

    /// Track focus changes made outside the cycle (clicks, new windows)
    pub fn set_current(&mut self, window: Option<Window>) {
        self.current = window.filter(|w| self.windows.contains(w));
    }

    /// The next eligible window after the current one, wrapping around
    pub fn get_next(&mut self, eligible: impl Fn(Window) -> bool) -> Option<Window> {
        self.step(eligible, true)
    }

    /// The previous eligible window before the current one, wrapping around
    pub fn get_prev(&mut self, eligible: impl Fn(Window) -> bool) -> Option<Window> {
        self.step(eligible, false)
    }

    fn step(&mut self, eligible: impl Fn(Window) -> bool, forward: bool) -> Option<Window> {
        let len = self.windows.len();
        if len == 0 {
            return None;
        }

        let start = self
            .current
            .and_then(|c| self.windows.iter().position(|&w| w == c));

        // Without a current window, start just outside the ring so the first
        // probe lands on either end.
        let origin = match (start, forward) {
            (Some(i), _) => i,
            (None, true) => len - 1,
            (None, false) => 0,
        };

        let found = (1..=len)
            .map(|offset| {
                if forward {
                    (origin + offset) % len
                } else {
                    (origin + len - offset % len) % len
                }
            })
            .map(|i| self.windows[i])
            .find(|&w| eligible(w));

        if let Some(window) = found {
            debug!("Focus cycle moved to window {}", window);
            self.current = Some(window);
        }
        found
    }
}
