//! Client records: stacking layers, desktop slots and placement modes.

use x11rb::protocol::xproto::Window;

use crate::shared::{Direction, Geometry};

/// Stacking layer of a client.
///
/// User layers run from [`Layer::MIN`] to [`Layer::MAX`]; dialogs sit on
/// [`Layer::DIALOG`], above every user layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Layer(u8);

impl Layer {
    pub const MIN: Layer = Layer(1);
    pub const MAX: Layer = Layer(9);
    pub const DIALOG: Layer = Layer(10);
    pub const DEFAULT: Layer = Layer(5);

    /// Returns `None` for values outside `MIN..=DIALOG`.
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN.0..=Self::DIALOG.0)
            .contains(&value)
            .then_some(Layer(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// One layer up, never past `MAX`.
    pub fn above(self) -> Self {
        if self >= Self::MAX { self } else { Layer(self.0 + 1) }
    }

    /// One layer down, never past `MIN`.
    pub fn below(self) -> Self {
        if self <= Self::MIN { self } else { Layer(self.0 - 1) }
    }
}

impl Default for Layer {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The desktop slot a client occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Desktop {
    /// A user-visible virtual desktop, numbered from 1
    Numbered(u32),
    /// Visible on every desktop
    All,
    /// Iconified
    Icon,
    /// Being moved by the pointer (invisible until the move is committed)
    Moving,
    /// Being resized by the pointer
    Resizing,
}

impl Desktop {
    pub fn is_icon(self) -> bool {
        self == Desktop::Icon
    }

    pub fn is_all(self) -> bool {
        self == Desktop::All
    }

    pub fn is_moving_or_resizing(self) -> bool {
        matches!(self, Desktop::Moving | Desktop::Resizing)
    }

    /// Pseudo-desktops that are never shown directly
    pub fn is_hidden_slot(self) -> bool {
        matches!(self, Desktop::Icon | Desktop::Moving | Desktop::Resizing)
    }
}

/// Placement policy of a client; exactly one applies at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    #[default]
    Floating,
    Maximized,
    SplitTop,
    SplitBottom,
    SplitLeft,
    SplitRight,
}

impl ClientMode {
    pub fn snapped(direction: Direction) -> Self {
        match direction {
            Direction::Top => Self::SplitTop,
            Direction::Bottom => Self::SplitBottom,
            Direction::Left => Self::SplitLeft,
            Direction::Right => Self::SplitRight,
        }
    }
}

/// What a window asked for when it was first mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialState {
    #[default]
    Visible,
    Hidden,
}

/// A managed window
#[derive(Debug, Clone)]
pub struct Client {
    /// X11 window ID
    pub window: Window,

    /// Current desktop slot
    pub desktop: Desktop,

    /// Slot to return to once the client leaves the icon/moving/resizing slot
    pub saved_desktop: Option<Desktop>,

    /// Stacking layer
    pub layer: Layer,

    /// Last committed geometry
    pub geometry: Geometry,

    /// Placement policy
    pub mode: ClientMode,

    /// Whether the client may be focused automatically and cycled to
    pub focusable: bool,

    /// Raise order within the layer; higher is on top
    pub raise_serial: u64,
}

impl Client {
    pub fn new(window: Window, desktop: Desktop, geometry: Geometry, focusable: bool) -> Self {
        Self {
            window,
            desktop,
            saved_desktop: None,
            layer: Layer::DEFAULT,
            geometry,
            mode: ClientMode::Floating,
            focusable,
            raise_serial: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_bounds() {
        assert_eq!(Layer::new(0), None);
        assert_eq!(Layer::new(11), None);
        assert_eq!(Layer::new(10), Some(Layer::DIALOG));
        assert_eq!(Layer::MAX.above(), Layer::MAX);
        assert_eq!(Layer::MIN.below(), Layer::MIN);
        assert_eq!(Layer::DEFAULT.above().value(), 6);
    }

    #[test]
    fn test_hidden_slots() {
        assert!(Desktop::Icon.is_hidden_slot());
        assert!(Desktop::Moving.is_hidden_slot());
        assert!(!Desktop::All.is_hidden_slot());
        assert!(!Desktop::Numbered(3).is_hidden_slot());
    }
}
