//! Hints Module
//!
//! WM_HINTS decoding (ICCCM 4.1.2.4). Only the fields the window manager
//! acts on are kept: the initial state and the icon pixmap.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Pixmap, Window};

use crate::wm::client::InitialState;

const STATE_HINT: u32 = 1 << 1;
const ICON_PIXMAP_HINT: u32 = 1 << 2;

const ICONIC_STATE: u32 = 3;

/// The subset of WM_HINTS the window manager uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WmHints {
    pub initial_state: InitialState,
    pub icon_pixmap: Option<Pixmap>,
}

impl WmHints {
    /// Decode the raw 32-bit property values
    pub fn from_values(values: &[u32]) -> Self {
        let field = |i: usize| values.get(i).copied().unwrap_or(0);
        let flags = field(0);

        let initial_state = if flags & STATE_HINT != 0 && field(2) == ICONIC_STATE {
            InitialState::Hidden
        } else {
            InitialState::Visible
        };
        let icon_pixmap = (flags & ICON_PIXMAP_HINT != 0 && field(3) != 0).then(|| field(3));

        Self {
            initial_state,
            icon_pixmap,
        }
    }
}

/// Read WM_HINTS for a window; a window without the property gets defaults
pub fn read_wm_hints<C: Connection>(conn: &C, window: Window) -> Result<WmHints> {
    let reply = conn
        .get_property(false, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
        .reply()
        .with_context(|| format!("Failed to read WM_HINTS of window {}", window))?;

    Ok(match reply.value32() {
        Some(values) => WmHints::from_values(&values.collect::<Vec<u32>>()),
        None => WmHints::default(),
    })
}
