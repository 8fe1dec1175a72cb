//! Screen Module
//!
//! Tracks the rectangles of the physical outputs (RandR CRTCs) and answers
//! which output contains a window and which output lies next to another one.

use tracing::debug;

use crate::shared::{Direction, Geometry, Point};

/// The current output topology
#[derive(Debug, Clone, Default)]
pub struct ScreenLayout {
    screens: Vec<Geometry>,
}

impl ScreenLayout {
    pub fn new(screens: Vec<Geometry>) -> Self {
        Self { screens }
    }

    /// Replace the screen list after a topology change
    pub fn update(&mut self, screens: Vec<Geometry>) {
        debug!("Screen layout updated: {:?}", screens);
        self.screens = screens;
    }

    /// The first screen, used as the home of icons
    pub fn primary(&self) -> Option<Geometry> {
        self.screens.first().copied()
    }

    /// Find the screen containing a point
    pub fn find_screen_at_point(&self, point: Point) -> Option<Geometry> {
        self.screens.iter().copied().find(|s| s.contains(point))
    }

    /// Screen containing the center of `geometry`, falling back to the
    /// primary screen when the center is off every output.
    pub fn screen_of(&self, geometry: &Geometry) -> Option<Geometry> {
        self.find_screen_at_point(geometry.center())
            .or_else(|| self.primary())
    }

    /// The nearest screen strictly in `direction` from `from` which shares
    /// some extent with it on the perpendicular axis.
    pub fn neighbor(&self, from: &Geometry, direction: Direction) -> Option<Geometry> {
        let overlaps_vertically =
            |s: &Geometry| s.y < from.bottom() && s.bottom() > from.y;
        let overlaps_horizontally =
            |s: &Geometry| s.x < from.right() && s.right() > from.x;

        self.screens
            .iter()
            .filter(|s| *s != from)
            .filter_map(|s| {
                let (gap, offset) = match direction {
                    Direction::Right if s.x >= from.right() && overlaps_vertically(s) => {
                        (s.x - from.right(), (s.y - from.y).abs())
                    }
                    Direction::Left if s.right() <= from.x && overlaps_vertically(s) => {
                        (from.x - s.right(), (s.y - from.y).abs())
                    }
                    Direction::Bottom if s.y >= from.bottom() && overlaps_horizontally(s) => {
                        (s.y - from.bottom(), (s.x - from.x).abs())
                    }
                    Direction::Top if s.bottom() <= from.y && overlaps_horizontally(s) => {
                        (from.y - s.bottom(), (s.x - from.x).abs())
                    }
                    _ => return None,
                };
                Some(((gap, offset), *s))
            })
            .min_by_key(|(key, _)| *key)
            .map(|(_, s)| s)
    }
}
