//! Placement Module
//!
//! Geometry computations for placement policies: maximized and half-screen
//! snapping, screen-to-screen migration, class-rule repositioning and the
//! icon grid.

use crate::shared::{Geometry, Point, Size};
use crate::wm::client::ClientMode;

/// Geometry a client should take for `mode` on `screen`.
///
/// Returns `None` for [`ClientMode::Floating`], which keeps whatever
/// geometry the client already has. The X border is drawn outside the
/// window, so it is subtracted from the usable area.
pub fn mode_geometry(mode: ClientMode, screen: &Geometry, border_width: u32) -> Option<Geometry> {
    let half_width = screen.width / 2;
    let half_height = screen.height / 2;

    let region = match mode {
        ClientMode::Floating => return None,
        ClientMode::Maximized => *screen,
        ClientMode::SplitLeft => Geometry::new(screen.x, screen.y, half_width, screen.height),
        ClientMode::SplitRight => Geometry::new(
            screen.x + half_width as i32,
            screen.y,
            screen.width - half_width,
            screen.height,
        ),
        ClientMode::SplitTop => Geometry::new(screen.x, screen.y, screen.width, half_height),
        ClientMode::SplitBottom => Geometry::new(
            screen.x,
            screen.y + half_height as i32,
            screen.width,
            screen.height - half_height,
        ),
    };

    let border = border_width * 2;
    Some(Geometry::new(
        region.x,
        region.y,
        region.width.saturating_sub(border).max(1),
        region.height.saturating_sub(border).max(1),
    ))
}

/// Carry a window from one screen to another, keeping its offset from the
/// screen origin. The result is pulled back so the window's origin stays
/// on the target screen.
pub fn migrate_to_screen(window: &Geometry, from: &Geometry, to: &Geometry) -> Point {
    let offset = window.origin().delta(from.origin());
    let max_x = to.right() - 1;
    let max_y = to.bottom() - 1;
    Point::new(
        (to.x + offset.x).clamp(to.x, max_x.max(to.x)),
        (to.y + offset.y).clamp(to.y, max_y.max(to.y)),
    )
}

/// Position given as fractions of a screen's size
pub fn fractional_position(screen: &Geometry, fraction_x: f32, fraction_y: f32) -> Point {
    Point::new(
        screen.x + (screen.width as f32 * fraction_x) as i32,
        screen.y + (screen.height as f32 * fraction_y) as i32,
    )
}

/// Lay `count` icons out in rows across `screen`, left to right, top to bottom
pub fn icon_grid(count: usize, icon: Size, screen: &Geometry) -> Vec<Point> {
    let mut positions = Vec::with_capacity(count);
    let mut x = screen.x;
    let mut y = screen.y;

    for _ in 0..count {
        if x + icon.width as i32 > screen.right() && x != screen.x {
            x = screen.x;
            y += icon.height as i32;
        }
        positions.push(Point::new(x, y));
        x += icon.width as i32;
    }

    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_geometry_splits() {
        let screen = Geometry::new(1920, 0, 1280, 1024);

        assert_eq!(mode_geometry(ClientMode::Floating, &screen, 2), None);
        assert_eq!(
            mode_geometry(ClientMode::Maximized, &screen, 0),
            Some(screen)
        );
        assert_eq!(
            mode_geometry(ClientMode::SplitRight, &screen, 0),
            Some(Geometry::new(2560, 0, 640, 1024))
        );
        assert_eq!(
            mode_geometry(ClientMode::SplitBottom, &screen, 2),
            Some(Geometry::new(1920, 512, 1276, 508))
        );
    }

    #[test]
    fn test_migrate_keeps_offset() {
        let from = Geometry::new(0, 0, 1920, 1080);
        let to = Geometry::new(1920, 0, 1280, 1024);
        let window = Geometry::new(100, 50, 400, 300);
        assert_eq!(migrate_to_screen(&window, &from, &to), Point::new(2020, 50));

        // An offset that doesn't fit on the smaller screen is clamped
        let far = Geometry::new(1500, 1050, 100, 20);
        assert_eq!(migrate_to_screen(&far, &from, &to), Point::new(3199, 1023));
    }

    #[test]
    fn test_fractional_position() {
        let screen = Geometry::new(1920, 0, 1280, 1024);
        assert_eq!(fractional_position(&screen, 0.5, 0.25), Point::new(2560, 256));
    }

    #[test]
    fn test_icon_grid_wraps_rows() {
        let screen = Geometry::new(0, 0, 200, 600);
        let cells = icon_grid(4, Size::new(75, 20), &screen);
        assert_eq!(
            cells,
            vec![
                Point::new(0, 0),
                Point::new(75, 0),
                Point::new(0, 20),
                Point::new(75, 20),
            ]
        );
    }
}
