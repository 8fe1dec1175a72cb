//! Event Filter Module
//!
//! Batch-level filtering applied between draining the connection and
//! dispatching. Pointer motion arrives far faster than a placeholder needs
//! to follow it, so consecutive motion events collapse to the last one.

use super::events::WmEvent;

/// Collapse each run of consecutive motion events to its final event.
///
/// Motion is relative to the last recorded pointer position, so dropping
/// intermediate samples loses nothing. Order of all other events is kept.
pub fn coalesce_motion(events: Vec<WmEvent>) -> Vec<WmEvent> {
    let mut filtered: Vec<WmEvent> = Vec::with_capacity(events.len());
    for event in events {
        if event.is_motion() && filtered.last().is_some_and(WmEvent::is_motion) {
            filtered.pop();
        }
        filtered.push(event);
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Point;

    fn motion(x: i32) -> WmEvent {
        WmEvent::Motion {
            window: 9,
            pointer: Point::new(x, 0),
        }
    }

    #[test]
    fn test_runs_collapse_to_last() {
        let events = vec![
            motion(1),
            motion(2),
            motion(3),
            WmEvent::ButtonRelease { window: 9 },
            motion(4),
        ];
        assert_eq!(
            coalesce_motion(events),
            vec![motion(3), WmEvent::ButtonRelease { window: 9 }, motion(4)]
        );
    }

    #[test]
    fn test_other_events_untouched() {
        let events = vec![
            WmEvent::Map { window: 1 },
            WmEvent::Map { window: 1 },
            WmEvent::Destroy { window: 1 },
        ];
        assert_eq!(coalesce_motion(events.clone()), events);
    }
}
