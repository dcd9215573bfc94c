use crate::show::script::TimedEvent;

/// Monotonic "next unconsumed event" pointer into a time-sorted list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventCursor {
    next: usize,
}

impl EventCursor {
    pub fn new() -> EventCursor {
        EventCursor::default()
    }

    pub fn position(&self) -> usize {
        self.next
    }

    /// Point at the first event strictly after `t`. Called after every seek:
    /// events at or before the new position are considered consumed, and a
    /// backward seek makes earlier events eligible again.
    pub fn resync<T: TimedEvent>(&mut self, events: &[T], t: f64) {
        self.next = events.partition_point(|event| event.at_sec() <= t);
    }

    /// Consume every event whose time has passed and return them in order.
    pub fn advance<'a, T: TimedEvent>(&mut self, events: &'a [T], t: f64) -> &'a [T] {
        let start = self.next.min(events.len());
        let mut end = start;
        while end < events.len() && events[end].at_sec() <= t {
            end += 1;
        }
        self.next = end;
        &events[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::script::LaughEvent;

    fn laughs(times: &[f64]) -> Vec<LaughEvent> {
        times
            .iter()
            .map(|&at_sec| LaughEvent {
                at_sec,
                intensity: 0.5,
            })
            .collect()
    }

    #[test]
    fn test_advance_fires_each_event_once() {
        let events = laughs(&[1.0, 2.0, 3.0]);
        let mut cursor = EventCursor::new();
        assert_eq!(cursor.advance(&events, 0.5).len(), 0);
        assert_eq!(cursor.advance(&events, 2.0).len(), 2);
        assert_eq!(cursor.advance(&events, 2.5).len(), 0);
        assert_eq!(cursor.advance(&events, 10.0).len(), 1);
        assert_eq!(cursor.advance(&events, 11.0).len(), 0);
    }

    #[test]
    fn test_resync_after_backward_seek() {
        let events = laughs(&[1.0, 5.0, 9.0]);
        let mut cursor = EventCursor::new();
        cursor.advance(&events, 10.0);
        assert_eq!(cursor.position(), 3);

        cursor.resync(&events, 4.0);
        assert_eq!(cursor.position(), 1);
        let fired = cursor.advance(&events, 5.5);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at_sec, 5.0);
    }

    #[test]
    fn test_resync_skips_event_exactly_at_seek_target() {
        let events = laughs(&[1.0, 5.0]);
        let mut cursor = EventCursor::new();
        cursor.resync(&events, 5.0);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_forward_seek_does_not_replay_skipped_events() {
        let events = laughs(&[1.0, 2.0, 3.0, 40.0]);
        let mut cursor = EventCursor::new();
        cursor.resync(&events, 30.0);
        let fired = cursor.advance(&events, 30.1);
        assert!(fired.is_empty());
        assert_eq!(cursor.advance(&events, 41.0).len(), 1);
    }

    #[test]
    fn test_empty_list() {
        let events: Vec<LaughEvent> = Vec::new();
        let mut cursor = EventCursor::new();
        cursor.resync(&events, 3.0);
        assert!(cursor.advance(&events, 4.0).is_empty());
    }
}
