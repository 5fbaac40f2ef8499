//! Double-buffered event channels.
//!
//! Each event type has an [`Events`] resource holding two buffers. Writers
//! append to the current buffer; once per frame a maintenance system calls
//! [`Events::update`], which swaps the buffers and drops the older one.
//! Readers track a cursor, so each event is yielded to each reader at most
//! once and always in write order. An event written this frame is readable
//! this frame and the next; after that it is discarded.

use core::fmt;
use core::marker::PhantomData;

use crate::change_detection::ResMut;

/// A value broadcast through an [`Events`] channel.
pub trait Event: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Event for T {}

/// Identifies an event within its channel; ids increase in write order.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EventId<E> {
    pub id: usize,
    _marker: PhantomData<E>,
}

impl<E> Copy for EventId<E> {}
impl<E> Clone for EventId<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> fmt::Debug for EventId<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event<{}>#{}",
            core::any::type_name::<E>().split("::").last().unwrap_or("?"),
            self.id,
        )
    }
}

#[derive(Debug)]
struct EventInstance<E> {
    event_id: EventId<E>,
    event: E,
}

#[derive(Debug, Clone, Copy)]
enum BufferState {
    A,
    B,
}

/// The double-buffered channel for events of type `E`.
#[derive(Debug)]
pub struct Events<E> {
    events_a: Vec<EventInstance<E>>,
    events_b: Vec<EventInstance<E>>,
    a_start_event_count: usize,
    b_start_event_count: usize,
    event_count: usize,
    state: BufferState,
}

impl<E> Default for Events<E> {
    fn default() -> Self {
        Events {
            events_a: Vec::new(),
            events_b: Vec::new(),
            a_start_event_count: 0,
            b_start_event_count: 0,
            event_count: 0,
            state: BufferState::A,
        }
    }
}

impl<E: Event> Events<E> {
    /// Writes an event into the current buffer.
    pub fn send(&mut self, event: E) -> EventId<E> {
        let event_id = EventId {
            id: self.event_count,
            _marker: PhantomData,
        };
        let instance = EventInstance { event_id, event };
        match self.state {
            BufferState::A => self.events_a.push(instance),
            BufferState::B => self.events_b.push(instance),
        }
        self.event_count += 1;
        event_id
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.send(event);
        }
    }

    /// A cursor that will see every event currently buffered.
    pub fn get_cursor(&self) -> EventCursor<E> {
        EventCursor::default()
    }

    /// A cursor that ignores buffered events and sees only future ones.
    pub fn get_cursor_current(&self) -> EventCursor<E> {
        EventCursor {
            last_event_count: self.event_count,
            _marker: PhantomData,
        }
    }

    /// Swaps buffers, dropping the events of two frames ago. Call once per
    /// frame.
    pub fn update(&mut self) {
        match self.state {
            BufferState::A => {
                self.events_b = Vec::new();
                self.state = BufferState::B;
                self.b_start_event_count = self.event_count;
            }
            BufferState::B => {
                self.events_a = Vec::new();
                self.state = BufferState::A;
                self.a_start_event_count = self.event_count;
            }
        }
    }

    /// The maintenance system performing the once-per-frame rotation.
    pub fn update_system(mut events: ResMut<Self>) {
        events.update();
    }

    /// Drops all buffered events.
    pub fn clear(&mut self) {
        self.events_a.clear();
        self.events_b.clear();
    }

    pub fn len(&self) -> usize {
        self.events_a.len() + self.events_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns all buffered events in write order.
    pub fn drain(&mut self) -> impl Iterator<Item = E> + '_ {
        let map = |instance: EventInstance<E>| instance.event;
        let (older, newer) = match self.state {
            BufferState::A => (&mut self.events_b, &mut self.events_a),
            BufferState::B => (&mut self.events_a, &mut self.events_b),
        };
        older.drain(..).map(map).chain(newer.drain(..).map(map))
    }
}

/// Per-reader position in an [`Events`] channel.
///
/// Cursors are cheap value types; each reader owns one and advances it by
/// reading.
#[derive(Debug)]
pub struct EventCursor<E> {
    last_event_count: usize,
    _marker: PhantomData<E>,
}

impl<E> Default for EventCursor<E> {
    fn default() -> Self {
        EventCursor {
            last_event_count: 0,
            _marker: PhantomData,
        }
    }
}

impl<E> Clone for EventCursor<E> {
    fn clone(&self) -> Self {
        EventCursor {
            last_event_count: self.last_event_count,
            _marker: PhantomData,
        }
    }
}

impl<E: Event> EventCursor<E> {
    /// Iterates over the events this cursor has not seen yet, in write
    /// order, advancing the cursor.
    pub fn read<'a>(&mut self, events: &'a Events<E>) -> impl Iterator<Item = &'a E> {
        self.read_with_id(events).map(|(event, _)| event)
    }

    /// Like [`read`](Self::read), also yielding each event's id.
    pub fn read_with_id<'a>(
        &mut self,
        events: &'a Events<E>,
    ) -> impl Iterator<Item = (&'a E, EventId<E>)> {
        let a_index = self
            .last_event_count
            .saturating_sub(events.a_start_event_count);
        let b_index = self
            .last_event_count
            .saturating_sub(events.b_start_event_count);
        self.last_event_count = events.event_count;
        let map = |instance: &'a EventInstance<E>| (&instance.event, instance.event_id);
        let (older, newer) = match events.state {
            BufferState::A => (
                events.events_b.get(b_index..).unwrap_or(&[]),
                events.events_a.get(a_index..).unwrap_or(&[]),
            ),
            BufferState::B => (
                events.events_a.get(a_index..).unwrap_or(&[]),
                events.events_b.get(b_index..).unwrap_or(&[]),
            ),
        };
        older.iter().map(map).chain(newer.iter().map(map))
    }

    /// How many unseen events are buffered.
    pub fn len(&self, events: &Events<E>) -> usize {
        events
            .event_count
            .saturating_sub(self.last_event_count)
            .min(events.len())
    }

    pub fn is_empty(&self, events: &Events<E>) -> bool {
        self.len(events) == 0
    }

    /// Marks everything currently buffered as seen.
    pub fn clear(&mut self, events: &Events<E>) {
        self.last_event_count = events.event_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    struct TestEvent {
        i: usize,
    }

    fn collect(events: &Events<TestEvent>, cursor: &mut EventCursor<TestEvent>) -> Vec<TestEvent> {
        cursor.read(events).copied().collect()
    }

    #[test]
    fn delivery_across_updates() {
        let mut events = Events::<TestEvent>::default();
        let event_0 = TestEvent { i: 0 };
        let event_1 = TestEvent { i: 1 };
        let event_2 = TestEvent { i: 2 };

        // This cursor will miss events 0 and 1: it reads nothing for two
        // full updates.
        let mut cursor_missed = events.get_cursor();

        let mut cursor_a = events.get_cursor();
        events.send(event_0);
        assert_eq!(collect(&events, &mut cursor_a), vec![event_0]);
        assert_eq!(collect(&events, &mut cursor_a), vec![]);

        let mut cursor_b = events.get_cursor();
        assert_eq!(collect(&events, &mut cursor_b), vec![event_0]);

        events.send(event_1);
        let mut cursor_c = events.get_cursor();
        assert_eq!(collect(&events, &mut cursor_c), vec![event_0, event_1]);
        assert_eq!(collect(&events, &mut cursor_a), vec![event_1]);

        events.update();

        let mut cursor_d = events.get_cursor();
        events.send(event_2);

        assert_eq!(collect(&events, &mut cursor_a), vec![event_2]);
        assert_eq!(collect(&events, &mut cursor_b), vec![event_1, event_2]);
        assert_eq!(
            collect(&events, &mut cursor_d),
            vec![event_0, event_1, event_2]
        );

        events.update();
        assert_eq!(collect(&events, &mut cursor_missed), vec![event_2]);
    }

    #[test]
    fn cursor_current_ignores_history() {
        let mut events = Events::<TestEvent>::default();
        events.send(TestEvent { i: 0 });
        let mut cursor = events.get_cursor_current();
        assert!(collect(&events, &mut cursor).is_empty());
        events.send(TestEvent { i: 1 });
        assert_eq!(collect(&events, &mut cursor), vec![TestEvent { i: 1 }]);
    }

    #[test]
    fn drain_preserves_write_order() {
        let mut events = Events::<TestEvent>::default();
        events.send(TestEvent { i: 0 });
        events.update();
        events.send(TestEvent { i: 1 });
        let drained: Vec<_> = events.drain().map(|event| event.i).collect();
        assert_eq!(drained, vec![0, 1]);
        assert!(events.is_empty());
    }
}
