//! In-memory display server implementing [`Transport`].
//!
//! Each `MemoryServer` is an independent display with its own atom registry, property store and
//! event queue, so tests never share state. Property writes on watched windows queue the same
//! notifications a real server would deliver, and every client message is recorded.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Atom, ClientMessage, Delivery, Event, NetwmError, NetwmResult, Property, PropertyEvent, PropertyValue, Size, Transport, Window};

/// Core protocol atoms every X server predefines
const PREDEFINED: [(&str, Atom); 8] = [
    ("ATOM", 4),
    ("CARDINAL", 6),
    ("STRING", 31),
    ("WINDOW", 33),
    ("WM_ICON_NAME", 37),
    ("WM_NAME", 39),
    ("WM_HINTS", 35),
    ("WM_CLASS", 67),
];

/// First atom handed out for names that are not predefined
const FIRST_DYNAMIC_ATOM: Atom = 69;

/// A client message as it was handed to the display
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub delivery: Delivery,
    pub message: ClientMessage,
}

#[derive(Default)]
struct State {
    atoms: HashMap<String, Atom>,
    next_atom: Atom,
    properties: HashMap<(Window, Atom), Property>,
    queue: VecDeque<Event>,
    sent: Vec<SentMessage>,
    watched: HashSet<Window>,
}

/// Fake display used by tests and offline tooling
pub struct MemoryServer {
    root: Window,
    screen: Size,
    intern_requests: Cell<usize>,
    unwatched_reads: RefCell<HashMap<Window, usize>>,
    refuse_atoms: Cell<bool>,
    state: RefCell<State>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// New display with root window `0x100` and a 1024x768 screen
    pub fn new() -> Self {
        Self::with_screen(0x100, Size::new(1024, 768))
    }

    pub fn with_screen(root: Window, screen: Size) -> Self {
        let state = State {
            atoms: PREDEFINED.iter().map(|(name, atom)| (name.to_string(), *atom)).collect(),
            next_atom: FIRST_DYNAMIC_ATOM,
            ..Default::default()
        };
        Self {
            root,
            screen,
            intern_requests: Cell::new(0),
            unwatched_reads: RefCell::new(HashMap::new()),
            refuse_atoms: Cell::new(false),
            state: RefCell::new(state),
        }
    }

    /// Number of property reads on `window` made before anybody selected its property changes
    pub fn unwatched_reads(&self, window: Window) -> usize {
        self.unwatched_reads.borrow().get(&window).copied().unwrap_or(0)
    }

    /// Number of batched intern requests served so far
    pub fn intern_requests(&self) -> usize {
        self.intern_requests.get()
    }

    /// Resolve every name to 0 from now on, as a server that is going away would
    pub fn refuse_atoms(&self, refuse: bool) {
        self.refuse_atoms.set(refuse);
    }

    /// Stored property, if any
    pub fn property(&self, window: Window, property: Atom) -> Option<Property> {
        self.state.borrow().properties.get(&(window, property)).cloned()
    }

    /// Stored format 32 words regardless of type
    pub fn words(&self, window: Window, property: Atom) -> Option<Vec<u32>> {
        match self.property(window, property)?.value {
            PropertyValue::Format32(x) => Some(x),
            _ => None,
        }
    }

    /// Stored format 8 bytes regardless of type
    pub fn bytes(&self, window: Window, property: Atom) -> Option<Vec<u8>> {
        match self.property(window, property)?.value {
            PropertyValue::Format8(x) => Some(x),
            _ => None,
        }
    }

    /// Append an event to the queue
    pub fn push_event(&self, event: Event) {
        self.state.borrow_mut().queue.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Drop every queued event
    pub fn clear_events(&self) {
        self.state.borrow_mut().queue.clear();
    }

    /// Remove and return every recorded client message
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.borrow_mut().sent)
    }

    pub fn is_watched(&self, window: Window) -> bool {
        self.state.borrow().watched.contains(&window)
    }

    fn notify(state: &mut State, window: Window, atom: Atom, deleted: bool) {
        if state.watched.contains(&window) {
            state.queue.push_back(Event::Property(PropertyEvent { window, atom, deleted }));
        }
    }
}

impl Transport for MemoryServer {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> Size {
        self.screen
    }

    fn intern_atoms(&self, names: &[&str]) -> NetwmResult<Vec<Atom>> {
        self.intern_requests.set(self.intern_requests.get() + 1);
        if self.refuse_atoms.get() {
            return Ok(vec![0; names.len()]);
        }
        let mut state = self.state.borrow_mut();
        let mut atoms = Vec::with_capacity(names.len());
        for name in names {
            let atom = match state.atoms.get(*name) {
                Some(atom) => *atom,
                None => {
                    let atom = state.next_atom;
                    state.next_atom += 1;
                    state.atoms.insert(name.to_string(), atom);
                    atom
                },
            };
            atoms.push(atom);
        }
        Ok(atoms)
    }

    fn get_property(&self, window: Window, property: Atom, type_: Atom) -> NetwmResult<Option<Property>> {
        let state = self.state.borrow();
        if !state.watched.contains(&window) {
            *self.unwatched_reads.borrow_mut().entry(window).or_insert(0) += 1;
        }
        Ok(match state.properties.get(&(window, property)) {
            // a type mismatch reports the actual type with no data, like the X server
            Some(prop) if type_ != 0 && prop.type_ != type_ => {
                let empty = match prop.value {
                    PropertyValue::Format8(_) => PropertyValue::Format8(vec![]),
                    PropertyValue::Format16(_) => PropertyValue::Format16(vec![]),
                    PropertyValue::Format32(_) => PropertyValue::Format32(vec![]),
                };
                Some(Property::new(prop.type_, empty))
            },
            Some(prop) => Some(prop.clone()),
            None => None,
        })
    }

    fn set_property(&self, window: Window, property: Atom, type_: Atom, value: &PropertyValue) -> NetwmResult<()> {
        let mut state = self.state.borrow_mut();
        state.properties.insert((window, property), Property::new(type_, value.clone()));
        Self::notify(&mut state, window, property, false);
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> NetwmResult<()> {
        let mut state = self.state.borrow_mut();
        if state.properties.remove(&(window, property)).is_some() {
            Self::notify(&mut state, window, property, true);
        }
        Ok(())
    }

    fn send_client_message(&self, delivery: Delivery, message: ClientMessage) -> NetwmResult<()> {
        self.state.borrow_mut().sent.push(SentMessage { delivery, message });
        Ok(())
    }

    fn watch_window(&self, window: Window) -> NetwmResult<()> {
        self.state.borrow_mut().watched.insert(window);
        Ok(())
    }

    fn poll_event(&self) -> NetwmResult<Option<Event>> {
        Ok(self.state.borrow_mut().queue.pop_front())
    }

    fn wait_event(&self) -> NetwmResult<Event> {
        self.state.borrow_mut().queue.pop_front().ok_or_else(|| NetwmError::NoPendingEvents.into())
    }

    fn take_queued_property(&self, window: Window, accept: &dyn Fn(Atom) -> bool) -> NetwmResult<Option<PropertyEvent>> {
        let mut state = self.state.borrow_mut();
        let pos = state.queue.iter().position(|ev| matches!(ev, Event::Property(x) if x.window == window));
        match pos.and_then(|i| state.queue.get(i).copied().map(|ev| (i, ev))) {
            Some((i, Event::Property(ev))) if accept(ev.atom) => {
                state.queue.remove(i);
                Ok(Some(ev))
            },
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_store() {
        let server = MemoryServer::new();
        let value = PropertyValue::Format32(vec![1, 2]);
        server.set_property(5, 6, 6, &value).unwrap();
        assert_eq!(server.get_property(5, 6, 6).unwrap(), Some(Property::new(6, value)));
        assert_eq!(server.get_property(5, 6, 33).unwrap(), Some(Property::new(6, PropertyValue::Format32(vec![]))));
        server.delete_property(5, 6).unwrap();
        assert_eq!(server.get_property(5, 6, 6).unwrap(), None);
    }

    #[test]
    fn test_notifications_only_when_watched() {
        let server = MemoryServer::new();
        server.set_property(5, 70, 6, &PropertyValue::Format32(vec![1])).unwrap();
        assert_eq!(server.pending_events(), 0);
        server.watch_window(5).unwrap();
        server.set_property(5, 70, 6, &PropertyValue::Format32(vec![2])).unwrap();
        assert_eq!(server.poll_event().unwrap(), Some(Event::Property(PropertyEvent { window: 5, atom: 70, deleted: false })));
        assert!(server.wait_event().is_err());
    }

    #[test]
    fn test_take_queued_property() {
        let server = MemoryServer::new();
        server.push_event(Event::Property(PropertyEvent { window: 7, atom: 71, deleted: false }));
        server.push_event(Event::Property(PropertyEvent { window: 5, atom: 72, deleted: false }));
        server.push_event(Event::Property(PropertyEvent { window: 5, atom: 73, deleted: false }));

        assert_eq!(server.take_queued_property(5, &|a| a == 73).unwrap(), None);
        assert_eq!(server.pending_events(), 3);
        let ev = server.take_queued_property(5, &|a| a == 72).unwrap().unwrap();
        assert_eq!(ev.atom, 72);
        assert_eq!(server.pending_events(), 2);
    }
}
