//! The boundary between the protocol engine and the windowing-system binding.
//!
//! Everything the engine does on the wire reduces to reading, writing and deleting properties,
//! sending client messages and pulling notifications off the event queue. [`Transport`] captures
//! exactly that, so the protocol objects can run against a live display through
//! [`crate::X11Transport`] or against the in-memory [`crate::MemoryServer`].
use crate::{Atom, NetwmResult, Size, Window};

/// Raw property payload tagged with its wire format
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Format8(Vec<u8>),
    Format16(Vec<u16>),
    Format32(Vec<u32>),
}

impl PropertyValue {
    /// Wire format in bits
    pub fn format(&self) -> u8 {
        match self {
            PropertyValue::Format8(_) => 8,
            PropertyValue::Format16(_) => 16,
            PropertyValue::Format32(_) => 32,
        }
    }

    /// Number of format-sized items
    pub fn len(&self) -> usize {
        match self {
            PropertyValue::Format8(x) => x.len(),
            PropertyValue::Format16(x) => x.len(),
            PropertyValue::Format32(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A property as read back from a window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub type_: Atom,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(type_: Atom, value: PropertyValue) -> Self {
        Self { type_, value }
    }

    /// 32 bit items, but only when the property has the expected type
    pub fn words(&self, type_: Atom) -> Option<&[u32]> {
        match self.value {
            PropertyValue::Format32(ref x) if self.type_ == type_ => Some(x),
            _ => None,
        }
    }

    /// 8 bit items, but only when the property has the expected type
    pub fn bytes(&self, type_: Atom) -> Option<&[u8]> {
        match self.value {
            PropertyValue::Format8(ref x) if self.type_ == type_ => Some(x),
            _ => None,
        }
    }
}

/// Where a client message is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Sent to the root window with substructure redirect and notify masks so that the manager,
    /// which holds the redirect on root, receives it.
    Root,

    /// Sent straight to the given window with an empty event mask
    Direct(Window),
}

/// A format 32 client message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientMessage {
    pub window: Window,
    pub type_: Atom,
    pub format: u8,
    pub data: [u32; 5],
}

impl ClientMessage {
    pub fn new(window: Window, type_: Atom, data: [u32; 5]) -> Self {
        Self { window, type_, format: 32, data }
    }
}

/// Property change notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyEvent {
    pub window: Window,
    pub atom: Atom,
    pub deleted: bool,
}

/// The subset of windowing-system events the engine understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Property(PropertyEvent),
    ClientMessage(ClientMessage),
    Other,
}

impl Event {
    /// Window the event was reported for
    pub fn window(&self) -> Option<Window> {
        match self {
            Event::Property(ev) => Some(ev.window),
            Event::ClientMessage(ev) => Some(ev.window),
            Event::Other => None,
        }
    }
}

/// Binding-layer operations the protocol objects are built on
///
/// All methods take `&self` so a single connection can be shared through an `Rc` by any number
/// of protocol objects. Writes are fire-and-forget; reads block until the reply arrives.
pub trait Transport {
    /// Root window of the default screen
    fn root(&self) -> Window;

    /// Size in pixels of the default screen
    fn screen_size(&self) -> Size;

    /// Resolve all names in one batch, returning atoms in the same order
    fn intern_atoms(&self, names: &[&str]) -> NetwmResult<Vec<Atom>>;

    /// Read a whole property. `type_` of 0 accepts any type. `None` means the property is absent.
    fn get_property(&self, window: Window, property: Atom, type_: Atom) -> NetwmResult<Option<Property>>;

    /// Replace a property
    fn set_property(&self, window: Window, property: Atom, type_: Atom, value: &PropertyValue) -> NetwmResult<()>;

    fn delete_property(&self, window: Window, property: Atom) -> NetwmResult<()>;

    fn send_client_message(&self, delivery: Delivery, message: ClientMessage) -> NetwmResult<()>;

    /// Ask for property change notifications on the given window
    fn watch_window(&self, window: Window) -> NetwmResult<()>;

    /// Next queued event without blocking
    fn poll_event(&self) -> NetwmResult<Option<Event>>;

    /// Next event, blocking until one arrives
    fn wait_event(&self) -> NetwmResult<Event>;

    /// Remove and return the next queued property notification for `window`, but only when
    /// `accept` recognizes its atom. A notification that is not accepted stays queued in place.
    fn take_queued_property(&self, window: Window, accept: &dyn Fn(Atom) -> bool) -> NetwmResult<Option<PropertyEvent>>;
}
