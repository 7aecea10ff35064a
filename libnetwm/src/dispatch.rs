//! Change-Event Dispatcher
//!
//! Maps incoming notifications to dirty field masks and decodes the client messages a manager
//! receives into typed requests. Property notifications queued behind the first one for the same
//! window are folded into a single dirty mask so a burst of writes costs one refresh.
use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use crate::{
    codec,
    model::{WINDOW_STATE_ACTION_ADD, WINDOW_STATE_ACTION_REMOVE, WINDOW_STATE_ACTION_TOGGLE},
    Atom, Atoms, ClientMessage, Dirty, Direction, MoveResizeMask, NetwmResult, Point, Properties, Properties2, PropertyEvent, Size,
    Transport, WinGravity, WinState, Window,
};

/// Dirty fields for a property on the root window
pub(crate) fn root_property_dirty(atoms: &Atoms, atom: Atom) -> Option<Dirty> {
    let properties = match atom {
        _ if atom == atoms._NET_SUPPORTED => Properties::SUPPORTED,
        _ if atom == atoms._NET_CLIENT_LIST => Properties::CLIENT_LIST,
        _ if atom == atoms._NET_CLIENT_LIST_STACKING => Properties::CLIENT_LIST_STACKING,
        _ if atom == atoms._NET_NUMBER_OF_DESKTOPS => Properties::NUMBER_OF_DESKTOPS,
        _ if atom == atoms._NET_DESKTOP_GEOMETRY => Properties::DESKTOP_GEOMETRY,
        _ if atom == atoms._NET_DESKTOP_VIEWPORT => Properties::DESKTOP_VIEWPORT,
        _ if atom == atoms._NET_CURRENT_DESKTOP => Properties::CURRENT_DESKTOP,
        _ if atom == atoms._NET_DESKTOP_NAMES => Properties::DESKTOP_NAMES,
        _ if atom == atoms._NET_ACTIVE_WINDOW => Properties::ACTIVE_WINDOW,
        _ if atom == atoms._NET_WORKAREA => Properties::WORK_AREA,
        _ if atom == atoms._NET_SUPPORTING_WM_CHECK => Properties::SUPPORTING_WM_CHECK,
        _ if atom == atoms._NET_VIRTUAL_ROOTS => Properties::VIRTUAL_ROOTS,
        _ if atom == atoms._KDE_NET_SYSTEM_TRAY_WINDOWS => Properties::KDE_SYSTEM_TRAY_WINDOWS,
        _ if atom == atoms._NET_SHOWING_DESKTOP => return Some(Properties2::SHOWING_DESKTOP.into()),
        _ => return None,
    };
    Some(properties.into())
}

/// Dirty fields for a property on an application window
///
/// Legacy ICCCM hints map onto the field they back: `WM_NAME` and `WM_ICON_NAME` are the
/// fallbacks for the UTF-8 names and `WM_STATE` is the mapping state.
pub(crate) fn window_property_dirty(atoms: &Atoms, atom: Atom) -> Option<Properties> {
    let properties = match atom {
        _ if atom == atoms._NET_WM_NAME || atom == atoms.WM_NAME => Properties::WM_NAME,
        _ if atom == atoms._NET_WM_VISIBLE_NAME => Properties::WM_VISIBLE_NAME,
        _ if atom == atoms._NET_WM_ICON_NAME || atom == atoms.WM_ICON_NAME => Properties::WM_ICON_NAME,
        _ if atom == atoms._NET_WM_VISIBLE_ICON_NAME => Properties::WM_VISIBLE_ICON_NAME,
        _ if atom == atoms._NET_WM_DESKTOP => Properties::WM_DESKTOP,
        _ if atom == atoms._NET_WM_WINDOW_TYPE => Properties::WM_WINDOW_TYPE,
        _ if atom == atoms._NET_WM_STATE => Properties::WM_STATE,
        _ if atom == atoms._NET_WM_STRUT => Properties::WM_STRUT,
        _ if atom == atoms._NET_WM_ICON_GEOMETRY => Properties::WM_ICON_GEOMETRY,
        _ if atom == atoms._NET_WM_ICON => Properties::WM_ICON,
        _ if atom == atoms._NET_WM_PID => Properties::WM_PID,
        _ if atom == atoms._NET_WM_HANDLED_ICONS => Properties::WM_HANDLED_ICONS,
        _ if atom == atoms._KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR => Properties::KDE_SYSTEM_TRAY_WIN_FOR,
        _ if atom == atoms._KDE_NET_WM_FRAME_STRUT || atom == atoms._NET_FRAME_EXTENTS => Properties::WM_KDE_FRAME_STRUT,
        _ if atom == atoms.WM_STATE => Properties::XA_WM_STATE,
        _ => return None,
    };
    Some(properties)
}

/// Fold the first notification and every recognized notification queued right behind it for the
/// same window into one mask
///
/// An unrecognized first atom returns the default mask without touching the queue.
pub(crate) fn coalesce<C, D>(conn: &C, first: &PropertyEvent, classify: impl Fn(Atom) -> Option<D>) -> NetwmResult<D>
where
    C: Transport + ?Sized,
    D: Default + std::ops::BitOrAssign,
{
    let mut dirty = match classify(first.atom) {
        Some(dirty) => dirty,
        None => return Ok(D::default()),
    };
    let mut folded = 0;
    while let Some(ev) = conn.take_queued_property(first.window, &|atom| classify(atom).is_some())? {
        if let Some(more) = classify(ev.atom) {
            dirty |= more;
            folded += 1;
        }
    }
    if folded > 0 {
        trace!("coalesce: window: {}, folded: {}", first.window, folded);
    }
    Ok(dirty)
}

/// Dirty fields of a root property notification including the queued ones behind it
pub(crate) fn root_event_dirty<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, ev: &PropertyEvent) -> NetwmResult<Dirty> {
    coalesce(conn, ev, |atom| root_property_dirty(atoms, atom))
}

/// Dirty fields of a window property notification including the queued ones behind it
pub fn window_event_dirty<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, ev: &PropertyEvent) -> NetwmResult<Properties> {
    coalesce(conn, ev, |atom| window_property_dirty(atoms, atom))
}

/// Kinds of requests an observer can send to the root window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootRequestKind {
    NumberOfDesktops,
    DesktopGeometry,
    DesktopViewport,
    CurrentDesktop,
    ActiveWindow,
    ShowingDesktop,
    CloseWindow,
    MoveResize,
    MoveResizeWindow,
    PingReply,
}

/// Decoded root window request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRequest {
    NumberOfDesktops(u32),
    DesktopGeometry(Size),
    /// Viewport for the current desktop
    DesktopViewport(Point),
    /// One-based desktop to switch to
    CurrentDesktop(u32),
    ActiveWindow(Window),
    ShowingDesktop(bool),
    CloseWindow(Window),
    MoveResize { window: Window, x_root: i32, y_root: i32, direction: Direction },
    MoveResizeWindow { window: Window, gravity: WinGravity, mask: MoveResizeMask, x: i32, y: i32, width: u32, height: u32 },
    PingReply { window: Window, timestamp: u32 },
}

impl RootRequest {
    pub fn kind(&self) -> RootRequestKind {
        match self {
            RootRequest::NumberOfDesktops(_) => RootRequestKind::NumberOfDesktops,
            RootRequest::DesktopGeometry(_) => RootRequestKind::DesktopGeometry,
            RootRequest::DesktopViewport(_) => RootRequestKind::DesktopViewport,
            RootRequest::CurrentDesktop(_) => RootRequestKind::CurrentDesktop,
            RootRequest::ActiveWindow(_) => RootRequestKind::ActiveWindow,
            RootRequest::ShowingDesktop(_) => RootRequestKind::ShowingDesktop,
            RootRequest::CloseWindow(_) => RootRequestKind::CloseWindow,
            RootRequest::MoveResize { .. } => RootRequestKind::MoveResize,
            RootRequest::MoveResizeWindow { .. } => RootRequestKind::MoveResizeWindow,
            RootRequest::PingReply { .. } => RootRequestKind::PingReply,
        }
    }

    /// Field the request asks to change
    pub fn dirty(&self) -> Dirty {
        match self {
            RootRequest::NumberOfDesktops(_) => Properties::NUMBER_OF_DESKTOPS.into(),
            RootRequest::DesktopGeometry(_) => Properties::DESKTOP_GEOMETRY.into(),
            RootRequest::DesktopViewport(_) => Properties::DESKTOP_VIEWPORT.into(),
            RootRequest::CurrentDesktop(_) => Properties::CURRENT_DESKTOP.into(),
            RootRequest::ActiveWindow(_) => Properties::ACTIVE_WINDOW.into(),
            RootRequest::ShowingDesktop(_) => Properties2::SHOWING_DESKTOP.into(),
            RootRequest::CloseWindow(_) => Properties::CLOSE_WINDOW.into(),
            RootRequest::MoveResize { .. } => Properties::WM_MOVE_RESIZE.into(),
            RootRequest::MoveResizeWindow { .. } => Properties2::MOVE_RESIZE_WINDOW.into(),
            RootRequest::PingReply { .. } => Properties::WM_PING.into(),
        }
    }
}

/// Decode a client message received on the root window
///
/// Messages that are not format 32 or carry an unknown type are not requests.
pub fn decode_root_request(atoms: &Atoms, msg: &ClientMessage) -> Option<RootRequest> {
    if msg.format != 32 {
        return None;
    }
    let d = msg.data;
    let request = match msg.type_ {
        _ if msg.type_ == atoms._NET_NUMBER_OF_DESKTOPS => RootRequest::NumberOfDesktops(d[0]),
        _ if msg.type_ == atoms._NET_DESKTOP_GEOMETRY => RootRequest::DesktopGeometry(Size::new(d[0], d[1])),
        _ if msg.type_ == atoms._NET_DESKTOP_VIEWPORT => RootRequest::DesktopViewport(Point::new(d[0] as i32, d[1] as i32)),
        _ if msg.type_ == atoms._NET_CURRENT_DESKTOP => RootRequest::CurrentDesktop(d[0].saturating_add(1)),
        _ if msg.type_ == atoms._NET_ACTIVE_WINDOW => RootRequest::ActiveWindow(msg.window),
        _ if msg.type_ == atoms._NET_SHOWING_DESKTOP => RootRequest::ShowingDesktop(d[0] != 0),
        _ if msg.type_ == atoms._NET_CLOSE_WINDOW => RootRequest::CloseWindow(msg.window),
        _ if msg.type_ == atoms._NET_WM_MOVERESIZE => {
            let direction = match Direction::try_from(d[2]) {
                Ok(direction) => direction,
                Err(_) => {
                    trace!("decode_root_request: unknown direction: {}", d[2]);
                    return None;
                },
            };
            RootRequest::MoveResize { window: msg.window, x_root: d[0] as i32, y_root: d[1] as i32, direction }
        },
        _ if msg.type_ == atoms._NET_MOVERESIZE_WINDOW => RootRequest::MoveResizeWindow {
            window: msg.window,
            gravity: WinGravity::from(d[0] & 0xff),
            mask: MoveResizeMask::from_bits_truncate(d[0]),
            x: d[1] as i32,
            y: d[2] as i32,
            width: d[3],
            height: d[4],
        },
        _ if msg.type_ == atoms.WM_PROTOCOLS && d[0] == atoms._NET_WM_PING => RootRequest::PingReply { window: d[2], timestamp: d[1] },
        _ => return None,
    };
    Some(request)
}

/// Kinds of requests an observer can send about an application window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowRequestKind {
    State,
    Desktop,
}

/// Decoded window request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    /// New values of the bits in `mask` for the window
    State { window: Window, state: WinState, mask: WinState },
    /// One-based desktop or [`crate::ON_ALL_DESKTOPS`]
    Desktop { window: Window, desktop: i32 },
}

impl WindowRequest {
    pub fn kind(&self) -> WindowRequestKind {
        match self {
            WindowRequest::State { .. } => WindowRequestKind::State,
            WindowRequest::Desktop { .. } => WindowRequestKind::Desktop,
        }
    }

    pub fn dirty(&self) -> Properties {
        match self {
            WindowRequest::State { .. } => Properties::WM_STATE,
            WindowRequest::Desktop { .. } => Properties::WM_DESKTOP,
        }
    }
}

/// State bit carried by a `_NET_WM_STATE` atom
pub(crate) fn state_flag(atoms: &Atoms, atom: Atom) -> Option<WinState> {
    let state = match atom {
        _ if atom == atoms._NET_WM_STATE_MODAL => WinState::MODAL,
        _ if atom == atoms._NET_WM_STATE_STICKY => WinState::STICKY,
        _ if atom == atoms._NET_WM_STATE_MAXIMIZED_VERT => WinState::MAX_VERT,
        _ if atom == atoms._NET_WM_STATE_MAXIMIZED_HORZ => WinState::MAX_HORIZ,
        _ if atom == atoms._NET_WM_STATE_SHADED => WinState::SHADED,
        _ if atom == atoms._NET_WM_STATE_SKIP_TASKBAR => WinState::SKIP_TASKBAR,
        _ if atom == atoms._NET_WM_STATE_SKIP_PAGER => WinState::SKIP_PAGER,
        _ if atom == atoms._NET_WM_STATE_HIDDEN => WinState::HIDDEN,
        _ if atom == atoms._NET_WM_STATE_FULLSCREEN => WinState::FULL_SCREEN,
        _ if atom == atoms._NET_WM_STATE_ABOVE => WinState::KEEP_ABOVE,
        _ if atom == atoms._NET_WM_STATE_BELOW => WinState::KEEP_BELOW,
        _ if atom == atoms._NET_WM_STATE_DEMANDS_ATTENTION => WinState::DEMANDS_ATTENTION,
        _ if atom == atoms._NET_WM_STATE_STAYS_ON_TOP => WinState::STAYS_ON_TOP,
        _ => return None,
    };
    Some(state)
}

/// Decode a client message about an application window, given its current state
pub fn decode_window_request(atoms: &Atoms, msg: &ClientMessage, current: WinState) -> Option<WindowRequest> {
    if msg.format != 32 {
        return None;
    }
    let d = msg.data;
    if msg.type_ == atoms._NET_WM_STATE {
        let mask = [d[1], d[2]].iter().filter_map(|x| state_flag(atoms, *x)).fold(WinState::empty(), |acc, x| acc | x);
        let state = match d[0] {
            WINDOW_STATE_ACTION_REMOVE => WinState::empty(),
            WINDOW_STATE_ACTION_ADD => mask,
            WINDOW_STATE_ACTION_TOGGLE => (current & mask) ^ mask,
            action => {
                trace!("decode_window_request: unknown state action: {}", action);
                return None;
            },
        };
        return Some(WindowRequest::State { window: msg.window, state, mask });
    }
    if msg.type_ == atoms._NET_WM_DESKTOP {
        return Some(WindowRequest::Desktop { window: msg.window, desktop: codec::desktop_from_wire(d[0]) });
    }
    None
}

/// Policy hooks keyed by request kind
///
/// A manager registers a handler per kind it implements; requests of unregistered kinds are
/// decoded but otherwise dropped.
pub struct RequestHandlers<K, R> {
    handlers: HashMap<K, Box<dyn FnMut(&R)>>,
}

impl<K: Eq + Hash, R> Default for RequestHandlers<K, R> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<K: Eq + Hash, R> RequestHandlers<K, R> {
    /// Install or replace the handler for `kind`
    pub fn register(&mut self, kind: K, handler: impl FnMut(&R) + 'static) {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn unregister(&mut self, kind: &K) {
        self.handlers.remove(kind);
    }

    pub fn is_registered(&self, kind: &K) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Run the handler for `kind`, returning whether one was registered
    pub fn invoke(&mut self, kind: &K, request: &R) -> bool {
        match self.handlers.get_mut(kind) {
            Some(handler) => {
                handler(request);
                true
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, MemoryServer};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (MemoryServer, Atoms) {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        (server, atoms)
    }

    fn prop(window: Window, atom: Atom) -> PropertyEvent {
        PropertyEvent { window, atom, deleted: false }
    }

    #[test]
    fn test_legacy_hints_map_to_fields() {
        let (_, atoms) = setup();
        assert_eq!(window_property_dirty(&atoms, atoms.WM_NAME), Some(Properties::WM_NAME));
        assert_eq!(window_property_dirty(&atoms, atoms.WM_ICON_NAME), Some(Properties::WM_ICON_NAME));
        assert_eq!(window_property_dirty(&atoms, atoms.WM_STATE), Some(Properties::XA_WM_STATE));
        assert_eq!(window_property_dirty(&atoms, atoms._NET_FRAME_EXTENTS), Some(Properties::WM_KDE_FRAME_STRUT));
        assert_eq!(window_property_dirty(&atoms, atoms._NET_CLIENT_LIST), None);
        assert_eq!(root_property_dirty(&atoms, atoms._NET_SHOWING_DESKTOP), Some(Properties2::SHOWING_DESKTOP.into()));
    }

    #[test]
    fn test_coalesce_folds_queued_changes() {
        let (server, atoms) = setup();
        server.push_event(Event::Property(prop(9, atoms._NET_WM_ICON)));
        server.push_event(Event::Property(prop(9, atoms._NET_WM_DESKTOP)));
        server.push_event(Event::Property(prop(4, atoms._NET_WM_PID)));

        let dirty = window_event_dirty(&server, &atoms, &prop(9, atoms._NET_WM_NAME)).unwrap();
        assert_eq!(dirty, Properties::WM_NAME | Properties::WM_ICON | Properties::WM_DESKTOP);
        assert_eq!(server.pending_events(), 1);
    }

    #[test]
    fn test_coalesce_stops_at_unrecognized() {
        let (server, atoms) = setup();
        server.push_event(Event::Property(prop(9, atoms._NET_CLIENT_LIST)));
        server.push_event(Event::Property(prop(9, atoms._NET_WM_ICON)));

        let dirty = window_event_dirty(&server, &atoms, &prop(9, atoms._NET_WM_NAME)).unwrap();
        assert_eq!(dirty, Properties::WM_NAME);
        assert_eq!(server.pending_events(), 2);

        let dirty = window_event_dirty(&server, &atoms, &prop(9, atoms._NET_CLIENT_LIST)).unwrap();
        assert!(dirty.is_empty());
        assert_eq!(server.pending_events(), 2);
    }

    #[test]
    fn test_decode_root_requests() {
        let (_, atoms) = setup();
        let msg = ClientMessage::new(0x100, atoms._NET_CURRENT_DESKTOP, [2, 0, 0, 0, 0]);
        assert_eq!(decode_root_request(&atoms, &msg), Some(RootRequest::CurrentDesktop(3)));

        let msg = ClientMessage::new(42, atoms._NET_WM_MOVERESIZE, [10, 20, 8, 0, 0]);
        assert_eq!(
            decode_root_request(&atoms, &msg),
            Some(RootRequest::MoveResize { window: 42, x_root: 10, y_root: 20, direction: Direction::Move })
        );
        let msg = ClientMessage::new(42, atoms._NET_WM_MOVERESIZE, [10, 20, 11, 0, 0]);
        assert_eq!(decode_root_request(&atoms, &msg), None);

        let msg = ClientMessage::new(42, atoms._NET_MOVERESIZE_WINDOW, [5 | (1 << 8) | (1 << 11), 7, 0, 0, 300]);
        match decode_root_request(&atoms, &msg) {
            Some(RootRequest::MoveResizeWindow { gravity, mask, x, height, .. }) => {
                assert_eq!(gravity, WinGravity::Center);
                assert_eq!(mask, MoveResizeMask::X | MoveResizeMask::HEIGHT);
                assert_eq!(x, 7);
                assert_eq!(height, 300);
            },
            other => panic!("unexpected: {:?}", other),
        }

        let mut msg = ClientMessage::new(0x100, atoms._NET_NUMBER_OF_DESKTOPS, [4, 0, 0, 0, 0]);
        msg.format = 8;
        assert_eq!(decode_root_request(&atoms, &msg), None);
    }

    #[test]
    fn test_decode_state_requests() {
        let (_, atoms) = setup();
        let add = ClientMessage::new(
            7,
            atoms._NET_WM_STATE,
            [WINDOW_STATE_ACTION_ADD, atoms._NET_WM_STATE_MAXIMIZED_VERT, atoms._NET_WM_STATE_MAXIMIZED_HORZ, 0, 0],
        );
        assert_eq!(
            decode_window_request(&atoms, &add, WinState::empty()),
            Some(WindowRequest::State { window: 7, state: WinState::MAX, mask: WinState::MAX })
        );

        let toggle = ClientMessage::new(7, atoms._NET_WM_STATE, [WINDOW_STATE_ACTION_TOGGLE, atoms._NET_WM_STATE_SHADED, 0, 0, 0]);
        assert_eq!(
            decode_window_request(&atoms, &toggle, WinState::SHADED),
            Some(WindowRequest::State { window: 7, state: WinState::empty(), mask: WinState::SHADED })
        );

        let unknown = ClientMessage::new(7, atoms._NET_WM_STATE, [WINDOW_STATE_ACTION_REMOVE, 12345, 0, 0, 0]);
        assert_eq!(
            decode_window_request(&atoms, &unknown, WinState::SHADED),
            Some(WindowRequest::State { window: 7, state: WinState::empty(), mask: WinState::empty() })
        );

        let desktop = ClientMessage::new(7, atoms._NET_WM_DESKTOP, [0xFFFF_FFFF, 0, 0, 0, 0]);
        assert_eq!(decode_window_request(&atoms, &desktop, WinState::empty()), Some(WindowRequest::Desktop { window: 7, desktop: -1 }));
    }

    #[test]
    fn test_request_handlers() {
        let seen = Rc::new(RefCell::new(vec![]));
        let mut handlers: RequestHandlers<RootRequestKind, RootRequest> = RequestHandlers::default();
        let sink = seen.clone();
        handlers.register(RootRequestKind::CloseWindow, move |req| sink.borrow_mut().push(*req));

        assert!(handlers.invoke(&RootRequestKind::CloseWindow, &RootRequest::CloseWindow(5)));
        assert!(!handlers.invoke(&RootRequestKind::ActiveWindow, &RootRequest::ActiveWindow(5)));
        assert_eq!(*seen.borrow(), vec![RootRequest::CloseWindow(5)]);
        handlers.unregister(&RootRequestKind::CloseWindow);
        assert!(!handlers.is_registered(&RootRequestKind::CloseWindow));
    }
}
