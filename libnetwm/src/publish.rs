//! Role strategies for state changes that either role may initiate.
//!
//! A manager owns the state and writes properties directly. Anybody else asks the manager with a
//! client message and waits to observe the resulting property change. The strategy is picked once
//! from the role when a protocol object is built.
use tracing::debug;

use crate::{
    codec,
    model::{WINDOW_STATE_ACTION_ADD, WINDOW_STATE_ACTION_REMOVE},
    Atom, Atoms, ClientMessage, Delivery, NetwmResult, Point, PropertyValue, Role, Size, Transport, WinState, Window,
};

/// Root state change a setter wants to publish
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RootChange {
    NumberOfDesktops(u32),
    /// One-based desktop
    CurrentDesktop(u32),
    DesktopGeometry(Size),
    /// Viewport of a single desktop plus the full per-desktop list to publish
    DesktopViewport { viewport: Point, all: Vec<Point> },
    ActiveWindow(Window),
    ShowingDesktop(bool),
}

/// Window state change a setter wants to publish
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum WindowChange {
    /// New values for the bits in `mask` given the currently cached state
    State { state: WinState, mask: WinState, current: WinState },
    /// One-based desktop, `ON_ALL_DESKTOPS`, or 0 to unset
    Desktop(i32),
}

/// What the strategy did with a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Property written, the local cache may follow
    Written,
    /// Request sent, the cache waits for the manager's answer
    Requested,
    /// Nothing to do for this value
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Publisher {
    DirectWriter,
    RequestSender,
}

impl Publisher {
    pub(crate) fn for_role(role: Role) -> Self {
        match role {
            Role::Manager => Publisher::DirectWriter,
            Role::Observer => Publisher::RequestSender,
        }
    }

    pub(crate) fn root<C: Transport + ?Sized>(&self, conn: &C, atoms: &Atoms, change: &RootChange) -> NetwmResult<Outcome> {
        match self {
            Publisher::DirectWriter => write_root(conn, atoms, change),
            Publisher::RequestSender => request_root(conn, atoms, change),
        }
    }

    /// `mapped` is the window's current mapping; an unmapped window has no manager to ask
    pub(crate) fn window<C: Transport + ?Sized>(
        &self, conn: &C, atoms: &Atoms, window: Window, mapped: bool, change: &WindowChange,
    ) -> NetwmResult<Outcome> {
        match self {
            Publisher::RequestSender if mapped => request_window(conn, atoms, window, change),
            _ => write_window(conn, atoms, window, change),
        }
    }
}

fn cardinals(values: Vec<u32>) -> PropertyValue {
    PropertyValue::Format32(values)
}

fn write_root<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, change: &RootChange) -> NetwmResult<Outcome> {
    let root = conn.root();
    match *change {
        RootChange::NumberOfDesktops(n) => conn.set_property(root, atoms._NET_NUMBER_OF_DESKTOPS, atoms.CARDINAL, &cardinals(vec![n]))?,
        RootChange::CurrentDesktop(d) => {
            conn.set_property(root, atoms._NET_CURRENT_DESKTOP, atoms.CARDINAL, &cardinals(vec![d.saturating_sub(1)]))?
        },
        RootChange::DesktopGeometry(size) => {
            conn.set_property(root, atoms._NET_DESKTOP_GEOMETRY, atoms.CARDINAL, &cardinals(vec![size.width, size.height]))?
        },
        RootChange::DesktopViewport { ref all, .. } => {
            let data = all.iter().flat_map(|p| [p.x as u32, p.y as u32]).collect();
            conn.set_property(root, atoms._NET_DESKTOP_VIEWPORT, atoms.CARDINAL, &cardinals(data))?
        },
        RootChange::ActiveWindow(window) => conn.set_property(root, atoms._NET_ACTIVE_WINDOW, atoms.WINDOW, &cardinals(vec![window]))?,
        RootChange::ShowingDesktop(showing) => {
            conn.set_property(root, atoms._NET_SHOWING_DESKTOP, atoms.CARDINAL, &cardinals(vec![showing as u32]))?
        },
    }
    debug!("publish: write: {:?}", change);
    Ok(Outcome::Written)
}

fn request_root<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, change: &RootChange) -> NetwmResult<Outcome> {
    let root = conn.root();
    let message = match *change {
        RootChange::NumberOfDesktops(n) => ClientMessage::new(root, atoms._NET_NUMBER_OF_DESKTOPS, [n, 0, 0, 0, 0]),
        RootChange::CurrentDesktop(d) => ClientMessage::new(root, atoms._NET_CURRENT_DESKTOP, [d.saturating_sub(1), 0, 0, 0, 0]),
        RootChange::DesktopGeometry(size) => ClientMessage::new(root, atoms._NET_DESKTOP_GEOMETRY, [size.width, size.height, 0, 0, 0]),
        RootChange::DesktopViewport { viewport, .. } => {
            ClientMessage::new(root, atoms._NET_DESKTOP_VIEWPORT, [viewport.x as u32, viewport.y as u32, 0, 0, 0])
        },
        RootChange::ActiveWindow(window) => ClientMessage::new(window, atoms._NET_ACTIVE_WINDOW, [0; 5]),
        RootChange::ShowingDesktop(showing) => ClientMessage::new(root, atoms._NET_SHOWING_DESKTOP, [showing as u32, 0, 0, 0, 0]),
    };
    conn.send_client_message(Delivery::Root, message)?;
    debug!("publish: request: {:?}", change);
    Ok(Outcome::Requested)
}

/// State bits and their atoms, in the order they are written
fn state_table(atoms: &Atoms) -> [(WinState, Atom); 13] {
    [
        (WinState::MODAL, atoms._NET_WM_STATE_MODAL),
        (WinState::STICKY, atoms._NET_WM_STATE_STICKY),
        (WinState::MAX_VERT, atoms._NET_WM_STATE_MAXIMIZED_VERT),
        (WinState::MAX_HORIZ, atoms._NET_WM_STATE_MAXIMIZED_HORZ),
        (WinState::SHADED, atoms._NET_WM_STATE_SHADED),
        (WinState::SKIP_TASKBAR, atoms._NET_WM_STATE_SKIP_TASKBAR),
        (WinState::SKIP_PAGER, atoms._NET_WM_STATE_SKIP_PAGER),
        (WinState::HIDDEN, atoms._NET_WM_STATE_HIDDEN),
        (WinState::FULL_SCREEN, atoms._NET_WM_STATE_FULLSCREEN),
        (WinState::KEEP_ABOVE, atoms._NET_WM_STATE_ABOVE),
        (WinState::KEEP_BELOW, atoms._NET_WM_STATE_BELOW),
        (WinState::DEMANDS_ATTENTION, atoms._NET_WM_STATE_DEMANDS_ATTENTION),
        (WinState::STAYS_ON_TOP, atoms._NET_WM_STATE_STAYS_ON_TOP),
    ]
}

/// Atom list for a full state value
pub(crate) fn state_atoms(atoms: &Atoms, state: WinState) -> Vec<Atom> {
    state_table(atoms).iter().filter(|(flag, _)| state.contains(*flag)).map(|(_, atom)| *atom).collect()
}

fn write_window<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, window: Window, change: &WindowChange) -> NetwmResult<Outcome> {
    match *change {
        WindowChange::State { state, mask, current } => {
            let next = (current & !mask) | (state & mask);
            conn.set_property(window, atoms._NET_WM_STATE, atoms.ATOM, &cardinals(state_atoms(atoms, next)))?;
        },
        WindowChange::Desktop(desktop) => match codec::desktop_to_wire(desktop) {
            Some(wire) => conn.set_property(window, atoms._NET_WM_DESKTOP, atoms.CARDINAL, &cardinals(vec![wire]))?,
            None => conn.delete_property(window, atoms._NET_WM_DESKTOP)?,
        },
    }
    debug!("publish: write: window: {}, {:?}", window, change);
    Ok(Outcome::Written)
}

fn request_window<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, window: Window, change: &WindowChange) -> NetwmResult<Outcome> {
    match *change {
        WindowChange::State { state, mask, current } => {
            let messages = state_requests(atoms, state, mask, current);
            if messages.is_empty() {
                return Ok(Outcome::Ignored);
            }
            for data in messages {
                conn.send_client_message(Delivery::Root, ClientMessage::new(window, atoms._NET_WM_STATE, data))?;
            }
        },
        WindowChange::Desktop(desktop) => match codec::desktop_to_wire(desktop) {
            Some(wire) => {
                conn.send_client_message(Delivery::Root, ClientMessage::new(window, atoms._NET_WM_DESKTOP, [wire, 0, 0, 0, 0]))?
            },
            None => return Ok(Outcome::Ignored),
        },
    }
    debug!("publish: request: window: {}, {:?}", window, change);
    Ok(Outcome::Requested)
}

/// One `_NET_WM_STATE` message per bit that actually changes
///
/// Both maximize bits changing the same way travel in one message so the manager applies them
/// together.
fn state_requests(atoms: &Atoms, state: WinState, mask: WinState, current: WinState) -> Vec<[u32; 5]> {
    let changed = (state ^ current) & mask;
    let action = |flag: WinState| if state.contains(flag) { WINDOW_STATE_ACTION_ADD } else { WINDOW_STATE_ACTION_REMOVE };
    let mut messages = Vec::new();

    let mut rest = changed;
    if changed.contains(WinState::MAX) && state.contains(WinState::MAX_VERT) == state.contains(WinState::MAX_HORIZ) {
        messages.push([
            action(WinState::MAX_VERT),
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            atoms._NET_WM_STATE_MAXIMIZED_HORZ,
            0,
            0,
        ]);
        rest.remove(WinState::MAX);
    }
    for (flag, atom) in state_table(atoms) {
        if rest.contains(flag) {
            messages.push([action(flag), atom, 0, 0, 0]);
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryServer;

    #[test]
    fn test_state_requests_one_per_bit() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        let mask = WinState::SHADED | WinState::STICKY;
        let messages = state_requests(&atoms, mask, mask, WinState::empty());
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|x| x[0] == WINDOW_STATE_ACTION_ADD && x[2] == 0));

        // unchanged bits are not requested
        assert!(state_requests(&atoms, WinState::SHADED, WinState::SHADED, WinState::SHADED).is_empty());
    }

    #[test]
    fn test_state_requests_pair_maximize() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        let messages = state_requests(&atoms, WinState::MAX, WinState::MAX | WinState::SHADED, WinState::SHADED);
        assert_eq!(
            messages,
            vec![
                [WINDOW_STATE_ACTION_ADD, atoms._NET_WM_STATE_MAXIMIZED_VERT, atoms._NET_WM_STATE_MAXIMIZED_HORZ, 0, 0],
                [WINDOW_STATE_ACTION_REMOVE, atoms._NET_WM_STATE_SHADED, 0, 0, 0],
            ]
        );

        // opposite directions stay separate
        let messages = state_requests(&atoms, WinState::MAX_VERT, WinState::MAX, WinState::MAX_HORIZ);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_observer_root_requests() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        let outcome = Publisher::RequestSender.root(&server, &atoms, &RootChange::CurrentDesktop(3)).unwrap();
        assert_eq!(outcome, Outcome::Requested);
        let sent = server.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delivery, Delivery::Root);
        assert_eq!(sent[0].message.type_, atoms._NET_CURRENT_DESKTOP);
        assert_eq!(sent[0].message.data[0], 2);
        assert_eq!(server.property(server.root(), atoms._NET_CURRENT_DESKTOP), None);
    }
}
