//! [`Transport`] over a real X11 connection using x11rb
use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::{debug, trace};
use x11rb::{
    connection::Connection,
    protocol::{
        self,
        xproto::{self, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _, EventMask, PropMode},
    },
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
};

use crate::{Atom, ClientMessage, Delivery, Event, NetwmResult, Property, PropertyEvent, PropertyValue, Size, Transport, Window};

/// X11 connection implementing the engine's binding layer
///
/// Events pulled off the connection while looking for queued property notifications are kept in
/// a local queue and returned by later polls in their original order.
pub struct X11Transport {
    conn: RustConnection,
    screen: usize,
    root: Window,
    size: Size,
    pending: RefCell<VecDeque<Event>>,
}

impl X11Transport {
    /// Connect to the X11 server
    ///
    /// ### Arguments
    /// * `display` - display name to connect to, `None` uses `$DISPLAY`
    ///
    /// ### Examples
    /// ```ignore
    /// use libnetwm::prelude::*;
    /// let conn = X11Transport::connect(None).unwrap();
    /// ```
    pub fn connect(display: Option<&str>) -> NetwmResult<Self> {
        let (conn, screen) = x11rb::connect(display)?;
        let (root, size) = {
            let screen = &conn.setup().roots[screen];
            (screen.root, Size::new(screen.width_in_pixels as u32, screen.height_in_pixels as u32))
        };
        debug!("connect: screen: {}, root: {}, w: {}, h: {}", screen, root, size.width, size.height);
        Ok(Self { conn, screen, root, size, pending: RefCell::new(VecDeque::new()) })
    }

    /// Default screen number
    pub fn screen(&self) -> usize {
        self.screen
    }

    /// Move every event the server has already delivered into the local queue
    fn drain_connection(&self) -> NetwmResult<()> {
        while let Some(event) = self.conn.poll_for_event()? {
            self.pending.borrow_mut().push_back(convert(event));
        }
        Ok(())
    }
}

fn convert(event: protocol::Event) -> Event {
    match event {
        protocol::Event::PropertyNotify(ev) => {
            Event::Property(PropertyEvent { window: ev.window, atom: ev.atom, deleted: ev.state == xproto::Property::DELETE })
        },
        protocol::Event::ClientMessage(ev) => Event::ClientMessage(ClientMessage {
            window: ev.window,
            type_: ev.type_,
            format: ev.format,
            data: ev.data.as_data32(),
        }),
        _ => Event::Other,
    }
}

impl Transport for X11Transport {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> Size {
        self.size
    }

    fn intern_atoms(&self, names: &[&str]) -> NetwmResult<Vec<Atom>> {
        // Send every request before waiting on the first reply
        let cookies = names.iter().map(|x| self.conn.intern_atom(false, x.as_bytes())).collect::<Result<Vec<_>, _>>()?;
        let mut atoms = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            atoms.push(cookie.reply()?.atom);
        }
        debug!("intern_atoms: atoms: {}", atoms.len());
        Ok(atoms)
    }

    fn get_property(&self, window: Window, property: Atom, type_: Atom) -> NetwmResult<Option<Property>> {
        let reply = self.conn.get_property(false, window, property, type_, 0, u32::MAX)?.reply()?;
        if reply.type_ == u32::from(xproto::AtomEnum::NONE) {
            return Ok(None);
        }
        let value = match reply.format {
            8 => PropertyValue::Format8(reply.value8().map(|x| x.collect()).unwrap_or_default()),
            16 => PropertyValue::Format16(reply.value16().map(|x| x.collect()).unwrap_or_default()),
            _ => PropertyValue::Format32(reply.value32().map(|x| x.collect()).unwrap_or_default()),
        };
        trace!("get_property: win: {}, atom: {}, type: {}, len: {}", window, property, reply.type_, value.len());
        Ok(Some(Property::new(reply.type_, value)))
    }

    fn set_property(&self, window: Window, property: Atom, type_: Atom, value: &PropertyValue) -> NetwmResult<()> {
        match value {
            PropertyValue::Format8(x) => self.conn.change_property8(PropMode::REPLACE, window, property, type_, x)?,
            PropertyValue::Format16(x) => self.conn.change_property16(PropMode::REPLACE, window, property, type_, x)?,
            PropertyValue::Format32(x) => self.conn.change_property32(PropMode::REPLACE, window, property, type_, x)?,
        };
        self.conn.flush()?;
        trace!("set_property: win: {}, atom: {}, len: {}", window, property, value.len());
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> NetwmResult<()> {
        self.conn.delete_property(window, property)?;
        self.conn.flush()?;
        Ok(())
    }

    fn send_client_message(&self, delivery: Delivery, message: ClientMessage) -> NetwmResult<()> {
        let (destination, mask) = match delivery {
            Delivery::Root => (self.root, EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY),
            Delivery::Direct(window) => (window, EventMask::NO_EVENT),
        };
        let msg = ClientMessageEvent::new(message.format, message.window, message.type_, message.data);
        self.conn.send_event(false, destination, mask, &msg)?;
        self.conn.flush()?;
        debug!("send_event: win: {}, dest: {}, type: {}", message.window, destination, message.type_);
        Ok(())
    }

    fn watch_window(&self, window: Window) -> NetwmResult<()> {
        let aux = ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE);
        self.conn.change_window_attributes(window, &aux)?;
        self.conn.flush()?;
        Ok(())
    }

    fn poll_event(&self) -> NetwmResult<Option<Event>> {
        if let Some(event) = self.pending.borrow_mut().pop_front() {
            return Ok(Some(event));
        }
        Ok(self.conn.poll_for_event()?.map(convert))
    }

    fn wait_event(&self) -> NetwmResult<Event> {
        if let Some(event) = self.pending.borrow_mut().pop_front() {
            return Ok(event);
        }
        Ok(convert(self.conn.wait_for_event()?))
    }

    fn take_queued_property(&self, window: Window, accept: &dyn Fn(Atom) -> bool) -> NetwmResult<Option<PropertyEvent>> {
        self.drain_connection()?;
        let mut pending = self.pending.borrow_mut();
        let next = pending.iter().enumerate().find_map(|(i, x)| match x {
            Event::Property(ev) if ev.window == window => Some((i, *ev)),
            _ => None,
        });
        match next {
            Some((i, ev)) if accept(ev.atom) => {
                pending.remove(i);
                Ok(Some(ev))
            },
            _ => Ok(None),
        }
    }
}
