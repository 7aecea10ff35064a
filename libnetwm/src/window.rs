//! Window Protocol Object
//!
//! [`WinInfo`] caches the per-window hints of one application window: names, desktop, type,
//! state, strut, icons, pid and the frame extents the manager decorates it with. Construction
//! performs no I/O; fields are read on demand through [`WinInfo::update`], normally driven by
//! [`WinInfo::event`].
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    codec::{self, Decoded},
    dispatch::{self, decode_window_request, RequestHandlers, WindowRequest, WindowRequestKind},
    publish::{Outcome, Publisher, WindowChange},
    Atom, Atoms, Event, Icon, MappingState, NetwmError, NetwmResult, Properties, Property, PropertyValue, Rect, Role, Strut, Transport,
    WinState, WinType, Window,
};

/// Window Protocol Object, see the module docs
pub struct WinInfo<C: Transport> {
    conn: Rc<C>,
    atoms: Rc<Atoms>,
    window: Window,
    role: Role,
    publisher: Publisher,
    properties: Properties,
    mapping_state: MappingState,
    mapping_state_dirty: bool,
    name: String,
    visible_name: String,
    icon_name: String,
    visible_icon_name: String,
    desktop: i32,
    window_type: WinType,
    state: WinState,
    strut: Strut,
    icon_geometry: Rect,
    icons: Vec<Icon>,
    pid: u32,
    handled_icons: bool,
    tray_for: Window,
    frame_strut: Strut,
    handlers: RequestHandlers<WindowRequestKind, WindowRequest>,
}

impl<C: Transport> WinInfo<C> {
    /// Create the object without touching the server
    ///
    /// ### Arguments
    /// * `window` - application window described by this object
    /// * `role` - manager or observer
    /// * `properties` - fields to read and track
    pub fn new(conn: Rc<C>, atoms: Rc<Atoms>, window: Window, role: Role, properties: Properties) -> Self {
        Self {
            conn,
            atoms,
            window,
            role,
            publisher: Publisher::for_role(role),
            properties,
            mapping_state: MappingState::Withdrawn,
            mapping_state_dirty: true,
            name: String::new(),
            visible_name: String::new(),
            icon_name: String::new(),
            visible_icon_name: String::new(),
            desktop: 0,
            window_type: WinType::Unknown,
            state: WinState::empty(),
            strut: Strut::default(),
            icon_geometry: Rect::default(),
            icons: vec![],
            pid: 0,
            handled_icons: false,
            tray_for: 0,
            frame_strut: Strut::default(),
            handlers: RequestHandlers::default(),
        }
    }

    /// Create the object and read every subscribed field
    ///
    /// ### Examples
    /// ```ignore
    /// let win = WinInfo::fetch(conn, atoms, id, Role::Observer, Properties::WM_NAME | Properties::WM_DESKTOP)?;
    /// println!("{} on {}", win.name(), win.desktop());
    /// ```
    pub fn fetch(conn: Rc<C>, atoms: Rc<Atoms>, window: Window, role: Role, properties: Properties) -> NetwmResult<Self> {
        let mut info = Self::new(conn, atoms, window, role, properties);
        info.update(properties)?;
        Ok(info)
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    fn manager_only(&self, op: &'static str) -> NetwmResult<()> {
        match self.role {
            Role::Manager => Ok(()),
            Role::Observer => Err(NetwmError::ManagerOnly(op).into()),
        }
    }

    fn read(&self, property: Atom, type_: Atom) -> NetwmResult<Option<Property>> {
        self.conn.get_property(self.window, property, type_)
    }

    fn write(&self, property: Atom, type_: Atom, value: PropertyValue) -> NetwmResult<()> {
        self.conn.set_property(self.window, property, type_, &value)
    }

    fn write_text(&self, property: Atom, text: &str) -> NetwmResult<()> {
        if text.is_empty() {
            return self.conn.delete_property(self.window, property);
        }
        self.write(property, self.atoms.UTF8_STRING, PropertyValue::Format8(text.as_bytes().to_vec()))
    }

    /// Mapping state, read from the server the first time it is needed
    fn current_mapping_state(&mut self) -> NetwmResult<MappingState> {
        if self.mapping_state_dirty {
            self.refresh_mapping_state()?;
        }
        Ok(self.mapping_state)
    }

    fn refresh_mapping_state(&mut self) -> NetwmResult<()> {
        let prop = self.read(self.atoms.WM_STATE, self.atoms.WM_STATE)?;
        codec::cardinal(&prop, self.atoms.WM_STATE).map(MappingState::from_wire).apply(&mut self.mapping_state);
        self.mapping_state_dirty = false;
        Ok(())
    }

    /// Replace or extend the icon list and republish all of it
    pub fn set_icon(&mut self, icon: Icon, replace: bool) -> NetwmResult<()> {
        if replace {
            self.icons.clear();
        }
        self.icons.push(icon);
        let buf = codec::encode_icons(&self.icons);
        debug!("set_icon: window: {}, icons: {}", self.window, self.icons.len());
        self.write(self.atoms._NET_WM_ICON, self.atoms.CARDINAL, PropertyValue::Format32(buf))
    }

    /// Where the window's taskbar entry or icon sits on screen
    pub fn set_icon_geometry(&mut self, geometry: Rect) -> NetwmResult<()> {
        self.icon_geometry = geometry;
        self.write(self.atoms._NET_WM_ICON_GEOMETRY, self.atoms.CARDINAL, PropertyValue::Format32(codec::encode_rect(&geometry)))
    }

    /// Screen edge margins the window reserves
    pub fn set_strut(&mut self, strut: Strut) -> NetwmResult<()> {
        self.strut = strut;
        debug!("set_strut: window: {}, strut: {:?}", self.window, strut);
        self.write(self.atoms._NET_WM_STRUT, self.atoms.CARDINAL, PropertyValue::Format32(codec::encode_strut(&strut)))
    }

    /// Set the UTF-8 title, an empty title removes it
    pub fn set_name(&mut self, name: &str) -> NetwmResult<()> {
        self.name = name.to_string();
        self.write_text(self.atoms._NET_WM_NAME, name)
    }

    /// Title as the manager actually displays it
    pub fn set_visible_name(&mut self, name: &str) -> NetwmResult<()> {
        self.manager_only("set_visible_name")?;
        self.visible_name = name.to_string();
        self.write_text(self.atoms._NET_WM_VISIBLE_NAME, name)
    }

    pub fn set_icon_name(&mut self, name: &str) -> NetwmResult<()> {
        self.icon_name = name.to_string();
        self.write_text(self.atoms._NET_WM_ICON_NAME, name)
    }

    pub fn set_visible_icon_name(&mut self, name: &str) -> NetwmResult<()> {
        self.manager_only("set_visible_icon_name")?;
        self.visible_icon_name = name.to_string();
        self.write_text(self.atoms._NET_WM_VISIBLE_ICON_NAME, name)
    }

    /// Move the window to a one-based desktop or [`crate::ON_ALL_DESKTOPS`]
    ///
    /// An observer asks the manager while the window is mapped and ignores desktop 0 then.
    /// Otherwise the property is written, or removed for desktop 0. Values below
    /// [`crate::ON_ALL_DESKTOPS`] are rejected.
    pub fn set_desktop(&mut self, desktop: i32) -> NetwmResult<()> {
        if desktop < crate::ON_ALL_DESKTOPS {
            return Err(NetwmError::InvalidDesktop(desktop.to_string()).into());
        }
        let mapped = self.current_mapping_state()?.is_mapped();
        let outcome = self.publisher.window(&*self.conn, &self.atoms, self.window, mapped, &WindowChange::Desktop(desktop))?;
        if outcome == Outcome::Written {
            self.desktop = desktop;
        }
        Ok(())
    }

    pub fn set_pid(&mut self, pid: u32) -> NetwmResult<()> {
        self.pid = pid;
        self.write(self.atoms._NET_WM_PID, self.atoms.CARDINAL, PropertyValue::Format32(vec![pid]))
    }

    /// Tell the manager that this client draws the icons of its own windows
    pub fn set_handled_icons(&mut self, handled: bool) -> NetwmResult<()> {
        self.handled_icons = handled;
        if !handled {
            return self.conn.delete_property(self.window, self.atoms._NET_WM_HANDLED_ICONS);
        }
        self.write(self.atoms._NET_WM_HANDLED_ICONS, self.atoms.CARDINAL, PropertyValue::Format32(vec![1]))
    }

    /// Mark the window as a tray icon of `window`, 0 removes the mark
    pub fn set_kde_system_tray_win_for(&mut self, window: Window) -> NetwmResult<()> {
        self.tray_for = window;
        if window == 0 {
            return self.conn.delete_property(self.window, self.atoms._KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR);
        }
        self.write(self.atoms._KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR, self.atoms.WINDOW, PropertyValue::Format32(vec![window]))
    }

    /// Publish the decoration sizes around the client, under both the KDE and EWMH names
    pub fn set_kde_frame_strut(&mut self, strut: Strut) -> NetwmResult<()> {
        self.manager_only("set_kde_frame_strut")?;
        self.frame_strut = strut;
        let buf = codec::encode_strut(&strut);
        self.write(self.atoms._KDE_NET_WM_FRAME_STRUT, self.atoms.CARDINAL, PropertyValue::Format32(buf.clone()))?;
        self.write(self.atoms._NET_FRAME_EXTENTS, self.atoms.CARDINAL, PropertyValue::Format32(buf))
    }

    /// Publish the window type
    ///
    /// Extension types are followed by a standard fallback so managers that do not know the
    /// extension still see a sensible type.
    pub fn set_window_type(&mut self, window_type: WinType) -> NetwmResult<()> {
        self.window_type = window_type;
        let list = window_type_atoms(&self.atoms, window_type);
        if list.is_empty() {
            return self.conn.delete_property(self.window, self.atoms._NET_WM_WINDOW_TYPE);
        }
        self.write(self.atoms._NET_WM_WINDOW_TYPE, self.atoms.ATOM, PropertyValue::Format32(list))
    }

    /// Set the bits in `mask` to their values in `state`
    ///
    /// An observer asks the manager with one request per changing bit while the window is
    /// mapped. A manager, or an observer of an unmapped window, writes the full state list.
    pub fn set_state(&mut self, state: WinState, mask: WinState) -> NetwmResult<()> {
        if !self.properties.contains(Properties::WM_STATE) {
            self.update_state()?;
        }
        let mapped = self.current_mapping_state()?.is_mapped();
        let change = WindowChange::State { state, mask, current: self.state };
        let outcome = self.publisher.window(&*self.conn, &self.atoms, self.window, mapped, &change)?;
        if outcome == Outcome::Written {
            self.state = (self.state & !mask) | (state & mask);
        }
        Ok(())
    }

    /// Install the manager's policy for one kind of window request
    pub fn on_request(&mut self, kind: WindowRequestKind, handler: impl FnMut(&WindowRequest) + 'static) {
        self.handlers.register(kind, handler);
    }

    /// Process one event, returning the subscribed fields it changed
    ///
    /// Events for other windows are ignored.
    pub fn event(&mut self, event: &Event) -> NetwmResult<Properties> {
        let dirty = match event {
            Event::Property(ev) if ev.window == self.window => {
                let dirty = dispatch::window_event_dirty(&*self.conn, &self.atoms, ev)?;
                self.update(dirty)?;
                dirty
            },
            Event::ClientMessage(msg) if msg.window == self.window && self.role == Role::Manager => {
                match decode_window_request(&self.atoms, msg, self.state) {
                    Some(request) => {
                        trace!("event: window: {}, request: {:?}", self.window, request);
                        self.handlers.invoke(&request.kind(), &request);
                        request.dirty()
                    },
                    None => Properties::empty(),
                }
            },
            _ => Properties::empty(),
        };
        Ok(dirty & self.properties)
    }

    /// Re-read the given fields, limited to the subscription
    ///
    /// `XA_WM_STATE` in `dirty` re-reads the mapping state, whether or not it is subscribed.
    pub fn update(&mut self, dirty: Properties) -> NetwmResult<()> {
        if dirty.is_empty() {
            return Ok(());
        }
        let p = dirty & self.properties;
        let (conn, atoms) = (self.conn.clone(), self.atoms.clone());
        let window = self.window;
        let read = |property: Atom, type_: Atom| conn.get_property(window, property, type_);

        if p.contains(Properties::WM_NAME) {
            let net = codec::utf8(&read(atoms._NET_WM_NAME, atoms.UTF8_STRING)?, atoms.UTF8_STRING);
            self.resolve_text(net, atoms.WM_NAME)?.apply(&mut self.name);
        }
        if p.contains(Properties::WM_VISIBLE_NAME) {
            codec::utf8(&read(atoms._NET_WM_VISIBLE_NAME, atoms.UTF8_STRING)?, atoms.UTF8_STRING).apply(&mut self.visible_name);
        }
        if p.contains(Properties::WM_ICON_NAME) {
            let net = codec::utf8(&read(atoms._NET_WM_ICON_NAME, atoms.UTF8_STRING)?, atoms.UTF8_STRING);
            self.resolve_text(net, atoms.WM_ICON_NAME)?.apply(&mut self.icon_name);
        }
        if p.contains(Properties::WM_VISIBLE_ICON_NAME) {
            codec::utf8(&read(atoms._NET_WM_VISIBLE_ICON_NAME, atoms.UTF8_STRING)?, atoms.UTF8_STRING).apply(&mut self.visible_icon_name);
        }
        if p.contains(Properties::WM_DESKTOP) {
            let prop = read(atoms._NET_WM_DESKTOP, atoms.CARDINAL)?;
            codec::cardinal(&prop, atoms.CARDINAL).map(codec::desktop_from_wire).apply(&mut self.desktop);
        }
        if p.contains(Properties::WM_WINDOW_TYPE) {
            let prop = read(atoms._NET_WM_WINDOW_TYPE, atoms.ATOM)?;
            codec::words(&prop, atoms.ATOM, 0)
                .map(|list| list.iter().find_map(|x| window_type_of(&atoms, *x)).unwrap_or_default())
                .apply(&mut self.window_type);
        }
        if p.contains(Properties::WM_STATE) {
            self.update_state()?;
        }
        if p.contains(Properties::WM_STRUT) {
            let prop = read(atoms._NET_WM_STRUT, atoms.CARDINAL)?;
            strut(&prop, atoms.CARDINAL).apply(&mut self.strut);
        }
        if p.contains(Properties::WM_ICON_GEOMETRY) {
            let prop = read(atoms._NET_WM_ICON_GEOMETRY, atoms.CARDINAL)?;
            codec::words(&prop, atoms.CARDINAL, 4)
                .map(|x| codec::decode_rect(&x).unwrap_or_default())
                .apply(&mut self.icon_geometry);
        }
        if p.contains(Properties::WM_ICON) {
            let prop = read(atoms._NET_WM_ICON, atoms.CARDINAL)?;
            match codec::words(&prop, atoms.CARDINAL, 0) {
                Decoded::Value(buf) => match codec::decode_icons(&buf) {
                    Some(icons) => self.icons = icons,
                    None => trace!("update: window: {}, no valid icon, keeping {}", window, self.icons.len()),
                },
                Decoded::Absent => self.icons.clear(),
                Decoded::Malformed => (),
            }
        }
        if p.contains(Properties::WM_PID) {
            codec::cardinal(&read(atoms._NET_WM_PID, atoms.CARDINAL)?, atoms.CARDINAL).apply(&mut self.pid);
        }
        if p.contains(Properties::WM_HANDLED_ICONS) {
            self.handled_icons = read(atoms._NET_WM_HANDLED_ICONS, 0)?.is_some();
        }
        if p.contains(Properties::KDE_SYSTEM_TRAY_WIN_FOR) {
            let prop = read(atoms._KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR, atoms.WINDOW)?;
            let root = conn.root();
            codec::cardinal(&prop, atoms.WINDOW).map(|x| if x == 0 { root } else { x }).apply(&mut self.tray_for);
        }
        if p.contains(Properties::WM_KDE_FRAME_STRUT) {
            let kde = strut(&read(atoms._KDE_NET_WM_FRAME_STRUT, atoms.CARDINAL)?, atoms.CARDINAL);
            let frame = match kde {
                Decoded::Value(_) => kde,
                _ => strut(&read(atoms._NET_FRAME_EXTENTS, atoms.CARDINAL)?, atoms.CARDINAL),
            };
            frame.apply(&mut self.frame_strut);
        }

        if dirty.contains(Properties::XA_WM_STATE) {
            self.refresh_mapping_state()?;
        }
        trace!("update: window: {}, dirty: {:?}, mapping: {}", window, p, self.mapping_state);
        Ok(())
    }

    fn update_state(&mut self) -> NetwmResult<()> {
        let prop = self.read(self.atoms._NET_WM_STATE, self.atoms.ATOM)?;
        let atoms = &self.atoms;
        codec::words(&prop, atoms.ATOM, 0)
            .map(|list| list.iter().filter_map(|x| dispatch::state_flag(atoms, *x)).fold(WinState::empty(), |acc, x| acc | x))
            .apply(&mut self.state);
        Ok(())
    }

    /// UTF-8 value, falling back to the legacy hint only when the UTF-8 property is absent
    fn resolve_text(&self, net: Decoded<String>, legacy: Atom) -> NetwmResult<Decoded<String>> {
        match net {
            Decoded::Absent => Ok(codec::legacy_text(&self.read(legacy, 0)?, self.atoms.STRING, self.atoms.UTF8_STRING)),
            other => Ok(other),
        }
    }

    /// ICCCM mapping state as of the last update
    pub fn mapping_state(&self) -> MappingState {
        self.mapping_state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visible_name(&self) -> &str {
        &self.visible_name
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    pub fn visible_icon_name(&self) -> &str {
        &self.visible_icon_name
    }

    /// One-based desktop, [`crate::ON_ALL_DESKTOPS`], or 0 when unset
    pub fn desktop(&self) -> i32 {
        self.desktop
    }

    pub fn on_all_desktops(&self) -> bool {
        self.desktop == crate::ON_ALL_DESKTOPS
    }

    pub fn window_type(&self) -> WinType {
        self.window_type
    }

    pub fn state(&self) -> WinState {
        self.state
    }

    pub fn strut(&self) -> Strut {
        self.strut
    }

    pub fn icon_geometry(&self) -> Rect {
        self.icon_geometry
    }

    pub fn icons(&self) -> &[Icon] {
        &self.icons
    }

    /// Icon closest to the requested size
    ///
    /// The smallest icon at least as big as requested wins, else the biggest one. A request for
    /// 0x0 returns the first icon.
    pub fn icon(&self, width: u32, height: u32) -> Option<&Icon> {
        if width == 0 && height == 0 {
            return self.icons.first();
        }
        let area = |x: &&Icon| x.size.width as u64 * x.size.height as u64;
        self.icons
            .iter()
            .filter(|x| x.size.width >= width && x.size.height >= height)
            .min_by_key(area)
            .or_else(|| self.icons.iter().max_by_key(area))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn handled_icons(&self) -> bool {
        self.handled_icons
    }

    /// Window this tray icon belongs to, 0 when it is not a tray icon
    pub fn kde_system_tray_win_for(&self) -> Window {
        self.tray_for
    }

    pub fn kde_frame_strut(&self) -> Strut {
        self.frame_strut
    }

    /// Outer geometry of the frame around a client rectangle
    pub fn frame_geometry(&self, client: Rect) -> Rect {
        client.grow(&self.frame_strut)
    }
}

fn strut(prop: &Option<Property>, cardinal: Atom) -> Decoded<Strut> {
    codec::words(prop, cardinal, 4).map(|x| codec::decode_strut(&x).unwrap_or_default())
}

/// Atoms published for a window type, the extension types carry a standard fallback
pub(crate) fn window_type_atoms(atoms: &Atoms, window_type: WinType) -> Vec<Atom> {
    match window_type {
        WinType::Unknown => vec![],
        WinType::Normal => vec![atoms._NET_WM_WINDOW_TYPE_NORMAL],
        WinType::Desktop => vec![atoms._NET_WM_WINDOW_TYPE_DESKTOP],
        WinType::Dock => vec![atoms._NET_WM_WINDOW_TYPE_DOCK],
        WinType::Toolbar => vec![atoms._NET_WM_WINDOW_TYPE_TOOLBAR],
        WinType::Menu => vec![atoms._NET_WM_WINDOW_TYPE_MENU],
        WinType::Dialog => vec![atoms._NET_WM_WINDOW_TYPE_DIALOG],
        WinType::Override => vec![atoms._KDE_NET_WM_WINDOW_TYPE_OVERRIDE, atoms._NET_WM_WINDOW_TYPE_NORMAL],
        WinType::TopMenu => vec![atoms._KDE_NET_WM_WINDOW_TYPE_TOPMENU, atoms._NET_WM_WINDOW_TYPE_DOCK],
        WinType::Utility => vec![atoms._NET_WM_WINDOW_TYPE_UTILITY, atoms._NET_WM_WINDOW_TYPE_DIALOG],
        WinType::Splash => vec![atoms._NET_WM_WINDOW_TYPE_SPLASH, atoms._NET_WM_WINDOW_TYPE_DOCK],
    }
}

/// Window type named by an atom
pub(crate) fn window_type_of(atoms: &Atoms, atom: Atom) -> Option<WinType> {
    let window_type = match atom {
        _ if atom == atoms._NET_WM_WINDOW_TYPE_NORMAL => WinType::Normal,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_DESKTOP => WinType::Desktop,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_DOCK => WinType::Dock,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_TOOLBAR => WinType::Toolbar,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_MENU => WinType::Menu,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_DIALOG => WinType::Dialog,
        _ if atom == atoms._KDE_NET_WM_WINDOW_TYPE_OVERRIDE => WinType::Override,
        _ if atom == atoms._KDE_NET_WM_WINDOW_TYPE_TOPMENU => WinType::TopMenu,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_UTILITY => WinType::Utility,
        _ if atom == atoms._NET_WM_WINDOW_TYPE_SPLASH => WinType::Splash,
        _ => return None,
    };
    Some(window_type)
}
