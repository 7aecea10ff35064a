//! Root/Desktop Protocol Object
//!
//! [`RootInfo`] mirrors the desktop-wide state a window manager publishes on the root window:
//! desktops, their names, geometry, viewports and work areas, the managed client list in mapping
//! and stacking order, the active window and the system tray list.
//!
//! Built as a manager it owns that state and writes it. Built as an observer it reads it, asks the
//! manager for changes, and reports additions and removals of clients as [`ListChange`]s.
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    codec::{self, Decoded, ListDiff},
    dispatch::{self, decode_root_request, RequestHandlers, RootRequest, RootRequestKind},
    publish::{Outcome, Publisher, RootChange},
    Atom, Atoms, ClientMessage, Delivery, Direction, Dirty, Event, MoveResizeMask, NetwmError, NetwmResult, Point, Properties,
    Properties2, PropertyValue, Rect, Role, Size, Transport, WinGravity, Window,
};

/// Client or tray window that appeared or disappeared on the last refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    ClientAdded(Window),
    ClientRemoved(Window),
    TrayAdded(Window),
    TrayRemoved(Window),
}

/// Cached root state
///
/// Readers never perform I/O and return the value of the last update, or the type's zero value
/// before the first one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootState {
    pub(crate) properties: Properties,
    pub(crate) properties2: Properties2,
    pub(crate) supported: Dirty,
    pub(crate) client_list: Vec<Window>,
    pub(crate) stacking: Vec<Window>,
    pub(crate) tray_windows: Vec<Window>,
    pub(crate) virtual_roots: Vec<Window>,
    pub(crate) number_of_desktops: u32,
    pub(crate) current_desktop: u32,
    pub(crate) geometry: Size,
    pub(crate) viewports: Vec<Point>,
    pub(crate) desktop_names: Vec<String>,
    pub(crate) work_areas: Vec<Rect>,
    pub(crate) active_window: Window,
    pub(crate) supporting_window: Window,
    pub(crate) wm_name: String,
    pub(crate) showing_desktop: bool,
}

impl RootState {
    /// Subscribed fields
    pub fn subscription(&self) -> Dirty {
        Dirty::new(self.properties, self.properties2)
    }

    /// Managed windows, sorted by id without duplicates
    pub fn client_list(&self) -> &[Window] {
        &self.client_list
    }

    /// Managed windows bottom to top
    pub fn client_list_stacking(&self) -> &[Window] {
        &self.stacking
    }

    pub fn kde_system_tray_windows(&self) -> &[Window] {
        &self.tray_windows
    }

    pub fn virtual_roots(&self) -> &[Window] {
        &self.virtual_roots
    }

    /// Number of desktops, 0 when the manager has not published it
    pub fn number_of_desktops(&self) -> u32 {
        self.number_of_desktops
    }

    /// One-based current desktop, 0 when unknown
    pub fn current_desktop(&self) -> u32 {
        self.current_desktop
    }

    pub fn desktop_geometry(&self) -> Size {
        self.geometry
    }

    /// Viewport of a one-based desktop
    pub fn desktop_viewport(&self, desktop: u32) -> Point {
        index(desktop).and_then(|i| self.viewports.get(i)).copied().unwrap_or_default()
    }

    /// Name of a one-based desktop, `None` when unnamed
    pub fn desktop_name(&self, desktop: u32) -> Option<&str> {
        index(desktop).and_then(|i| self.desktop_names.get(i)).map(|x| x.as_str()).filter(|x| !x.is_empty())
    }

    pub fn desktop_names(&self) -> &[String] {
        &self.desktop_names
    }

    /// Published work area of a one-based desktop
    pub fn work_area(&self, desktop: u32) -> Rect {
        index(desktop).and_then(|i| self.work_areas.get(i)).copied().unwrap_or_default()
    }

    pub fn active_window(&self) -> Window {
        self.active_window
    }

    /// Window the manager uses to prove it is running
    pub fn supporting_window(&self) -> Window {
        self.supporting_window
    }

    /// Name the manager published on its supporting window
    pub fn wm_name(&self) -> &str {
        &self.wm_name
    }

    pub fn showing_desktop(&self) -> bool {
        self.showing_desktop
    }

    /// True when every field in `properties` is advertised in `_NET_SUPPORTED`
    pub fn is_supported(&self, properties: Properties) -> bool {
        self.supported.properties.contains(properties)
    }

    pub fn is_supported2(&self, properties2: Properties2) -> bool {
        self.supported.properties2.contains(properties2)
    }
}

fn index(desktop: u32) -> Option<usize> {
    (desktop as usize).checked_sub(1)
}

/// Root/Desktop Protocol Object, see the module docs
///
/// Read accessors live on [`RootState`] and are reachable directly through `Deref`.
pub struct RootInfo<C: Transport> {
    conn: Rc<C>,
    atoms: Rc<Atoms>,
    role: Role,
    publisher: Publisher,
    state: Rc<RootState>,
    changes: Vec<ListChange>,
    handlers: RequestHandlers<RootRequestKind, RootRequest>,
}

impl<C: Transport> std::ops::Deref for RootInfo<C> {
    type Target = RootState;

    fn deref(&self) -> &RootState {
        &self.state
    }
}

impl<C: Transport> RootInfo<C> {
    fn new(conn: Rc<C>, atoms: Rc<Atoms>, role: Role, properties: Properties, properties2: Properties2) -> Self {
        let state = RootState { properties, properties2, geometry: conn.screen_size(), ..Default::default() };
        Self {
            conn,
            atoms,
            role,
            publisher: Publisher::for_role(role),
            state: Rc::new(state),
            changes: vec![],
            handlers: RequestHandlers::default(),
        }
    }

    /// Create the manager side, announcing itself through `supporting_window` once activated
    ///
    /// ### Arguments
    /// * `supporting_window` - window carrying the manager check and name
    /// * `wm_name` - name published on the supporting window
    /// * `properties`, `properties2` - fields the manager supports and maintains
    ///
    /// ### Examples
    /// ```ignore
    /// let mut root = RootInfo::manager(conn, atoms, check, "mywm", Properties::CLIENT_LIST, Properties2::empty());
    /// root.activate()?;
    /// ```
    pub fn manager(
        conn: Rc<C>, atoms: Rc<Atoms>, supporting_window: Window, wm_name: &str, properties: Properties, properties2: Properties2,
    ) -> Self {
        let mut root = Self::new(conn, atoms, Role::Manager, properties, properties2);
        let state = root.state_mut();
        state.supporting_window = supporting_window;
        state.wm_name = wm_name.to_string();
        root
    }

    /// Create an observer tracking the given fields
    ///
    /// ### Examples
    /// ```ignore
    /// let mut root = RootInfo::observer(conn, atoms, Properties::CLIENT_LIST | Properties::ACTIVE_WINDOW, Properties2::empty());
    /// root.activate()?;
    /// ```
    pub fn observer(conn: Rc<C>, atoms: Rc<Atoms>, properties: Properties, properties2: Properties2) -> Self {
        Self::new(conn, atoms, Role::Observer, properties, properties2)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn root(&self) -> Window {
        self.conn.root()
    }

    pub fn atoms(&self) -> &Rc<Atoms> {
        &self.atoms
    }

    /// Current state as a shared handle that later updates leave untouched
    pub fn snapshot(&self) -> Rc<RootState> {
        self.state.clone()
    }

    fn state_mut(&mut self) -> &mut RootState {
        Rc::make_mut(&mut self.state)
    }

    fn manager_only(&self, op: &'static str) -> NetwmResult<()> {
        match self.role {
            Role::Manager => Ok(()),
            Role::Observer => Err(NetwmError::ManagerOnly(op).into()),
        }
    }

    fn observer_only(&self, op: &'static str) -> NetwmResult<()> {
        match self.role {
            Role::Observer => Ok(()),
            Role::Manager => Err(NetwmError::ObserverOnly(op).into()),
        }
    }

    /// Go live: a manager advertises itself, an observer reads every subscribed field
    pub fn activate(&mut self) -> NetwmResult<()> {
        match self.role {
            Role::Manager => {
                self.set_supported()?;
                let (root, check) = (self.root(), self.state.supporting_window);
                let atoms = self.atoms.clone();
                let window = PropertyValue::Format32(vec![check]);
                self.conn.set_property(root, atoms._NET_SUPPORTING_WM_CHECK, atoms.WINDOW, &window)?;
                self.conn.set_property(check, atoms._NET_SUPPORTING_WM_CHECK, atoms.WINDOW, &window)?;
                let name = PropertyValue::Format8(self.state.wm_name.as_bytes().to_vec());
                self.conn.set_property(check, atoms._NET_WM_NAME, atoms.UTF8_STRING, &name)?;
                debug!("activate: manager: check: {}, name: {}", check, self.state.wm_name);
            },
            Role::Observer => {
                let all = self.state.subscription();
                self.update(all)?;
                debug!("activate: observer: clients: {}", self.state.client_list.len());
            },
        }
        Ok(())
    }

    /// Advertise every subscribed field in `_NET_SUPPORTED`
    ///
    /// The supported list and the manager check are always advertised, even when not subscribed,
    /// since peers discover the manager through them.
    pub fn set_supported(&mut self) -> NetwmResult<()> {
        self.manager_only("set_supported")?;
        let state = self.state_mut();
        state.properties |= Properties::SUPPORTED | Properties::SUPPORTING_WM_CHECK;
        let advertised = state.subscription();
        state.supported = advertised;

        let list = supported_atoms(&self.atoms, advertised);
        debug!("set_supported: atoms: {}", list.len());
        self.conn.set_property(self.root(), self.atoms._NET_SUPPORTED, self.atoms.ATOM, &PropertyValue::Format32(list))
    }

    /// Publish the managed windows in the manager's own order
    ///
    /// The cache keeps them sorted and duplicate free.
    pub fn set_client_list(&mut self, windows: &[Window]) -> NetwmResult<()> {
        self.manager_only("set_client_list")?;
        let ordered = codec::unique_in_order(windows);
        self.state_mut().client_list = codec::sorted_unique(ordered.clone());
        debug!("set_client_list: windows: {:?}", ordered);
        self.conn.set_property(self.root(), self.atoms._NET_CLIENT_LIST, self.atoms.WINDOW, &PropertyValue::Format32(ordered))
    }

    /// Publish the managed windows bottom to top
    pub fn set_client_list_stacking(&mut self, windows: &[Window]) -> NetwmResult<()> {
        self.manager_only("set_client_list_stacking")?;
        let ordered = codec::unique_in_order(windows);
        self.state_mut().stacking = ordered.clone();
        debug!("set_client_list_stacking: windows: {:?}", ordered);
        self.conn.set_property(
            self.root(),
            self.atoms._NET_CLIENT_LIST_STACKING,
            self.atoms.WINDOW,
            &PropertyValue::Format32(ordered),
        )
    }

    pub fn set_kde_system_tray_windows(&mut self, windows: &[Window]) -> NetwmResult<()> {
        self.manager_only("set_kde_system_tray_windows")?;
        let ordered = codec::unique_in_order(windows);
        self.state_mut().tray_windows = codec::sorted_unique(ordered.clone());
        self.conn.set_property(
            self.root(),
            self.atoms._KDE_NET_SYSTEM_TRAY_WINDOWS,
            self.atoms.WINDOW,
            &PropertyValue::Format32(ordered),
        )
    }

    pub fn set_virtual_roots(&mut self, windows: &[Window]) -> NetwmResult<()> {
        self.manager_only("set_virtual_roots")?;
        self.state_mut().virtual_roots = windows.to_vec();
        self.conn.set_property(self.root(), self.atoms._NET_VIRTUAL_ROOTS, self.atoms.WINDOW, &PropertyValue::Format32(windows.to_vec()))
    }

    fn publish(&mut self, change: RootChange) -> NetwmResult<Outcome> {
        self.publisher.root(&*self.conn, &self.atoms, &change)
    }

    /// Publish or request the number of desktops
    pub fn set_number_of_desktops(&mut self, count: u32) -> NetwmResult<()> {
        if count == 0 {
            debug!("set_number_of_desktops: ignoring zero desktops");
            return Ok(());
        }
        if self.publish(RootChange::NumberOfDesktops(count))? == Outcome::Written {
            self.state_mut().number_of_desktops = count;
        }
        Ok(())
    }

    /// Publish or request the one-based current desktop
    pub fn set_current_desktop(&mut self, desktop: u32) -> NetwmResult<()> {
        if desktop == 0 {
            debug!("set_current_desktop: ignoring desktop 0");
            return Ok(());
        }
        if self.publish(RootChange::CurrentDesktop(desktop))? == Outcome::Written {
            self.state_mut().current_desktop = desktop;
        }
        Ok(())
    }

    pub fn set_desktop_geometry(&mut self, size: Size) -> NetwmResult<()> {
        if self.publish(RootChange::DesktopGeometry(size))? == Outcome::Written {
            self.state_mut().geometry = size;
        }
        Ok(())
    }

    /// Publish the viewport of a one-based desktop, or request it for the current desktop
    pub fn set_desktop_viewport(&mut self, desktop: u32, viewport: Point) -> NetwmResult<()> {
        let i = match index(desktop) {
            Some(i) => i,
            None => return Ok(()),
        };
        let mut all = self.state.viewports.clone();
        all.resize(all.len().max(self.state.number_of_desktops as usize).max(i + 1), Point::default());
        all[i] = viewport;
        if self.publish(RootChange::DesktopViewport { viewport, all: all.clone() })? == Outcome::Written {
            self.state_mut().viewports = all;
        }
        Ok(())
    }

    /// Publish or request the active window
    pub fn set_active_window(&mut self, window: Window) -> NetwmResult<()> {
        if self.publish(RootChange::ActiveWindow(window))? == Outcome::Written {
            self.state_mut().active_window = window;
        }
        Ok(())
    }

    pub fn set_showing_desktop(&mut self, showing: bool) -> NetwmResult<()> {
        if self.publish(RootChange::ShowingDesktop(showing))? == Outcome::Written {
            self.state_mut().showing_desktop = showing;
        }
        Ok(())
    }

    /// Rename a one-based desktop, republishing the whole name list
    ///
    /// Allowed in both roles. Desktops beyond the published count are ignored. Without a
    /// published count the list grows by at most one name per call.
    pub fn set_desktop_name(&mut self, desktop: u32, name: &str) -> NetwmResult<()> {
        let count = self.state.number_of_desktops as usize;
        let limit = if count > 0 { count } else { self.state.desktop_names.len() + 1 };
        let i = match index(desktop) {
            Some(i) if i < limit => i,
            _ => {
                debug!("set_desktop_name: ignoring desktop: {}", desktop);
                return Ok(());
            },
        };
        let state = self.state_mut();
        if state.desktop_names.len() <= i {
            state.desktop_names.resize(i + 1, String::new());
        }
        state.desktop_names[i] = name.to_string();
        let buf = codec::encode_desktop_names(&state.desktop_names, if count > 0 { count } else { state.desktop_names.len() });
        self.conn.set_property(self.root(), self.atoms._NET_DESKTOP_NAMES, self.atoms.UTF8_STRING, &PropertyValue::Format8(buf))
    }

    /// Publish the work area of a one-based desktop
    pub fn set_work_area(&mut self, desktop: u32, area: Rect) -> NetwmResult<()> {
        self.manager_only("set_work_area")?;
        let i = match index(desktop) {
            Some(i) => i,
            None => return Ok(()),
        };
        let count = self.state.number_of_desktops as usize;
        let state = self.state_mut();
        let len = state.work_areas.len().max(count).max(i + 1);
        state.work_areas.resize(len, Rect::default());
        state.work_areas[i] = area;
        let data = state.work_areas.iter().flat_map(codec::encode_rect).collect();
        self.conn.set_property(self.root(), self.atoms._NET_WORKAREA, self.atoms.CARDINAL, &PropertyValue::Format32(data))
    }

    /// Ask the manager to close a window
    pub fn close_window_request(&self, window: Window) -> NetwmResult<()> {
        self.observer_only("close_window_request")?;
        debug!("close_window_request: window: {}", window);
        self.conn.send_client_message(Delivery::Root, ClientMessage::new(window, self.atoms._NET_CLOSE_WINDOW, [0; 5]))
    }

    /// Ask the manager to start an interactive move or resize from the given root position
    pub fn move_resize_request(&self, window: Window, x_root: i32, y_root: i32, direction: Direction) -> NetwmResult<()> {
        self.observer_only("move_resize_request")?;
        debug!("move_resize_request: window: {}, direction: {:?}", window, direction);
        let data = [x_root as u32, y_root as u32, direction as u32, 0, 0];
        self.conn.send_client_message(Delivery::Root, ClientMessage::new(window, self.atoms._NET_WM_MOVERESIZE, data))
    }

    /// Ask the manager to move and resize a window, only the fields in `mask` are applied
    pub fn move_resize_window_request(&self, window: Window, gravity: WinGravity, mask: MoveResizeMask, rect: Rect) -> NetwmResult<()> {
        self.observer_only("move_resize_window_request")?;
        debug!("move_resize_window_request: window: {}, rect: {}", window, rect);
        let flags = u32::from(gravity) | mask.bits();
        let data = [flags, rect.x as u32, rect.y as u32, rect.width, rect.height];
        self.conn.send_client_message(Delivery::Root, ClientMessage::new(window, self.atoms._NET_MOVERESIZE_WINDOW, data))
    }

    /// Check that a client is still responding, the reply comes back as [`RootRequest::PingReply`]
    pub fn send_ping(&self, window: Window, timestamp: u32) -> NetwmResult<()> {
        self.manager_only("send_ping")?;
        let data = [self.atoms._NET_WM_PING, timestamp, window, 0, 0];
        self.conn.send_client_message(Delivery::Direct(window), ClientMessage::new(window, self.atoms.WM_PROTOCOLS, data))
    }

    /// Install the manager's policy for one kind of request
    ///
    /// ### Examples
    /// ```ignore
    /// root.on_request(RootRequestKind::CurrentDesktop, move |req| {
    ///     if let RootRequest::CurrentDesktop(d) = req { switch_to(*d) }
    /// });
    /// ```
    pub fn on_request(&mut self, kind: RootRequestKind, handler: impl FnMut(&RootRequest) + 'static) {
        self.handlers.register(kind, handler);
    }

    /// Client list changes collected since the last call
    pub fn drain_list_changes(&mut self) -> Vec<ListChange> {
        std::mem::take(&mut self.changes)
    }

    /// Process one event, returning the subscribed fields it changed
    ///
    /// Property changes on the root are coalesced with the ones queued behind them and refreshed
    /// in one update. A manager also decodes requests and hands them to its registered policy.
    pub fn event(&mut self, event: &Event) -> NetwmResult<Dirty> {
        let dirty = match event {
            Event::Property(ev) if ev.window == self.root() => {
                let dirty = dispatch::root_event_dirty(&*self.conn, &self.atoms, ev)?;
                self.update(dirty)?;
                dirty
            },
            Event::ClientMessage(msg) if self.role == Role::Manager => match decode_root_request(&self.atoms, msg) {
                Some(request) => {
                    trace!("event: request: {:?}", request);
                    self.handlers.invoke(&request.kind(), &request);
                    request.dirty()
                },
                None => Dirty::default(),
            },
            _ => Dirty::default(),
        };
        Ok(dirty.intersection(self.state.subscription()))
    }

    /// Re-read the given fields from the server, limited to the subscription
    pub fn update(&mut self, dirty: Dirty) -> NetwmResult<()> {
        let dirty = dirty.intersection(self.state.subscription());
        if dirty.is_empty() {
            return Ok(());
        }
        let p = dirty.properties;
        let (conn, atoms) = (self.conn.clone(), self.atoms.clone());
        let root = conn.root();
        let read = |property: Atom, type_: Atom| conn.get_property(root, property, type_);

        if p.contains(Properties::SUPPORTED) {
            let prop = read(atoms._NET_SUPPORTED, atoms.ATOM)?;
            if let Decoded::Value(list) = codec::words(&prop, atoms.ATOM, 0) {
                self.state_mut().supported = supported_from_atoms(&atoms, &list);
            } else if prop.is_none() {
                self.state_mut().supported = Dirty::default();
            }
        }
        if p.contains(Properties::CLIENT_LIST) {
            let prop = read(atoms._NET_CLIENT_LIST, atoms.WINDOW)?;
            if let Some(list) = window_list(&prop, atoms.WINDOW) {
                let list = codec::sorted_unique(list);
                if self.role == Role::Observer {
                    let changes = &mut self.changes;
                    codec::diff_sorted(&self.state.client_list, &list, |x| {
                        changes.push(match x {
                            ListDiff::Added(w) => ListChange::ClientAdded(w),
                            ListDiff::Removed(w) => ListChange::ClientRemoved(w),
                        })
                    });
                }
                self.state_mut().client_list = list;
            }
        }
        if p.contains(Properties::CLIENT_LIST_STACKING) {
            let prop = read(atoms._NET_CLIENT_LIST_STACKING, atoms.WINDOW)?;
            if let Some(list) = window_list(&prop, atoms.WINDOW) {
                self.state_mut().stacking = codec::unique_in_order(&list);
            }
        }
        if p.contains(Properties::KDE_SYSTEM_TRAY_WINDOWS) {
            let prop = read(atoms._KDE_NET_SYSTEM_TRAY_WINDOWS, atoms.WINDOW)?;
            if let Some(list) = window_list(&prop, atoms.WINDOW) {
                let list = codec::sorted_unique(list);
                if self.role == Role::Observer {
                    let changes = &mut self.changes;
                    codec::diff_sorted(&self.state.tray_windows, &list, |x| {
                        changes.push(match x {
                            ListDiff::Added(w) => ListChange::TrayAdded(w),
                            ListDiff::Removed(w) => ListChange::TrayRemoved(w),
                        })
                    });
                }
                self.state_mut().tray_windows = list;
            }
        }
        if p.contains(Properties::VIRTUAL_ROOTS) {
            let prop = read(atoms._NET_VIRTUAL_ROOTS, atoms.WINDOW)?;
            codec::words(&prop, atoms.WINDOW, 0).apply(&mut self.state_mut().virtual_roots);
        }
        if p.contains(Properties::NUMBER_OF_DESKTOPS) {
            let prop = read(atoms._NET_NUMBER_OF_DESKTOPS, atoms.CARDINAL)?;
            codec::cardinal(&prop, atoms.CARDINAL).apply(&mut self.state_mut().number_of_desktops);
        }
        if p.contains(Properties::DESKTOP_GEOMETRY) {
            let prop = read(atoms._NET_DESKTOP_GEOMETRY, atoms.CARDINAL)?;
            match codec::words(&prop, atoms.CARDINAL, 2) {
                Decoded::Value(x) => self.state_mut().geometry = Size::new(x[0], x[1]),
                Decoded::Absent => self.state_mut().geometry = conn.screen_size(),
                Decoded::Malformed => (),
            }
        }
        if p.contains(Properties::DESKTOP_VIEWPORT) {
            let prop = read(atoms._NET_DESKTOP_VIEWPORT, atoms.CARDINAL)?;
            codec::words(&prop, atoms.CARDINAL, 0).map(|x| codec::decode_points(&x)).apply(&mut self.state_mut().viewports);
        }
        if p.contains(Properties::CURRENT_DESKTOP) {
            let prop = read(atoms._NET_CURRENT_DESKTOP, atoms.CARDINAL)?;
            codec::cardinal(&prop, atoms.CARDINAL).map(|x| x.saturating_add(1)).apply(&mut self.state_mut().current_desktop);
        }
        if p.contains(Properties::DESKTOP_NAMES) {
            let prop = read(atoms._NET_DESKTOP_NAMES, atoms.UTF8_STRING)?;
            match prop.as_ref().map(|x| x.bytes(atoms.UTF8_STRING)) {
                Some(Some(buf)) => self.state_mut().desktop_names = codec::decode_desktop_names(buf),
                None => self.state_mut().desktop_names = vec![],
                Some(None) => (),
            }
        }
        if p.contains(Properties::ACTIVE_WINDOW) {
            let prop = read(atoms._NET_ACTIVE_WINDOW, atoms.WINDOW)?;
            codec::cardinal(&prop, atoms.WINDOW).apply(&mut self.state_mut().active_window);
        }
        if p.contains(Properties::WORK_AREA) {
            let prop = read(atoms._NET_WORKAREA, atoms.CARDINAL)?;
            codec::words(&prop, atoms.CARDINAL, 0).map(|x| codec::decode_rects(&x)).apply(&mut self.state_mut().work_areas);
        }
        if p.contains(Properties::SUPPORTING_WM_CHECK) {
            let prop = read(atoms._NET_SUPPORTING_WM_CHECK, atoms.WINDOW)?;
            codec::cardinal(&prop, atoms.WINDOW).apply(&mut self.state_mut().supporting_window);
            let check = self.state.supporting_window;
            let name = match check {
                0 => Decoded::Absent,
                _ => codec::utf8(&conn.get_property(check, atoms._NET_WM_NAME, atoms.UTF8_STRING)?, atoms.UTF8_STRING),
            };
            name.apply(&mut self.state_mut().wm_name);
        }
        if dirty.properties2.contains(Properties2::SHOWING_DESKTOP) {
            let prop = read(atoms._NET_SHOWING_DESKTOP, atoms.CARDINAL)?;
            codec::cardinal(&prop, atoms.CARDINAL).map(|x| x != 0).apply(&mut self.state_mut().showing_desktop);
        }
        trace!("update: dirty: {:?}", dirty);
        Ok(())
    }
}

/// Window list of a property, `None` when malformed so the cache is kept
fn window_list(prop: &Option<crate::Property>, window_type: Atom) -> Option<Vec<Window>> {
    match codec::words(prop, window_type, 0) {
        Decoded::Value(list) => Some(list),
        Decoded::Absent => Some(vec![]),
        Decoded::Malformed => None,
    }
}

/// Atoms advertising a field, the first one marks the field as supported when read back
fn field_atoms(atoms: &Atoms) -> Vec<(Dirty, Vec<Atom>)> {
    let p = |x: Properties| -> Dirty { x.into() };
    vec![
        (p(Properties::SUPPORTED), vec![atoms._NET_SUPPORTED]),
        (p(Properties::CLIENT_LIST), vec![atoms._NET_CLIENT_LIST]),
        (p(Properties::CLIENT_LIST_STACKING), vec![atoms._NET_CLIENT_LIST_STACKING]),
        (p(Properties::NUMBER_OF_DESKTOPS), vec![atoms._NET_NUMBER_OF_DESKTOPS]),
        (p(Properties::DESKTOP_GEOMETRY), vec![atoms._NET_DESKTOP_GEOMETRY]),
        (p(Properties::DESKTOP_VIEWPORT), vec![atoms._NET_DESKTOP_VIEWPORT]),
        (p(Properties::CURRENT_DESKTOP), vec![atoms._NET_CURRENT_DESKTOP]),
        (p(Properties::DESKTOP_NAMES), vec![atoms._NET_DESKTOP_NAMES]),
        (p(Properties::ACTIVE_WINDOW), vec![atoms._NET_ACTIVE_WINDOW]),
        (p(Properties::WORK_AREA), vec![atoms._NET_WORKAREA]),
        (p(Properties::SUPPORTING_WM_CHECK), vec![atoms._NET_SUPPORTING_WM_CHECK]),
        (p(Properties::VIRTUAL_ROOTS), vec![atoms._NET_VIRTUAL_ROOTS]),
        (p(Properties::KDE_SYSTEM_TRAY_WINDOWS), vec![atoms._KDE_NET_SYSTEM_TRAY_WINDOWS]),
        (p(Properties::CLOSE_WINDOW), vec![atoms._NET_CLOSE_WINDOW]),
        (p(Properties::WM_MOVE_RESIZE), vec![atoms._NET_WM_MOVERESIZE]),
        (p(Properties::WM_NAME), vec![atoms._NET_WM_NAME]),
        (p(Properties::WM_VISIBLE_NAME), vec![atoms._NET_WM_VISIBLE_NAME]),
        (p(Properties::WM_ICON_NAME), vec![atoms._NET_WM_ICON_NAME]),
        (p(Properties::WM_VISIBLE_ICON_NAME), vec![atoms._NET_WM_VISIBLE_ICON_NAME]),
        (p(Properties::WM_DESKTOP), vec![atoms._NET_WM_DESKTOP]),
        (
            p(Properties::WM_WINDOW_TYPE),
            vec![
                atoms._NET_WM_WINDOW_TYPE,
                atoms._NET_WM_WINDOW_TYPE_NORMAL,
                atoms._NET_WM_WINDOW_TYPE_DESKTOP,
                atoms._NET_WM_WINDOW_TYPE_DOCK,
                atoms._NET_WM_WINDOW_TYPE_TOOLBAR,
                atoms._NET_WM_WINDOW_TYPE_MENU,
                atoms._NET_WM_WINDOW_TYPE_DIALOG,
                atoms._NET_WM_WINDOW_TYPE_UTILITY,
                atoms._NET_WM_WINDOW_TYPE_SPLASH,
                atoms._KDE_NET_WM_WINDOW_TYPE_OVERRIDE,
                atoms._KDE_NET_WM_WINDOW_TYPE_TOPMENU,
            ],
        ),
        (
            p(Properties::WM_STATE),
            vec![
                atoms._NET_WM_STATE,
                atoms._NET_WM_STATE_MODAL,
                atoms._NET_WM_STATE_STICKY,
                atoms._NET_WM_STATE_MAXIMIZED_VERT,
                atoms._NET_WM_STATE_MAXIMIZED_HORZ,
                atoms._NET_WM_STATE_SHADED,
                atoms._NET_WM_STATE_SKIP_TASKBAR,
                atoms._NET_WM_STATE_SKIP_PAGER,
                atoms._NET_WM_STATE_HIDDEN,
                atoms._NET_WM_STATE_FULLSCREEN,
                atoms._NET_WM_STATE_ABOVE,
                atoms._NET_WM_STATE_BELOW,
                atoms._NET_WM_STATE_DEMANDS_ATTENTION,
                atoms._NET_WM_STATE_STAYS_ON_TOP,
            ],
        ),
        (p(Properties::WM_STRUT), vec![atoms._NET_WM_STRUT]),
        (p(Properties::WM_ICON_GEOMETRY), vec![atoms._NET_WM_ICON_GEOMETRY]),
        (p(Properties::WM_ICON), vec![atoms._NET_WM_ICON]),
        (p(Properties::WM_PID), vec![atoms._NET_WM_PID]),
        (p(Properties::WM_HANDLED_ICONS), vec![atoms._NET_WM_HANDLED_ICONS]),
        (p(Properties::WM_PING), vec![atoms._NET_WM_PING]),
        (p(Properties::KDE_SYSTEM_TRAY_WIN_FOR), vec![atoms._KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR]),
        (p(Properties::WM_KDE_FRAME_STRUT), vec![atoms._KDE_NET_WM_FRAME_STRUT, atoms._NET_FRAME_EXTENTS]),
        (Properties2::SHOWING_DESKTOP.into(), vec![atoms._NET_SHOWING_DESKTOP]),
        (Properties2::MOVE_RESIZE_WINDOW.into(), vec![atoms._NET_MOVERESIZE_WINDOW]),
    ]
}

/// Atoms to advertise for a mask, in a fixed order without duplicates
pub(crate) fn supported_atoms(atoms: &Atoms, mask: Dirty) -> Vec<Atom> {
    field_atoms(atoms)
        .into_iter()
        .filter(|(field, _)| !field.intersection(mask).is_empty())
        .flat_map(|(_, list)| list)
        .collect()
}

/// Mask of the fields advertised by a `_NET_SUPPORTED` list
pub(crate) fn supported_from_atoms(atoms: &Atoms, list: &[Atom]) -> Dirty {
    let mut mask = Dirty::default();
    for (field, advertised) in field_atoms(atoms) {
        if advertised.first().map_or(false, |x| list.contains(x)) {
            mask |= field;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryServer, PropertyEvent};
    use std::cell::RefCell;

    fn setup() -> (Rc<MemoryServer>, Rc<Atoms>) {
        let server = Rc::new(MemoryServer::new());
        let atoms = Rc::new(Atoms::intern(&*server).unwrap());
        (server, atoms)
    }

    fn manager(server: &Rc<MemoryServer>, atoms: &Rc<Atoms>) -> RootInfo<MemoryServer> {
        RootInfo::manager(server.clone(), atoms.clone(), 0x500, "testwm", Properties::root_fields(), Properties2::all())
    }

    fn observer(server: &Rc<MemoryServer>, atoms: &Rc<Atoms>) -> RootInfo<MemoryServer> {
        RootInfo::observer(server.clone(), atoms.clone(), Properties::root_fields(), Properties2::all())
    }

    #[test]
    fn test_manager_to_observer_readback() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.activate().unwrap();
        wm.set_client_list(&[5, 9]).unwrap();
        wm.set_client_list_stacking(&[9, 5]).unwrap();
        wm.set_active_window(9).unwrap();

        let mut client = observer(&server, &atoms);
        client.activate().unwrap();
        assert_eq!(client.client_list(), &[5, 9]);
        assert_eq!(client.client_list_stacking(), &[9, 5]);
        assert_eq!(client.active_window(), 9);
        assert_eq!(client.supporting_window(), 0x500);
        assert_eq!(client.wm_name(), "testwm");
        assert!(client.is_supported(Properties::CLIENT_LIST | Properties::ACTIVE_WINDOW));
        assert!(!client.is_supported(Properties::WM_ICON));
    }

    #[test]
    fn test_set_supported_is_idempotent() {
        let (server, atoms) = setup();
        let mut wm = RootInfo::manager(server.clone(), atoms.clone(), 0x500, "testwm", Properties::CLIENT_LIST, Properties2::empty());
        wm.set_supported().unwrap();
        let first = server.words(server.root(), atoms._NET_SUPPORTED).unwrap();
        wm.set_supported().unwrap();
        let second = server.words(server.root(), atoms._NET_SUPPORTED).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![atoms._NET_SUPPORTED, atoms._NET_CLIENT_LIST, atoms._NET_SUPPORTING_WM_CHECK]);
    }

    #[test]
    fn test_set_supported_advertises_choices() {
        let (server, atoms) = setup();
        let mut wm =
            RootInfo::manager(server.clone(), atoms.clone(), 0x500, "testwm", Properties::WM_WINDOW_TYPE | Properties::WM_STATE, Properties2::empty());
        wm.set_supported().unwrap();
        let list = server.words(server.root(), atoms._NET_SUPPORTED).unwrap();
        assert!(list.contains(&atoms._KDE_NET_WM_WINDOW_TYPE_TOPMENU));
        assert!(list.contains(&atoms._NET_WM_STATE_SHADED));
        let mut sorted = list.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), list.len());
    }

    #[test]
    fn test_observer_emits_list_changes() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_client_list(&[7, 1, 5, 3]).unwrap();

        let mut client = observer(&server, &atoms);
        client.activate().unwrap();
        assert_eq!(client.client_list(), &[1, 3, 5, 7]);
        assert_eq!(client.drain_list_changes().len(), 4);

        wm.set_client_list(&[9, 3, 4, 7]).unwrap();
        client.update(Properties::CLIENT_LIST.into()).unwrap();
        assert_eq!(
            client.drain_list_changes(),
            vec![ListChange::ClientRemoved(1), ListChange::ClientAdded(4), ListChange::ClientRemoved(5), ListChange::ClientAdded(9)]
        );
        assert_eq!(client.client_list(), &[3, 4, 7, 9]);
        assert!(wm.drain_list_changes().is_empty());
    }

    #[test]
    fn test_observer_requests_leave_cache() {
        let (server, atoms) = setup();
        let mut client = observer(&server, &atoms);
        client.set_current_desktop(2).unwrap();
        client.set_active_window(42).unwrap();
        client.set_current_desktop(0).unwrap();
        assert_eq!(client.current_desktop(), 0);
        assert_eq!(client.active_window(), 0);

        let sent = server.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message.data[0], 1);
        assert_eq!(sent[1].message.window, 42);
        assert_eq!(sent[1].message.type_, atoms._NET_ACTIVE_WINDOW);
        assert_eq!(server.property(server.root(), atoms._NET_CURRENT_DESKTOP), None);
    }

    #[test]
    fn test_role_misuse() {
        let (server, atoms) = setup();
        let mut client = observer(&server, &atoms);
        let err = client.set_client_list(&[1]).unwrap_err();
        assert_eq!(err.downcast_ref::<NetwmError>(), Some(&NetwmError::ManagerOnly("set_client_list")));
        assert!(client.set_work_area(1, Rect::default()).is_err());

        let wm = manager(&server, &atoms);
        assert!(wm.close_window_request(5).is_err());
        assert!(wm.move_resize_request(5, 0, 0, Direction::Move).is_err());
    }

    #[test]
    fn test_observer_only_requests() {
        let (server, atoms) = setup();
        let client = observer(&server, &atoms);
        client.close_window_request(77).unwrap();
        client.move_resize_request(77, 10, 20, Direction::BottomRight).unwrap();
        client.move_resize_window_request(77, WinGravity::Static, MoveResizeMask::X | MoveResizeMask::Y, Rect::new(1, 2, 0, 0)).unwrap();

        let sent = server.take_sent();
        assert_eq!(sent[0].message, ClientMessage::new(77, atoms._NET_CLOSE_WINDOW, [0; 5]));
        assert_eq!(sent[1].message.data, [10, 20, 4, 0, 0]);
        assert_eq!(sent[2].message.data, [10 | (1 << 8) | (1 << 9), 1, 2, 0, 0]);
        assert!(sent.iter().all(|x| x.delivery == Delivery::Root));
    }

    #[test]
    fn test_manager_request_handlers() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        wm.on_request(RootRequestKind::CurrentDesktop, move |req| sink.borrow_mut().push(*req));

        let msg = ClientMessage::new(server.root(), atoms._NET_CURRENT_DESKTOP, [2, 0, 0, 0, 0]);
        let dirty = wm.event(&Event::ClientMessage(msg)).unwrap();
        assert_eq!(dirty.properties, Properties::CURRENT_DESKTOP);
        assert_eq!(*seen.borrow(), vec![RootRequest::CurrentDesktop(3)]);

        // unregistered policy is a no-op
        let msg = ClientMessage::new(12, atoms._NET_CLOSE_WINDOW, [0; 5]);
        assert!(wm.event(&Event::ClientMessage(msg)).unwrap().is_empty());
    }

    #[test]
    fn test_ping_is_sent_direct() {
        let (server, atoms) = setup();
        let wm = manager(&server, &atoms);
        wm.send_ping(33, 1234).unwrap();
        let sent = server.take_sent();
        assert_eq!(sent[0].delivery, Delivery::Direct(33));
        assert_eq!(sent[0].message.data, [atoms._NET_WM_PING, 1234, 33, 0, 0]);
    }

    #[test]
    fn test_desktop_names_padded_to_count() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_number_of_desktops(3).unwrap();
        wm.set_desktop_name(2, "Work").unwrap();
        wm.set_desktop_name(4, "Nope").unwrap();
        assert_eq!(server.bytes(server.root(), atoms._NET_DESKTOP_NAMES).unwrap(), b"\0Work\0\0".to_vec());

        let mut client = observer(&server, &atoms);
        client.activate().unwrap();
        assert_eq!(client.number_of_desktops(), 3);
        assert_eq!(client.desktop_name(1), None);
        assert_eq!(client.desktop_name(2), Some("Work"));
        assert_eq!(client.desktop_name(9), None);
    }

    #[test]
    fn test_desktop_names_without_count_grow_by_one() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_desktop_name(u32::MAX, "x").unwrap();
        wm.set_desktop_name(3, "x").unwrap();
        assert_eq!(server.property(server.root(), atoms._NET_DESKTOP_NAMES), None);

        wm.set_desktop_name(1, "One").unwrap();
        wm.set_desktop_name(2, "Two").unwrap();
        wm.set_desktop_name(20_000_000, "x").unwrap();
        assert_eq!(wm.desktop_name(2), Some("Two"));
        assert_eq!(server.bytes(server.root(), atoms._NET_DESKTOP_NAMES).unwrap(), b"One\0Two\0".to_vec());
    }

    #[test]
    fn test_desktop_index_translation() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_number_of_desktops(4).unwrap();
        for d in 1..=4 {
            wm.set_current_desktop(d).unwrap();
            assert_eq!(server.words(server.root(), atoms._NET_CURRENT_DESKTOP).unwrap(), vec![d - 1]);
            let mut client = observer(&server, &atoms);
            client.update(Properties::CURRENT_DESKTOP.into()).unwrap();
            assert_eq!(client.current_desktop(), d);
        }
    }

    #[test]
    fn test_viewports_and_work_areas() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_number_of_desktops(2).unwrap();
        wm.set_desktop_viewport(2, Point::new(1024, 0)).unwrap();
        wm.set_work_area(1, Rect::new(0, 30, 1024, 738)).unwrap();
        assert_eq!(server.words(server.root(), atoms._NET_DESKTOP_VIEWPORT).unwrap(), vec![0, 0, 1024, 0]);
        assert_eq!(server.words(server.root(), atoms._NET_WORKAREA).unwrap(), vec![0, 30, 1024, 738, 0, 0, 0, 0]);

        let mut client = observer(&server, &atoms);
        client.activate().unwrap();
        assert_eq!(client.desktop_viewport(2), Point::new(1024, 0));
        assert_eq!(client.work_area(1), Rect::new(0, 30, 1024, 738));
        assert_eq!(client.work_area(3), Rect::default());
        assert_eq!(client.desktop_geometry(), Size::new(1024, 768));
    }

    #[test]
    fn test_event_coalesces_root_changes() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        let mut client = observer(&server, &atoms);
        server.watch_window(server.root()).unwrap();

        wm.set_number_of_desktops(4).unwrap();
        wm.set_current_desktop(2).unwrap();
        wm.set_showing_desktop(true).unwrap();
        assert_eq!(server.pending_events(), 3);

        let first = server.poll_event().unwrap().unwrap();
        let dirty = client.event(&first).unwrap();
        assert_eq!(dirty.properties, Properties::NUMBER_OF_DESKTOPS | Properties::CURRENT_DESKTOP);
        assert_eq!(dirty.properties2, Properties2::SHOWING_DESKTOP);
        assert_eq!(server.pending_events(), 0);
        assert_eq!(client.number_of_desktops(), 4);
        assert_eq!(client.current_desktop(), 2);
        assert!(client.showing_desktop());
    }

    #[test]
    fn test_event_outside_subscription() {
        let (server, atoms) = setup();
        let mut client = RootInfo::observer(server.clone(), atoms.clone(), Properties::CLIENT_LIST, Properties2::empty());
        server.set_property(server.root(), atoms._NET_ACTIVE_WINDOW, atoms.WINDOW, &PropertyValue::Format32(vec![3])).unwrap();
        let ev = Event::Property(PropertyEvent { window: server.root(), atom: atoms._NET_ACTIVE_WINDOW, deleted: false });
        assert!(client.event(&ev).unwrap().is_empty());
        assert_eq!(client.active_window(), 0);
    }

    #[test]
    fn test_malformed_keeps_previous() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_current_desktop(3).unwrap();
        let mut client = observer(&server, &atoms);
        client.update(Properties::CURRENT_DESKTOP.into()).unwrap();
        assert_eq!(client.current_desktop(), 3);

        let root = server.root();
        server.set_property(root, atoms._NET_CURRENT_DESKTOP, atoms.STRING, &PropertyValue::Format8(b"2".to_vec())).unwrap();
        client.update(Properties::CURRENT_DESKTOP.into()).unwrap();
        assert_eq!(client.current_desktop(), 3);

        server.delete_property(root, atoms._NET_CURRENT_DESKTOP).unwrap();
        client.update(Properties::CURRENT_DESKTOP.into()).unwrap();
        assert_eq!(client.current_desktop(), 0);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        wm.set_client_list(&[1, 2]).unwrap();
        let before = wm.snapshot();
        wm.set_client_list(&[3]).unwrap();
        assert_eq!(before.client_list(), &[1, 2]);
        assert_eq!(wm.client_list(), &[3]);
    }

    #[test]
    fn test_tray_list_changes() {
        let (server, atoms) = setup();
        let mut wm = manager(&server, &atoms);
        let mut client = observer(&server, &atoms);
        wm.set_kde_system_tray_windows(&[20, 10]).unwrap();
        client.update(Properties::KDE_SYSTEM_TRAY_WINDOWS.into()).unwrap();
        assert_eq!(client.drain_list_changes(), vec![ListChange::TrayAdded(10), ListChange::TrayAdded(20)]);
        wm.set_kde_system_tray_windows(&[20]).unwrap();
        client.update(Properties::KDE_SYSTEM_TRAY_WINDOWS.into()).unwrap();
        assert_eq!(client.drain_list_changes(), vec![ListChange::TrayRemoved(10)]);
    }
}
