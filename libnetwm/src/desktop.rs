//! Desktop Module
//!
//! Many independent parts of one program usually want the same desktop information. A
//! [`DesktopHub`] owns the single observer [`RootInfo`] they share and hands out
//! [`DesktopModule`] subscribers, each with its own queue of [`DesktopEvent`]s.
//!
//! The shared root object only ever widens: a subscriber asking for a higher [`InfoLevel`]
//! rebuilds it with the larger mask and every existing subscriber stays attached.
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::{
    codec::{self, ListDiff},
    dispatch, Atoms, Event, ListChange, NetwmResult, Properties, Properties2, Rect, RootInfo, Role, Strut, Transport, WinInfo,
    Window, ON_ALL_DESKTOPS,
};

/// Fields that invalidate a cached strut
const STRUT_FIELDS: Properties = Properties::WM_STRUT.union(Properties::WM_DESKTOP);

/// Amount of information a subscriber needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InfoLevel {
    /// Desktops, client and stacking lists, active window, work areas
    Basic,
    /// Basic plus per-window hints of every managed client
    Windows,
}

impl InfoLevel {
    fn root_fields(self) -> (Properties, Properties2) {
        let basic = Properties::SUPPORTED
            | Properties::CLIENT_LIST
            | Properties::CLIENT_LIST_STACKING
            | Properties::NUMBER_OF_DESKTOPS
            | Properties::CURRENT_DESKTOP
            | Properties::DESKTOP_NAMES
            | Properties::ACTIVE_WINDOW
            | Properties::WORK_AREA
            | Properties::SUPPORTING_WM_CHECK
            | Properties::KDE_SYSTEM_TRAY_WINDOWS;
        match self {
            InfoLevel::Basic => (basic, Properties2::SHOWING_DESKTOP),
            InfoLevel::Windows => (
                basic | Properties::DESKTOP_GEOMETRY | Properties::DESKTOP_VIEWPORT | Properties::VIRTUAL_ROOTS,
                Properties2::SHOWING_DESKTOP,
            ),
        }
    }

    fn window_fields() -> Properties {
        Properties::window_fields() & !Properties::WM_ICON
    }
}

/// Notification queued for subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopEvent {
    WindowAdded(Window),
    WindowRemoved(Window),
    /// Subscribed hints of a managed window changed, `Windows` level only
    WindowChanged { window: Window, properties: Properties },
    /// Reserved screen edges of a window changed, `Windows` level only
    StrutChanged(Window),
    SystemTrayWindowAdded(Window),
    SystemTrayWindowRemoved(Window),
    CurrentDesktopChanged(u32),
    NumberOfDesktopsChanged(u32),
    DesktopNamesChanged,
    ActiveWindowChanged(Window),
    StackingOrderChanged,
    WorkAreaChanged,
    ShowingDesktopChanged(bool),
}

impl DesktopEvent {
    fn level(&self) -> InfoLevel {
        match self {
            DesktopEvent::WindowChanged { .. } | DesktopEvent::StrutChanged(_) => InfoLevel::Windows,
            _ => InfoLevel::Basic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrutEntry {
    desktop: i32,
    strut: Strut,
}

struct Subscriber {
    level: InfoLevel,
    queue: VecDeque<DesktopEvent>,
}

struct Hub<C: Transport> {
    conn: Rc<C>,
    atoms: Rc<Atoms>,
    level: Option<InfoLevel>,
    root: RootInfo<C>,
    subscribers: HashMap<usize, Subscriber>,
    next_id: usize,
    windows: HashMap<Window, WinInfo<C>>,
    struts: HashMap<Window, StrutEntry>,
}

/// Subscribers dropped while the hub was borrowed, removed on its next use
type Detached = Rc<RefCell<Vec<usize>>>;

/// Owner of the shared root object, see the module docs
pub struct DesktopHub<C: Transport> {
    inner: Rc<RefCell<Hub<C>>>,
    detached: Detached,
}

impl<C: Transport> Clone for DesktopHub<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), detached: self.detached.clone() }
    }
}

impl<C: Transport> DesktopHub<C> {
    /// Create the hub, nothing is read until the first subscriber arrives
    pub fn new(conn: Rc<C>, atoms: Rc<Atoms>) -> Self {
        let root = RootInfo::observer(conn.clone(), atoms.clone(), Properties::empty(), Properties2::empty());
        let hub = Hub {
            conn,
            atoms,
            level: None,
            root,
            subscribers: HashMap::new(),
            next_id: 0,
            windows: HashMap::new(),
            struts: HashMap::new(),
        };
        Self { inner: Rc::new(RefCell::new(hub)), detached: Rc::new(RefCell::new(vec![])) }
    }

    /// Mutable hub access with late detaches applied
    fn hub_mut(&self) -> std::cell::RefMut<'_, Hub<C>> {
        let mut hub = self.inner.borrow_mut();
        for id in self.detached.borrow_mut().drain(..) {
            hub.subscribers.remove(&id);
            trace!("detach: id: {}, subscribers: {}", id, hub.subscribers.len());
        }
        hub
    }

    /// Attach a subscriber, widening the shared root object when it needs more than is tracked
    ///
    /// ### Examples
    /// ```ignore
    /// let hub = DesktopHub::new(conn, atoms);
    /// let module = hub.subscribe(InfoLevel::Basic)?;
    /// println!("{} desktops", module.number_of_desktops());
    /// ```
    pub fn subscribe(&self, level: InfoLevel) -> NetwmResult<DesktopModule<C>> {
        let mut hub = self.hub_mut();
        if hub.level.map_or(true, |x| level > x) {
            hub.rebuild(level)?;
        }
        let id = hub.next_id;
        hub.next_id += 1;
        hub.subscribers.insert(id, Subscriber { level, queue: VecDeque::new() });
        debug!("subscribe: id: {}, level: {:?}, subscribers: {}", id, level, hub.subscribers.len());
        Ok(DesktopModule { hub: Rc::downgrade(&self.inner), detached: self.detached.clone(), id, level })
    }

    /// Level the shared root object currently tracks
    pub fn level(&self) -> Option<InfoLevel> {
        self.inner.borrow().level
    }

    pub fn subscribers(&self) -> usize {
        self.hub_mut().subscribers.len()
    }

    /// Feed one event to the shared objects and queue the resulting notifications
    pub fn process_event(&self, event: &Event) -> NetwmResult<()> {
        self.hub_mut().process_event(event)
    }

    /// Process every event already queued on the connection, returning how many there were
    pub fn pump(&self) -> NetwmResult<usize> {
        let conn = self.inner.borrow().conn.clone();
        let mut count = 0;
        while let Some(event) = conn.poll_event()? {
            self.process_event(&event)?;
            count += 1;
        }
        if count > 0 {
            trace!("pump: events: {}", count);
        }
        Ok(count)
    }
}

impl<C: Transport> Hub<C> {
    fn rebuild(&mut self, level: InfoLevel) -> NetwmResult<()> {
        let (properties, properties2) = level.root_fields();
        let mut root = RootInfo::observer(self.conn.clone(), self.atoms.clone(), properties, properties2);
        // Select first so changes made while reading still arrive as events
        self.conn.watch_window(self.conn.root())?;
        root.activate()?;
        root.drain_list_changes();
        debug!("rebuild: level: {:?} -> {:?}, clients: {}", self.level, level, root.client_list().len());

        let old = std::mem::replace(&mut self.root, root);
        self.level = Some(level);
        let mut changes = vec![];
        codec::diff_sorted(old.client_list(), self.root.client_list(), |x| {
            changes.push(match x {
                ListDiff::Added(w) => ListChange::ClientAdded(w),
                ListDiff::Removed(w) => ListChange::ClientRemoved(w),
            })
        });
        codec::diff_sorted(old.kde_system_tray_windows(), self.root.kde_system_tray_windows(), |x| {
            changes.push(match x {
                ListDiff::Added(w) => ListChange::TrayAdded(w),
                ListDiff::Removed(w) => ListChange::TrayRemoved(w),
            })
        });
        self.apply_list_changes(changes)?;

        let clients = self.root.client_list().to_vec();
        for w in clients {
            self.track(w)?;
        }
        Ok(())
    }

    fn track(&mut self, window: Window) -> NetwmResult<()> {
        self.conn.watch_window(window)?;
        if self.level == Some(InfoLevel::Windows) && !self.windows.contains_key(&window) {
            let info = WinInfo::fetch(self.conn.clone(), self.atoms.clone(), window, Role::Observer, InfoLevel::window_fields())?;
            self.windows.insert(window, info);
        }
        Ok(())
    }

    fn broadcast(&mut self, event: DesktopEvent) {
        let level = event.level();
        for sub in self.subscribers.values_mut().filter(|x| x.level >= level) {
            sub.queue.push_back(event);
        }
    }

    fn apply_list_changes(&mut self, changes: Vec<ListChange>) -> NetwmResult<()> {
        for change in changes {
            match change {
                ListChange::ClientAdded(w) => {
                    self.track(w)?;
                    self.broadcast(DesktopEvent::WindowAdded(w));
                },
                ListChange::ClientRemoved(w) => {
                    self.windows.remove(&w);
                    if self.struts.remove(&w).map_or(false, |x| !x.strut.is_empty()) {
                        self.broadcast(DesktopEvent::StrutChanged(w));
                    }
                    self.broadcast(DesktopEvent::WindowRemoved(w));
                },
                ListChange::TrayAdded(w) => self.broadcast(DesktopEvent::SystemTrayWindowAdded(w)),
                ListChange::TrayRemoved(w) => self.broadcast(DesktopEvent::SystemTrayWindowRemoved(w)),
            }
        }
        Ok(())
    }

    fn process_event(&mut self, event: &Event) -> NetwmResult<()> {
        let ev = match event {
            Event::Property(ev) => ev,
            _ => return Ok(()),
        };
        if ev.window == self.conn.root() {
            let dirty = self.root.event(event)?;
            let changes = self.root.drain_list_changes();
            self.apply_list_changes(changes)?;
            self.root_changed(dirty.properties, dirty.properties2);
        } else if self.root.client_list().binary_search(&ev.window).is_ok() {
            let dirty = dispatch::window_event_dirty(&*self.conn, &self.atoms, ev)?;
            self.window_changed(ev.window, dirty)?;
        }
        Ok(())
    }

    fn root_changed(&mut self, p: Properties, p2: Properties2) {
        let root = &self.root;
        let mut events = vec![];
        if p.contains(Properties::NUMBER_OF_DESKTOPS) {
            events.push(DesktopEvent::NumberOfDesktopsChanged(root.number_of_desktops().max(1)));
        }
        if p.contains(Properties::CURRENT_DESKTOP) {
            events.push(DesktopEvent::CurrentDesktopChanged(root.current_desktop()));
        }
        if p.contains(Properties::DESKTOP_NAMES) {
            events.push(DesktopEvent::DesktopNamesChanged);
        }
        if p.contains(Properties::ACTIVE_WINDOW) {
            events.push(DesktopEvent::ActiveWindowChanged(root.active_window()));
        }
        if p.contains(Properties::CLIENT_LIST_STACKING) {
            events.push(DesktopEvent::StackingOrderChanged);
        }
        if p.contains(Properties::WORK_AREA) {
            events.push(DesktopEvent::WorkAreaChanged);
        }
        if p2.contains(Properties2::SHOWING_DESKTOP) {
            events.push(DesktopEvent::ShowingDesktopChanged(root.showing_desktop()));
        }
        for event in events {
            self.broadcast(event);
        }
    }

    fn window_changed(&mut self, window: Window, dirty: Properties) -> NetwmResult<()> {
        if let Some(info) = self.windows.get_mut(&window) {
            info.update(dirty)?;
            let properties = dirty & info.properties();
            if !properties.is_empty() {
                self.broadcast(DesktopEvent::WindowChanged { window, properties });
            }
        }
        if dirty.intersects(STRUT_FIELDS) {
            if let Some(old) = self.struts.remove(&window) {
                let new = self.resolve_strut(window)?;
                if new != old {
                    self.broadcast(DesktopEvent::StrutChanged(window));
                }
            } else if dirty.contains(Properties::WM_STRUT) {
                self.broadcast(DesktopEvent::StrutChanged(window));
            }
        }
        Ok(())
    }

    /// Cached strut of a client, read once and kept until a strut notification invalidates it
    fn resolve_strut(&mut self, window: Window) -> NetwmResult<StrutEntry> {
        if let Some(entry) = self.struts.get(&window) {
            return Ok(*entry);
        }
        let entry = match self.windows.get(&window) {
            Some(info) => StrutEntry { desktop: info.desktop(), strut: info.strut() },
            None => {
                let info = WinInfo::fetch(self.conn.clone(), self.atoms.clone(), window, Role::Observer, STRUT_FIELDS)?;
                StrutEntry { desktop: info.desktop(), strut: info.strut() }
            },
        };
        trace!("resolve_strut: window: {}, entry: {:?}", window, entry);
        self.struts.insert(window, entry);
        Ok(entry)
    }

    fn desktop_or_current(&self, desktop: u32) -> u32 {
        match desktop {
            0 => self.root.current_desktop().max(1),
            x => x,
        }
    }

    fn work_area_excluding(&mut self, exclude: &[Window], desktop: u32) -> NetwmResult<Rect> {
        let desktop = self.desktop_or_current(desktop) as i32;
        let screen = Rect::from_size(self.conn.screen_size());
        let clients: Vec<Window> = self.root.client_list().iter().copied().filter(|x| !exclude.contains(x)).collect();
        let mut reserved = Strut::default();
        for w in clients {
            let entry = self.resolve_strut(w)?;
            if entry.desktop != desktop && entry.desktop != ON_ALL_DESKTOPS {
                continue;
            }
            reserved.left = reserved.left.max(entry.strut.left);
            reserved.right = reserved.right.max(entry.strut.right);
            reserved.top = reserved.top.max(entry.strut.top);
            reserved.bottom = reserved.bottom.max(entry.strut.bottom);
        }
        Ok(screen.shrink(&reserved))
    }
}

/// Subscriber handle returned by [`DesktopHub::subscribe`]
///
/// Queries read the shared cache. Dropping the handle detaches it from the hub. Once the hub is
/// gone the queries return zero values.
pub struct DesktopModule<C: Transport> {
    hub: Weak<RefCell<Hub<C>>>,
    detached: Detached,
    id: usize,
    level: InfoLevel,
}

impl<C: Transport> Drop for DesktopModule<C> {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            match hub.try_borrow_mut() {
                Ok(mut hub) => {
                    hub.subscribers.remove(&self.id);
                    trace!("drop: id: {}, subscribers: {}", self.id, hub.subscribers.len());
                },
                Err(_) => self.detached.borrow_mut().push(self.id),
            }
        }
    }
}

impl<C: Transport> DesktopModule<C> {
    fn with<R: Default>(&self, f: impl FnOnce(&Hub<C>) -> R) -> R {
        match self.hub.upgrade() {
            Some(hub) => f(&hub.borrow()),
            None => R::default(),
        }
    }

    fn with_mut<R: Default>(&self, f: impl FnOnce(&mut Hub<C>) -> NetwmResult<R>) -> NetwmResult<R> {
        match self.hub.upgrade() {
            Some(hub) => f(&mut hub.borrow_mut()),
            None => Ok(R::default()),
        }
    }

    pub fn level(&self) -> InfoLevel {
        self.level
    }

    /// Notifications queued for this subscriber since the last call
    pub fn take_events(&self) -> Vec<DesktopEvent> {
        let id = self.id;
        self.with_mut(|hub| Ok(hub.subscribers.get_mut(&id).map(|x| x.queue.drain(..).collect()).unwrap_or_default()))
            .unwrap_or_default()
    }

    /// Managed windows, sorted by id
    pub fn windows(&self) -> Vec<Window> {
        self.with(|hub| hub.root.client_list().to_vec())
    }

    pub fn has_window(&self, window: Window) -> bool {
        self.with(|hub| hub.root.client_list().binary_search(&window).is_ok())
    }

    /// Managed windows from bottom to top
    pub fn stacking_order(&self) -> Vec<Window> {
        self.with(|hub| hub.root.client_list_stacking().to_vec())
    }

    pub fn system_tray_windows(&self) -> Vec<Window> {
        self.with(|hub| hub.root.kde_system_tray_windows().to_vec())
    }

    /// One-based current desktop
    pub fn current_desktop(&self) -> u32 {
        self.with(|hub| hub.root.current_desktop().max(1))
    }

    /// Number of desktops, never less than one
    pub fn number_of_desktops(&self) -> u32 {
        self.with(|hub| hub.root.number_of_desktops().max(1))
    }

    /// Published name of a one-based desktop, `Desktop N` when it has none
    pub fn desktop_name(&self, desktop: u32) -> String {
        self.with(|hub| {
            let desktop = hub.desktop_or_current(desktop);
            hub.root.desktop_name(desktop).map(String::from).unwrap_or_else(|| format!("Desktop {}", desktop))
        })
    }

    pub fn active_window(&self) -> Window {
        self.with(|hub| hub.root.active_window())
    }

    pub fn showing_desktop(&self) -> bool {
        self.with(|hub| hub.root.showing_desktop())
    }

    /// Name of the running window manager, empty when none is known
    pub fn wm_name(&self) -> String {
        self.with(|hub| hub.root.wm_name().to_string())
    }

    /// Published work area of a desktop, 0 meaning the current one
    ///
    /// Falls back to the whole screen when the manager does not publish one.
    pub fn work_area(&self, desktop: u32) -> Rect {
        self.with(|hub| {
            let area = hub.root.work_area(hub.desktop_or_current(desktop));
            if area.is_empty() {
                Rect::from_size(hub.conn.screen_size())
            } else {
                area
            }
        })
    }

    /// Screen minus the struts of every client on the desktop, ignoring the excluded windows
    ///
    /// A strut counts when its window is on the queried desktop or on all desktops.
    pub fn work_area_excluding(&self, exclude: &[Window], desktop: u32) -> NetwmResult<Rect> {
        self.with_mut(|hub| hub.work_area_excluding(exclude, desktop))
    }

    /// Run `f` on the tracked hints of a managed window, `Windows` level only
    pub fn with_window<R>(&self, window: Window, f: impl FnOnce(&WinInfo<C>) -> R) -> Option<R> {
        let hub = self.hub.upgrade()?;
        let hub = hub.borrow();
        hub.windows.get(&window).map(f)
    }

    /// Ask the manager to switch to a one-based desktop
    pub fn set_current_desktop(&self, desktop: u32) -> NetwmResult<()> {
        self.with_mut(|hub| hub.root.set_current_desktop(desktop))
    }

    pub fn set_desktop_name(&self, desktop: u32, name: &str) -> NetwmResult<()> {
        self.with_mut(|hub| hub.root.set_desktop_name(desktop, name))
    }
}

/// Block until a compliant window manager has announced itself, returning its check window
///
/// A manager is compliant once the root's `_NET_SUPPORTING_WM_CHECK` names a window carrying the
/// same property pointing at itself.
pub fn wait_for_manager<C: Transport + ?Sized>(conn: &C, atoms: &Atoms) -> NetwmResult<Window> {
    let root = conn.root();
    conn.watch_window(root)?;
    loop {
        if let Some(check) = supporting_window(conn, atoms, root)? {
            if supporting_window(conn, atoms, check)? == Some(check) {
                debug!("wait_for_manager: check: {}", check);
                return Ok(check);
            }
        }
        conn.wait_event()?;
    }
}

fn supporting_window<C: Transport + ?Sized>(conn: &C, atoms: &Atoms, window: Window) -> NetwmResult<Option<Window>> {
    let prop = conn.get_property(window, atoms._NET_SUPPORTING_WM_CHECK, atoms.WINDOW)?;
    Ok(prop.as_ref().and_then(|x| x.words(atoms.WINDOW)).and_then(|x| x.first().copied()).filter(|x| *x != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryServer, NetwmError, PropertyValue};

    const CHECK: Window = 0x500;

    fn setup() -> (Rc<MemoryServer>, Rc<Atoms>, RootInfo<MemoryServer>) {
        let server = Rc::new(MemoryServer::new());
        let atoms = Rc::new(Atoms::intern(&*server).unwrap());
        let mut wm = RootInfo::manager(
            server.clone(),
            atoms.clone(),
            CHECK,
            "testwm",
            Properties::root_fields(),
            Properties2::SHOWING_DESKTOP,
        );
        wm.activate().unwrap();
        wm.set_number_of_desktops(3).unwrap();
        wm.set_current_desktop(1).unwrap();
        (server, atoms, wm)
    }

    fn strut(server: &Rc<MemoryServer>, atoms: &Rc<Atoms>, window: Window, desktop: i32, strut: Strut) {
        let mut info = WinInfo::new(server.clone(), atoms.clone(), window, Role::Manager, STRUT_FIELDS);
        info.set_desktop(desktop).unwrap();
        info.set_strut(strut).unwrap();
    }

    #[test]
    fn test_widening_keeps_subscribers() {
        let (server, atoms, mut wm) = setup();
        wm.set_client_list(&[1, 2]).unwrap();
        let hub = DesktopHub::new(server.clone(), atoms.clone());
        assert_eq!(hub.level(), None);

        let basic = hub.subscribe(InfoLevel::Basic).unwrap();
        assert_eq!(basic.windows(), vec![1, 2]);
        assert_eq!(basic.wm_name(), "testwm");
        wm.set_client_list(&[3, 1, 2]).unwrap();
        hub.pump().unwrap();
        assert_eq!(basic.take_events(), vec![DesktopEvent::WindowAdded(3)]);

        let windows = hub.subscribe(InfoLevel::Windows).unwrap();
        assert_eq!(hub.level(), Some(InfoLevel::Windows));
        assert!(basic.take_events().is_empty());
        assert!(basic.has_window(3));
        assert_eq!(windows.with_window(3, |x| x.window()), Some(3));

        let _later = hub.subscribe(InfoLevel::Basic).unwrap();
        assert_eq!(hub.level(), Some(InfoLevel::Windows));
        assert_eq!(hub.subscribers(), 3);
    }

    #[test]
    fn test_drop_detaches() {
        let (server, atoms, _wm) = setup();
        let hub = DesktopHub::new(server, atoms);
        let a = hub.subscribe(InfoLevel::Basic).unwrap();
        {
            let _b = hub.subscribe(InfoLevel::Basic).unwrap();
            assert_eq!(hub.subscribers(), 2);
        }
        assert_eq!(hub.subscribers(), 1);
        drop(a);
        assert_eq!(hub.subscribers(), 0);
    }

    #[test]
    fn test_drop_while_hub_busy_detaches_later() {
        let (server, atoms, _wm) = setup();
        let hub = DesktopHub::new(server, atoms);
        let a = hub.subscribe(InfoLevel::Basic).unwrap();
        let _b = hub.subscribe(InfoLevel::Basic).unwrap();
        {
            let _busy = hub.inner.borrow_mut();
            drop(a);
        }
        assert_eq!(hub.detached.borrow().len(), 1);
        assert_eq!(hub.subscribers(), 1);
        assert!(hub.detached.borrow().is_empty());
    }

    #[test]
    fn test_windows_watched_before_first_read() {
        let (server, atoms, mut wm) = setup();
        wm.set_client_list(&[7]).unwrap();
        let root = server.root();
        let before = (server.unwatched_reads(root), server.unwatched_reads(7));

        let hub = DesktopHub::new(server.clone(), atoms);
        let module = hub.subscribe(InfoLevel::Windows).unwrap();
        assert!(module.has_window(7));
        assert!(server.is_watched(root));
        assert_eq!((server.unwatched_reads(root), server.unwatched_reads(7)), before);
    }

    #[test]
    fn test_root_notifications() {
        let (server, atoms, mut wm) = setup();
        let hub = DesktopHub::new(server, atoms);
        let module = hub.subscribe(InfoLevel::Basic).unwrap();
        wm.set_current_desktop(2).unwrap();
        wm.set_active_window(0x42).unwrap();
        wm.set_showing_desktop(true).unwrap();
        hub.pump().unwrap();

        let events = module.take_events();
        assert!(events.contains(&DesktopEvent::CurrentDesktopChanged(2)));
        assert!(events.contains(&DesktopEvent::ActiveWindowChanged(0x42)));
        assert!(events.contains(&DesktopEvent::ShowingDesktopChanged(true)));
        assert_eq!(module.current_desktop(), 2);
        assert_eq!(module.number_of_desktops(), 3);
    }

    #[test]
    fn test_desktop_names_and_zero_count() {
        let server = Rc::new(MemoryServer::new());
        let atoms = Rc::new(Atoms::intern(&*server).unwrap());
        let hub = DesktopHub::new(server.clone(), atoms.clone());
        let module = hub.subscribe(InfoLevel::Basic).unwrap();
        assert_eq!(module.number_of_desktops(), 1);
        assert_eq!(module.desktop_name(2), "Desktop 2");

        let names = PropertyValue::Format8(b"Main\0\0".to_vec());
        server.set_property(server.root(), atoms._NET_DESKTOP_NAMES, atoms.UTF8_STRING, &names).unwrap();
        hub.pump().unwrap();
        assert_eq!(module.take_events(), vec![DesktopEvent::DesktopNamesChanged]);
        assert_eq!(module.desktop_name(1), "Main");
        assert_eq!(module.desktop_name(2), "Desktop 2");
    }

    #[test]
    fn test_work_area_fallback() {
        let (server, atoms, mut wm) = setup();
        let hub = DesktopHub::new(server, atoms);
        let module = hub.subscribe(InfoLevel::Basic).unwrap();
        assert_eq!(module.work_area(1), Rect::new(0, 0, 1024, 768));

        wm.set_work_area(1, Rect::new(0, 24, 1024, 744)).unwrap();
        hub.pump().unwrap();
        assert_eq!(module.take_events(), vec![DesktopEvent::WorkAreaChanged]);
        assert_eq!(module.work_area(0), Rect::new(0, 24, 1024, 744));
        assert_eq!(module.work_area(2), Rect::new(0, 0, 1024, 768));
    }

    #[test]
    fn test_work_area_excluding_struts() {
        let (server, atoms, mut wm) = setup();
        strut(&server, &atoms, 1, 1, Strut::new(0, 0, 24, 0));
        strut(&server, &atoms, 2, 2, Strut::new(50, 0, 0, 0));
        strut(&server, &atoms, 3, ON_ALL_DESKTOPS, Strut::new(0, 0, 0, 30));
        wm.set_client_list(&[1, 2, 3]).unwrap();

        let hub = DesktopHub::new(server.clone(), atoms.clone());
        let module = hub.subscribe(InfoLevel::Basic).unwrap();
        assert_eq!(module.work_area_excluding(&[], 1).unwrap(), Rect::new(0, 24, 1024, 714));
        assert_eq!(module.work_area_excluding(&[3], 1).unwrap(), Rect::new(0, 24, 1024, 744));
        assert_eq!(module.work_area_excluding(&[], 2).unwrap(), Rect::new(50, 0, 974, 738));

        strut(&server, &atoms, 1, 1, Strut::new(0, 0, 40, 0));
        hub.pump().unwrap();
        assert_eq!(module.work_area_excluding(&[], 1).unwrap(), Rect::new(0, 40, 1024, 698));
    }

    #[test]
    fn test_strut_changes_gated_by_level() {
        let (server, atoms, mut wm) = setup();
        wm.set_client_list(&[7]).unwrap();
        let hub = DesktopHub::new(server.clone(), atoms.clone());
        let basic = hub.subscribe(InfoLevel::Basic).unwrap();
        let windows = hub.subscribe(InfoLevel::Windows).unwrap();

        strut(&server, &atoms, 7, 1, Strut::new(0, 0, 0, 48));
        hub.pump().unwrap();
        assert!(basic.take_events().is_empty());
        let events = windows.take_events();
        assert!(events.contains(&DesktopEvent::StrutChanged(7)));
        assert!(events.iter().any(|x| matches!(x, DesktopEvent::WindowChanged { window: 7, properties } if properties.contains(Properties::WM_STRUT))));
        assert_eq!(windows.with_window(7, |x| x.strut()), Some(Strut::new(0, 0, 0, 48)));
    }

    #[test]
    fn test_removed_window_forgets_strut() {
        let (server, atoms, mut wm) = setup();
        strut(&server, &atoms, 1, 1, Strut::new(0, 0, 24, 0));
        wm.set_client_list(&[1]).unwrap();
        let hub = DesktopHub::new(server.clone(), atoms.clone());
        let module = hub.subscribe(InfoLevel::Windows).unwrap();
        assert_eq!(module.work_area_excluding(&[], 1).unwrap(), Rect::new(0, 24, 1024, 744));

        wm.set_client_list(&[]).unwrap();
        hub.pump().unwrap();
        assert_eq!(module.take_events(), vec![DesktopEvent::StrutChanged(1), DesktopEvent::WindowRemoved(1)]);
        assert_eq!(module.work_area_excluding(&[], 1).unwrap(), Rect::new(0, 0, 1024, 768));
    }

    #[test]
    fn test_requests_go_to_manager() {
        let (server, atoms, _wm) = setup();
        let hub = DesktopHub::new(server.clone(), atoms.clone());
        let module = hub.subscribe(InfoLevel::Windows).unwrap();
        server.take_sent();
        module.set_current_desktop(3).unwrap();
        let sent = server.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.type_, atoms._NET_CURRENT_DESKTOP);
        assert_eq!(sent[0].message.data[0], 2);
        assert_eq!(module.current_desktop(), 1);
    }

    #[test]
    fn test_wait_for_manager() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        let err = wait_for_manager(&server, &atoms).unwrap_err();
        assert!(matches!(err.downcast_ref::<NetwmError>(), Some(NetwmError::NoPendingEvents)));

        let (server, atoms, _wm) = setup();
        assert_eq!(wait_for_manager(&*server, &atoms).unwrap(), CHECK);
    }
}
