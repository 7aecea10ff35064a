use std::{convert, fmt};

use bitflags::bitflags;

pub use x11rb::protocol::xproto::{Atom, Window};

use crate::NetwmError;

/// Window desktop value meaning the window is shown on every desktop
pub const ON_ALL_DESKTOPS: i32 = -1;

/// Wire value for [`ON_ALL_DESKTOPS`]
pub(crate) const ON_ALL_DESKTOPS_WIRE: u32 = 0xFFFF_FFFF;

/// `_NET_WM_STATE` request actions
pub(crate) const WINDOW_STATE_ACTION_REMOVE: u32 = 0;
pub(crate) const WINDOW_STATE_ACTION_ADD: u32 = 1;
pub(crate) const WINDOW_STATE_ACTION_TOGGLE: u32 = 2;

/// Role a protocol object plays on the connection
///
/// The manager is the single authority that writes root and window state. Observers (pagers,
/// taskbars, applications) read state and ask the manager for changes through client messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Manager,
    Observer,
}

// Implement format! support
impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

bitflags! {
    /// First word of the field mask
    ///
    /// Used both as a subscription mask (which fields an object reads and tracks) and as a dirty
    /// mask (which fields changed on the last event).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Properties: u32 {
        const SUPPORTED = 1 << 0;
        const CLIENT_LIST = 1 << 1;
        const CLIENT_LIST_STACKING = 1 << 2;
        const NUMBER_OF_DESKTOPS = 1 << 3;
        const DESKTOP_GEOMETRY = 1 << 4;
        const DESKTOP_VIEWPORT = 1 << 5;
        const CURRENT_DESKTOP = 1 << 6;
        const DESKTOP_NAMES = 1 << 7;
        const ACTIVE_WINDOW = 1 << 8;
        const WORK_AREA = 1 << 9;
        const SUPPORTING_WM_CHECK = 1 << 10;
        const VIRTUAL_ROOTS = 1 << 11;
        const KDE_SYSTEM_TRAY_WINDOWS = 1 << 12;
        const CLOSE_WINDOW = 1 << 13;
        const WM_MOVE_RESIZE = 1 << 14;
        const WM_NAME = 1 << 15;
        const WM_VISIBLE_NAME = 1 << 16;
        const WM_DESKTOP = 1 << 17;
        const WM_WINDOW_TYPE = 1 << 18;
        const WM_STATE = 1 << 19;
        const WM_STRUT = 1 << 20;
        const WM_ICON_GEOMETRY = 1 << 21;
        const WM_ICON = 1 << 22;
        const WM_PID = 1 << 23;
        const WM_HANDLED_ICONS = 1 << 24;
        const WM_PING = 1 << 25;
        const KDE_SYSTEM_TRAY_WIN_FOR = 1 << 26;
        const XA_WM_STATE = 1 << 27;
        const WM_KDE_FRAME_STRUT = 1 << 28;
        const WM_ICON_NAME = 1 << 29;
        const WM_VISIBLE_ICON_NAME = 1 << 30;
    }
}

impl Properties {
    /// Every field kept on the root object
    pub fn root_fields() -> Self {
        Properties::SUPPORTED
            | Properties::CLIENT_LIST
            | Properties::CLIENT_LIST_STACKING
            | Properties::NUMBER_OF_DESKTOPS
            | Properties::DESKTOP_GEOMETRY
            | Properties::DESKTOP_VIEWPORT
            | Properties::CURRENT_DESKTOP
            | Properties::DESKTOP_NAMES
            | Properties::ACTIVE_WINDOW
            | Properties::WORK_AREA
            | Properties::SUPPORTING_WM_CHECK
            | Properties::VIRTUAL_ROOTS
            | Properties::KDE_SYSTEM_TRAY_WINDOWS
    }

    /// Every field kept on a window object
    pub fn window_fields() -> Self {
        Properties::WM_NAME
            | Properties::WM_VISIBLE_NAME
            | Properties::WM_DESKTOP
            | Properties::WM_WINDOW_TYPE
            | Properties::WM_STATE
            | Properties::WM_STRUT
            | Properties::WM_ICON_GEOMETRY
            | Properties::WM_ICON
            | Properties::WM_PID
            | Properties::WM_HANDLED_ICONS
            | Properties::KDE_SYSTEM_TRAY_WIN_FOR
            | Properties::XA_WM_STATE
            | Properties::WM_KDE_FRAME_STRUT
            | Properties::WM_ICON_NAME
            | Properties::WM_VISIBLE_ICON_NAME
    }
}

bitflags! {
    /// Second word of the field mask, for fields added after the first word filled up
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Properties2: u32 {
        const SHOWING_DESKTOP = 1 << 0;
        const MOVE_RESIZE_WINDOW = 1 << 1;
    }
}

/// Both field mask words together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dirty {
    pub properties: Properties,
    pub properties2: Properties2,
}

impl Dirty {
    pub fn new(properties: Properties, properties2: Properties2) -> Self {
        Self { properties, properties2 }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.properties2.is_empty()
    }

    /// Keep only the fields present in both masks
    pub fn intersection(self, other: Dirty) -> Dirty {
        Dirty::new(self.properties & other.properties, self.properties2 & other.properties2)
    }
}

impl std::ops::BitOr for Dirty {
    type Output = Dirty;

    fn bitor(self, rhs: Dirty) -> Dirty {
        Dirty::new(self.properties | rhs.properties, self.properties2 | rhs.properties2)
    }
}

impl std::ops::BitOrAssign for Dirty {
    fn bitor_assign(&mut self, rhs: Dirty) {
        *self = *self | rhs;
    }
}

impl From<Properties> for Dirty {
    fn from(val: Properties) -> Self {
        Dirty::new(val, Properties2::empty())
    }
}

impl From<Properties2> for Dirty {
    fn from(val: Properties2) -> Self {
        Dirty::new(Properties::empty(), val)
    }
}

bitflags! {
    /// WinState provides an easy way to identify the different window states
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WinState: u32 {
        const MODAL = 1 << 0;
        const STICKY = 1 << 1;
        const MAX_VERT = 1 << 2;
        const MAX_HORIZ = 1 << 3;
        const MAX = Self::MAX_VERT.bits() | Self::MAX_HORIZ.bits();
        const SHADED = 1 << 4;
        const SKIP_TASKBAR = 1 << 5;
        const STAYS_ON_TOP = 1 << 6;
        const SKIP_PAGER = 1 << 7;
        const HIDDEN = 1 << 8;
        const FULL_SCREEN = 1 << 9;
        const KEEP_ABOVE = 1 << 10;
        const KEEP_BELOW = 1 << 11;
        const DEMANDS_ATTENTION = 1 << 12;
    }
}

impl WinState {
    const NAMED: [(&'static str, WinState); 13] = [
        ("modal", WinState::MODAL),
        ("sticky", WinState::STICKY),
        ("maxvert", WinState::MAX_VERT),
        ("maxhorz", WinState::MAX_HORIZ),
        ("shaded", WinState::SHADED),
        ("skiptaskbar", WinState::SKIP_TASKBAR),
        ("staysontop", WinState::STAYS_ON_TOP),
        ("skippager", WinState::SKIP_PAGER),
        ("hidden", WinState::HIDDEN),
        ("fullscreen", WinState::FULL_SCREEN),
        ("above", WinState::KEEP_ABOVE),
        ("below", WinState::KEEP_BELOW),
        ("attention", WinState::DEMANDS_ATTENTION),
    ];
}

// Implement format! support
impl fmt::Display for WinState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = WinState::NAMED.iter().filter(|(_, x)| self.contains(*x)).map(|(name, _)| *name).collect();
        write!(f, "{}", names.join(","))
    }
}

// Convert from &str to State
impl convert::TryFrom<&str> for WinState {
    type Error = NetwmError;

    fn try_from(val: &str) -> Result<Self, Self::Error> {
        let lower = val.to_lowercase();
        if lower == "max" {
            return Ok(WinState::MAX);
        }
        WinState::NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, x)| *x)
            .ok_or_else(|| NetwmError::InvalidWinState(val.to_string()))
    }
}

/// WinType provides an easy way to identify the different window types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WinType {
    #[default]
    Unknown,
    Normal,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Dialog,
    Override,
    TopMenu,
    Utility,
    Splash,
}

// Implement format! support
impl fmt::Display for WinType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

// Convert from &str to Type
impl convert::TryFrom<&str> for WinType {
    type Error = NetwmError;

    fn try_from(val: &str) -> Result<Self, Self::Error> {
        match val.to_lowercase().as_ref() {
            "normal" => Ok(WinType::Normal),
            "desktop" => Ok(WinType::Desktop),
            "dock" => Ok(WinType::Dock),
            "toolbar" => Ok(WinType::Toolbar),
            "menu" => Ok(WinType::Menu),
            "dialog" => Ok(WinType::Dialog),
            "override" => Ok(WinType::Override),
            "topmenu" => Ok(WinType::TopMenu),
            "utility" => Ok(WinType::Utility),
            "splash" => Ok(WinType::Splash),
            _ => Err(NetwmError::InvalidWinType(val.to_string())),
        }
    }
}

/// ICCCM mapping state as reported by `WM_STATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MappingState {
    Visible,
    #[default]
    Withdrawn,
    Iconic,
}

impl MappingState {
    /// Convert from the `WM_STATE` wire value
    pub fn from_wire(val: u32) -> Self {
        match val {
            1 => MappingState::Visible,
            3 => MappingState::Iconic,
            _ => MappingState::Withdrawn,
        }
    }

    /// Visible and iconic windows are both managed by the window manager
    pub fn is_mapped(&self) -> bool {
        *self != MappingState::Withdrawn
    }
}

// Implement format! support
impl fmt::Display for MappingState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

/// Edge or corner grabbed by an interactive move/resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TopLeft = 0,
    Top = 1,
    TopRight = 2,
    Right = 3,
    BottomRight = 4,
    Bottom = 5,
    BottomLeft = 6,
    Left = 7,
    Move = 8,
}

impl convert::TryFrom<u32> for Direction {
    type Error = NetwmError;

    fn try_from(val: u32) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Direction::TopLeft),
            1 => Ok(Direction::Top),
            2 => Ok(Direction::TopRight),
            3 => Ok(Direction::Right),
            4 => Ok(Direction::BottomRight),
            5 => Ok(Direction::Bottom),
            6 => Ok(Direction::BottomLeft),
            7 => Ok(Direction::Left),
            8 => Ok(Direction::Move),
            _ => Err(NetwmError::InvalidDirection(val)),
        }
    }
}

/// WinGravity
/// Gravity is defined as the lower byte of the move resize flags 32bit value
/// <https://tronche.com/gui/x/xlib/window/attributes/gravity.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WinGravity {
    #[default]
    Default,
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
    Static,
}

impl From<u32> for WinGravity {
    fn from(val: u32) -> Self {
        match val {
            1 => WinGravity::NorthWest,
            2 => WinGravity::North,
            3 => WinGravity::NorthEast,
            4 => WinGravity::West,
            5 => WinGravity::Center,
            6 => WinGravity::East,
            7 => WinGravity::SouthWest,
            8 => WinGravity::South,
            9 => WinGravity::SouthEast,
            10 => WinGravity::Static,
            _ => WinGravity::Default,
        }
    }
}

impl From<WinGravity> for u32 {
    fn from(val: WinGravity) -> Self {
        val as u32
    }
}

bitflags! {
    /// Which fields of a `_NET_MOVERESIZE_WINDOW` request are meaningful
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MoveResizeMask: u32 {
        const X = 1 << 8;
        const Y = 1 << 9;
        const WIDTH = 1 << 10;
        const HEIGHT = 1 << 11;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin covering the given size
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of both rectangles, empty at the left/top corner of `self` when disjoint
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = (self.x as i64).max(other.x as i64);
        let top = (self.y as i64).max(other.y as i64);
        let right = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let bottom = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        if right <= left || bottom <= top {
            return Rect::new(self.x, self.y, 0, 0);
        }
        Rect::new(left as i32, top as i32, (right - left) as u32, (bottom - top) as u32)
    }

    /// Remove the margins reserved by a strut from each edge
    pub fn shrink(&self, strut: &Strut) -> Rect {
        let width = self.width.saturating_sub(strut.left.saturating_add(strut.right));
        let height = self.height.saturating_sub(strut.top.saturating_add(strut.bottom));
        Rect::new(
            self.x.saturating_add(strut.left.min(i32::MAX as u32) as i32),
            self.y.saturating_add(strut.top.min(i32::MAX as u32) as i32),
            width,
            height,
        )
    }

    /// Grow by the margins of a frame strut
    pub fn grow(&self, strut: &Strut) -> Rect {
        Rect::new(
            self.x.saturating_sub(strut.left.min(i32::MAX as u32) as i32),
            self.y.saturating_sub(strut.top.min(i32::MAX as u32) as i32),
            self.width.saturating_add(strut.left).saturating_add(strut.right),
            self.height.saturating_add(strut.top).saturating_add(strut.bottom),
        )
    }
}

// Implement format! support
impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Screen edge margins a window reserves, in `(left, right, top, bottom)` wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Strut {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Strut {
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self { left, right, top, bottom }
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Application icon with 32 bit ARGB pixels in row-major order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Icon {
    pub size: Size,
    pub data: Vec<u32>,
}

impl Icon {
    pub fn new(size: Size, data: Vec<u32>) -> Self {
        Self { size, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn test_win_state_parse() {
        assert_eq!(WinState::try_from("Shaded").unwrap(), WinState::SHADED);
        assert_eq!(WinState::try_from("max").unwrap(), WinState::MAX);
        assert!(WinState::try_from("wobbly").is_err());
        assert_eq!((WinState::STICKY | WinState::KEEP_ABOVE).to_string(), "sticky,above");
    }

    #[test]
    fn test_win_type_parse() {
        assert_eq!(WinType::try_from("TopMenu").unwrap(), WinType::TopMenu);
        assert_eq!(WinType::Dialog.to_string(), "dialog");
        assert!(WinType::try_from("popup").is_err());
    }

    #[test]
    fn test_rect_math() {
        let screen = Rect::new(0, 0, 1024, 768);
        let area = screen.shrink(&Strut::new(0, 0, 0, 30));
        assert_eq!(area, Rect::new(0, 0, 1024, 738));
        assert_eq!(screen.intersect(&Rect::new(100, 0, 2000, 100)), Rect::new(100, 0, 924, 100));
        assert!(screen.intersect(&Rect::new(2000, 0, 10, 10)).is_empty());
        assert_eq!(Rect::new(10, 20, 100, 50).grow(&Strut::new(2, 2, 20, 2)), Rect::new(8, 0, 104, 72));
    }

    #[test]
    fn test_mapping_state() {
        assert_eq!(MappingState::from_wire(1), MappingState::Visible);
        assert_eq!(MappingState::from_wire(3), MappingState::Iconic);
        assert!(!MappingState::from_wire(0).is_mapped());
    }
}
