use crate::{Atom, NetwmError, NetwmResult, Transport};
use tracing::debug;

/// Declares the atom table struct with one public field per atom name plus the ordered name
/// list used to intern them all in a single batch.
macro_rules! atom_table {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field:ident,)* }) => {
        $(#[$meta])*
        #[allow(non_snake_case)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        $vis struct $name {
            $(pub $field: Atom,)*
        }

        impl $name {
            /// Every name in the table, in field order
            pub const NAMES: &'static [&'static str] = &[$(stringify!($field),)*];

            fn from_resolved(atoms: &[Atom]) -> Self {
                let mut iter = atoms.iter().copied();
                Self {
                    $($field: iter.next().unwrap_or_default(),)*
                }
            }

            /// Name and atom pairs, in field order
            pub fn pairs(&self) -> Vec<(&'static str, Atom)> {
                vec![$((stringify!($field), self.$field),)*]
            }
        }
    };
}

atom_table! {
    /// Atom Table resolving every protocol name the engine uses
    ///
    /// Built once per connection with a single batched request and immutable afterwards. Share it
    /// between protocol objects with an `Rc<Atoms>`.
    pub struct Atoms {
        // core and ICCCM
        ATOM,
        CARDINAL,
        STRING,
        WINDOW,
        UTF8_STRING,
        WM_NAME,
        WM_ICON_NAME,
        WM_STATE,
        WM_PROTOCOLS,

        // root window properties and messages
        _NET_SUPPORTED,
        _NET_CLIENT_LIST,
        _NET_CLIENT_LIST_STACKING,
        _NET_NUMBER_OF_DESKTOPS,
        _NET_DESKTOP_GEOMETRY,
        _NET_DESKTOP_VIEWPORT,
        _NET_CURRENT_DESKTOP,
        _NET_DESKTOP_NAMES,
        _NET_ACTIVE_WINDOW,
        _NET_WORKAREA,
        _NET_SUPPORTING_WM_CHECK,
        _NET_VIRTUAL_ROOTS,
        _NET_SHOWING_DESKTOP,
        _NET_CLOSE_WINDOW,
        _NET_MOVERESIZE_WINDOW,
        _NET_WM_MOVERESIZE,

        // application window properties
        _NET_WM_NAME,
        _NET_WM_VISIBLE_NAME,
        _NET_WM_ICON_NAME,
        _NET_WM_VISIBLE_ICON_NAME,
        _NET_WM_DESKTOP,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_STATE,
        _NET_WM_STRUT,
        _NET_WM_ICON_GEOMETRY,
        _NET_WM_ICON,
        _NET_WM_PID,
        _NET_WM_HANDLED_ICONS,
        _NET_WM_PING,
        _NET_FRAME_EXTENTS,

        // window types
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_MENU,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _KDE_NET_WM_WINDOW_TYPE_OVERRIDE,
        _KDE_NET_WM_WINDOW_TYPE_TOPMENU,

        // window states
        _NET_WM_STATE_MODAL,
        _NET_WM_STATE_STICKY,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        _NET_WM_STATE_SHADED,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_BELOW,
        _NET_WM_STATE_DEMANDS_ATTENTION,
        _NET_WM_STATE_STAYS_ON_TOP,

        // KDE extensions
        _KDE_NET_SYSTEM_TRAY_WINDOWS,
        _KDE_NET_WM_SYSTEM_TRAY_WINDOW_FOR,
        _KDE_NET_WM_FRAME_STRUT,
    }
}

impl Atoms {
    /// Resolve the whole table with one batched request
    ///
    /// There is no partial table: a short reply or any unresolved name fails the whole call.
    ///
    /// ### Examples
    /// ```ignore
    /// let atoms = Rc::new(Atoms::intern(&*conn)?);
    /// ```
    pub fn intern<C: Transport + ?Sized>(conn: &C) -> NetwmResult<Self> {
        let resolved = conn.intern_atoms(Self::NAMES)?;
        if resolved.len() != Self::NAMES.len() || resolved.iter().any(|x| *x == 0) {
            return Err(NetwmError::AtomsUnavailable.into());
        }
        debug!("intern: atoms: {}", resolved.len());
        Ok(Self::from_resolved(&resolved))
    }

    /// Reverse lookup used for logging
    pub fn name_of(&self, atom: Atom) -> Option<&'static str> {
        self.pairs().into_iter().find(|(_, x)| *x == atom).map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryServer;

    #[test]
    fn test_intern_is_one_batch() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        assert_eq!(server.intern_requests(), 1);
        assert_ne!(atoms._NET_WM_STATE, atoms._NET_WM_NAME);
        assert_eq!(atoms.name_of(atoms._NET_CLIENT_LIST), Some("_NET_CLIENT_LIST"));
        assert_eq!(atoms.name_of(0), None);
    }

    #[test]
    fn test_predefined_atoms() {
        let server = MemoryServer::new();
        let atoms = Atoms::intern(&server).unwrap();
        assert_eq!(atoms.CARDINAL, 6);
        assert_eq!(atoms.WINDOW, 33);
        assert_eq!(atoms.WM_NAME, 39);
    }

    #[test]
    fn test_independent_tables() {
        let first = MemoryServer::new();
        let second = MemoryServer::new();
        second.intern_atoms(&["_SOMETHING_ELSE"]).unwrap();
        let a = Atoms::intern(&first).unwrap();
        let b = Atoms::intern(&second).unwrap();
        assert_ne!(a._NET_SUPPORTED, b._NET_SUPPORTED);
    }

    #[test]
    fn test_unresolved_fails() {
        let server = MemoryServer::new();
        server.refuse_atoms(true);
        assert!(Atoms::intern(&server).unwrap_err().is::<NetwmError>());
    }
}
