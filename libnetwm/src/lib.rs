//! `libnetwm` implements the [Extended Window Manager Hints (EWMH) specification](https://specifications.freedesktop.org/wm-spec/latest/)
//! as a protocol engine usable from both sides of the conversation: the window manager that owns
//! the desktop state, and the pagers, taskbars and tools that observe it and ask for changes.
//!
//! [Root Window Properties](https://specifications.freedesktop.org/wm-spec/latest/ar01s03.html)
//! [`RootInfo`] mirrors the desktop-wide state kept on the root window. Built with
//! [`Role::Manager`] it writes that state; built with [`Role::Observer`] it reads it and sends the
//! manager requests for changes.
//!
//! [Application Window Properties](https://specifications.freedesktop.org/wm-spec/latest/ar01s05.html)
//! [`WinInfo`] does the same for the hints of one application window, including the legacy ICCCM
//! names and mapping state it falls back to.
//!
//! [`DesktopHub`] shares one observer between many subscribers in a process. All protocol objects
//! talk to the display through the [`Transport`] trait: [`X11Transport`] for a real X server and
//! [`MemoryServer`] for tests.
mod atoms;
pub mod codec;
mod desktop;
mod dispatch;
mod error;
mod memory;
mod model;
mod publish;
mod root;
mod transport;
mod window;
mod x11;
pub use atoms::Atoms;
pub use desktop::{wait_for_manager, DesktopEvent, DesktopHub, DesktopModule, InfoLevel};
pub use dispatch::{
    decode_root_request, decode_window_request, window_event_dirty, RequestHandlers, RootRequest, RootRequestKind, WindowRequest,
    WindowRequestKind,
};
pub use error::*;
pub use memory::{MemoryServer, SentMessage};
pub use model::*;
pub use root::{ListChange, RootInfo, RootState};
pub use transport::*;
pub use window::WinInfo;
pub use x11::X11Transport;

/// All essential symbols in a simple consumable form
///
/// ### Examples
/// ```
/// use libnetwm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::*;
}
