use std::rc::Rc;

use libnetwm::prelude::*;

fn main() {
    let conn = Rc::new(X11Transport::connect(None).unwrap());
    let atoms = Rc::new(Atoms::intern(&*conn).unwrap());
    let mut root = RootInfo::observer(conn.clone(), atoms.clone(), Properties::root_fields(), Properties2::SHOWING_DESKTOP);
    root.activate().unwrap();

    let current = root.current_desktop();
    println!("X11 Information");
    println!("-----------------------------------------------------------------------");
    println!("Window Manager:    {}", root.wm_name());
    println!("Root Window:       {}", root.root());
    println!("Screen Size:       {}", Rect::from_size(conn.screen_size()));
    println!("Desktops:          {}", root.number_of_desktops());
    println!("Current Desktop:   {} {}", current, root.desktop_name(current).unwrap_or_default());
    println!("Work area:         {}", root.work_area(current));
    println!();
    println!("Active Window");
    println!("{:-<100}", "");

    let win = root.active_window();
    let fields = Properties::WM_NAME | Properties::WM_DESKTOP | Properties::WM_PID | Properties::WM_WINDOW_TYPE;
    let info = WinInfo::fetch(conn, atoms, win, Role::Observer, fields | Properties::WM_STATE | Properties::WM_KDE_FRAME_STRUT).unwrap();
    let frame = info.kde_frame_strut();
    println!("{:<10} {:<3} {:<6} {:<12} {:<8} {:<24} {}", "ID", "DSK", "PID", "BORDERS", "TYPE", "STATE", "NAME");
    println!(
        "{:<10} {:<3} {:<6} {:<12} {:<8} {:<24} {}",
        format!("0x{:08x}", win),
        info.desktop(),
        info.pid(),
        format!("{},{},{},{}", frame.left, frame.right, frame.top, frame.bottom),
        info.window_type().to_string(),
        info.state().to_string(),
        info.name()
    );
}
