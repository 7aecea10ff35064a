//! `netwmctl` talks to any window manager implementing the [Extended Window Manager Hints (EWMH) specification](https://specifications.freedesktop.org/wm-spec/latest/)
//! through `libnetwm`. It queries the desktop state the manager publishes and asks the manager to
//! change it, in the observer role a pager or taskbar would use.
//!
//! ## Command line examples
//!
//! ### Show the desktop state
//! ```bash
//! netwmctl info
//! ```
//!
//! ### Send a window to all desktops
//! ```bash
//! netwmctl window desktop 0x1e00004 all
//! ```
//!
//! ### Maximize a window
//! ```bash
//! netwmctl window state 0x1e00004 add max
//! ```
//!
//! ### Follow changes as they happen
//! ```bash
//! NETWMCTL_LOG=libnetwm=trace netwmctl watch
//! ```
use std::rc::Rc;

use clap::{crate_description, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use gory::*;
use libnetwm::prelude::*;
use tracing::{debug, metadata::LevelFilter};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use witcher::prelude::*;

/// Environment variable holding the log filter
const LOG_ENV: &str = "NETWMCTL_LOG";

fn cli() -> Command {
    let window_id = || Arg::new("ID").required(true).help("Window id, decimal or 0x prefixed hex");
    Command::new("netwmctl")
        .about(crate_description!())
        .version(crate_version!())
        .long_version(concat!(env!("CARGO_PKG_VERSION"), " (", env!("NETWMCTL_BUILD_DATE"), ")"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("display").long("display").short('d').global(true).help("X display to connect to instead of $DISPLAY"))
        .arg(Arg::new("verbose").long("verbose").short('v').global(true).action(ArgAction::Count).help("Log debug output, twice for trace"))
        .arg(Arg::new("quiet").long("quiet").short('q').global(true).action(ArgAction::SetTrue).help("Only log warnings"))
        .subcommand(Command::new("info").visible_alias("i").about("Show the window manager and desktop state"))
        .subcommand(
            Command::new("window")
                .visible_alias("w")
                .about("Control individual windows")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("list").visible_alias("l").about("List out all managed windows"))
                .subcommand(Command::new("close").visible_alias("c").about("Ask the manager to close a window").arg(window_id()))
                .subcommand(Command::new("activate").visible_alias("a").about("Ask the manager to activate a window").arg(window_id()))
                .subcommand(
                    Command::new("desktop")
                        .visible_alias("d")
                        .about("Move a window to a desktop")
                        .arg(window_id())
                        .arg(Arg::new("DESKTOP").required(true).help("One-based desktop number or 'all'")),
                )
                .subcommand(
                    Command::new("state")
                        .visible_alias("s")
                        .about("Add or remove window states")
                        .arg(window_id())
                        .arg(Arg::new("ACTION").required(true).value_parser(["add", "remove"]))
                        .arg(Arg::new("STATE").required(true).num_args(1..).help("e.g. max, shaded, sticky, above, fullscreen")),
                ),
        )
        .subcommand(
            Command::new("desktop")
                .visible_alias("d")
                .about("Manage desktops (also known as workspaces)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("list").visible_alias("l").about("List all desktops"))
                .subcommand(
                    Command::new("switch")
                        .visible_alias("s")
                        .about("Switch to a desktop")
                        .arg(Arg::new("DESKTOP").required(true).value_parser(value_parser!(u32).range(1..))),
                )
                .subcommand(
                    Command::new("rename")
                        .visible_alias("r")
                        .about("Rename a desktop")
                        .arg(Arg::new("DESKTOP").required(true).value_parser(value_parser!(u32).range(1..)))
                        .arg(Arg::new("NAME").required(true)),
                )
                .subcommand(
                    Command::new("count")
                        .about("Ask the manager for a number of desktops")
                        .arg(Arg::new("COUNT").required(true).value_parser(value_parser!(u32).range(1..))),
                ),
        )
        .subcommand(Command::new("watch").about("Print desktop changes as they arrive"))
        .subcommand(Command::new("wait").about("Block until a compliant window manager is running"))
}

fn init_logging(matches: &ArgMatches) {
    let filter = match (matches.get_count("verbose"), matches.get_flag("quiet")) {
        (_, true) => EnvFilter::new("warn"),
        (0, false) => EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).with_env_var(LOG_ENV).from_env_lossy(),
        (1, false) => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_writer(std::io::stderr).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Connection and atoms shared by every command
struct Session {
    conn: Rc<X11Transport>,
    atoms: Rc<Atoms>,
}

impl Session {
    fn connect(display: Option<&str>) -> Result<Self> {
        let conn = Rc::new(X11Transport::connect(display).wrap("failed to connect to the X server")?);
        let atoms = Rc::new(Atoms::intern(&*conn).pass()?);
        Ok(Self { conn, atoms })
    }

    fn hub(&self) -> DesktopHub<X11Transport> {
        DesktopHub::new(self.conn.clone(), self.atoms.clone())
    }

    fn root(&self) -> RootInfo<X11Transport> {
        RootInfo::observer(self.conn.clone(), self.atoms.clone(), Properties::NUMBER_OF_DESKTOPS, Properties2::empty())
    }

    fn window(&self, id: Window, properties: Properties) -> Result<WinInfo<X11Transport>> {
        WinInfo::fetch(self.conn.clone(), self.atoms.clone(), id, Role::Observer, properties | Properties::XA_WM_STATE).pass()
    }
}

fn parse_window(val: &str) -> Result<Window> {
    let parsed = match val.strip_prefix("0x") {
        Some(hex) => Window::from_str_radix(hex, 16),
        None => val.parse::<Window>(),
    };
    parsed.wrap(&format!("invalid window id: {}", val))
}

fn parse_desktop(val: &str) -> Result<i32> {
    if val.eq_ignore_ascii_case("all") {
        return Ok(ON_ALL_DESKTOPS);
    }
    match val.parse::<i32>() {
        Ok(x) if x >= 1 => Ok(x),
        _ => Err(NetwmError::InvalidDesktop(val.to_string())).pass(),
    }
}

fn window_id(matches: &ArgMatches) -> Result<Window> {
    parse_window(matches.get_one::<String>("ID").map(String::as_str).unwrap_or_default())
}

fn u32_arg(matches: &ArgMatches, name: &str) -> u32 {
    matches.get_one::<u32>(name).copied().unwrap_or_default()
}

fn info(s: &Session) -> Result<()> {
    let hub = s.hub();
    let module = hub.subscribe(InfoLevel::Basic).pass()?;
    let current = module.current_desktop();
    println!("{}", "Window Manager Information".cyan());
    println!("{:-<72}", "");
    println!("Window Manager:    {}", module.wm_name());
    println!("Root Window:       0x{:08x}", s.conn.root());
    println!("Screen Size:       {}", Rect::from_size(s.conn.screen_size()));
    println!("Desktops:          {}", module.number_of_desktops());
    println!("Current Desktop:   {} ({})", current, module.desktop_name(current));
    println!("Active Window:     0x{:08x}", module.active_window());
    println!("Work Area:         {}", module.work_area(current));
    println!("Showing Desktop:   {}", module.showing_desktop());
    Ok(())
}

fn window_list(s: &Session) -> Result<()> {
    let hub = s.hub();
    let module = hub.subscribe(InfoLevel::Windows).pass()?;
    println!("{:<10} {:<3} {:<7} {:<8} {:<24} {}", "ID".cyan(), "DSK".cyan(), "PID".cyan(), "TYPE".cyan(), "STATE".cyan(), "NAME".cyan());
    for id in module.stacking_order() {
        let row = module.with_window(id, |win| {
            let desktop = if win.on_all_desktops() { "*".to_string() } else { win.desktop().to_string() };
            let name = if win.visible_name().is_empty() { win.name() } else { win.visible_name() };
            format!("0x{:08x} {:<3} {:<7} {:<8} {:<24} {}", id, desktop, win.pid(), win.window_type(), win.state(), name)
        });
        if let Some(row) = row {
            println!("{}", row);
        }
    }
    Ok(())
}

fn window_command(s: &Session, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("list", _)) => window_list(s),
        Some(("close", sub)) => s.root().close_window_request(window_id(sub)?).pass(),
        Some(("activate", sub)) => s.root().set_active_window(window_id(sub)?).pass(),
        Some(("desktop", sub)) => {
            let desktop = parse_desktop(sub.get_one::<String>("DESKTOP").map(String::as_str).unwrap_or_default())?;
            s.window(window_id(sub)?, Properties::WM_DESKTOP)?.set_desktop(desktop).pass()
        },
        Some(("state", sub)) => {
            let mut mask = WinState::empty();
            for name in sub.get_many::<String>("STATE").into_iter().flatten() {
                mask |= WinState::try_from(name.as_str()).pass()?;
            }
            let state = match sub.get_one::<String>("ACTION").map(String::as_str) {
                Some("add") => mask,
                _ => WinState::empty(),
            };
            debug!("window state: state: {}, mask: {}", state, mask);
            s.window(window_id(sub)?, Properties::WM_STATE)?.set_state(state, mask).pass()
        },
        _ => Ok(()),
    }
}

fn desktop_command(s: &Session, matches: &ArgMatches) -> Result<()> {
    let hub = s.hub();
    let module = hub.subscribe(InfoLevel::Basic).pass()?;
    match matches.subcommand() {
        Some(("list", _)) => {
            let current = module.current_desktop();
            for desktop in 1..=module.number_of_desktops() {
                let marker = if desktop == current { "*" } else { " " };
                println!("{} {:>2} {:<20} {}", marker, desktop, module.desktop_name(desktop), module.work_area(desktop));
            }
            Ok(())
        },
        Some(("switch", sub)) => module.set_current_desktop(u32_arg(sub, "DESKTOP")).pass(),
        Some(("rename", sub)) => {
            let name = sub.get_one::<String>("NAME").map(String::as_str).unwrap_or_default();
            module.set_desktop_name(u32_arg(sub, "DESKTOP"), name).pass()
        },
        Some(("count", sub)) => s.root().set_number_of_desktops(u32_arg(sub, "COUNT")).pass(),
        _ => Ok(()),
    }
}

fn watch(s: &Session) -> Result<()> {
    let hub = s.hub();
    let module = hub.subscribe(InfoLevel::Windows).pass()?;
    println!("{} {} desktops, {} windows", "watching".cyan(), module.number_of_desktops(), module.windows().len());
    loop {
        let event = s.conn.wait_event().pass()?;
        hub.process_event(&event).pass()?;
        hub.pump().pass()?;
        for event in module.take_events() {
            print_event(&module, event);
        }
    }
}

fn print_event(module: &DesktopModule<X11Transport>, event: DesktopEvent) {
    match event {
        DesktopEvent::WindowAdded(w) => println!("{} 0x{:08x}", "added".green(), w),
        DesktopEvent::WindowRemoved(w) => println!("{} 0x{:08x}", "removed".red(), w),
        DesktopEvent::WindowChanged { window, properties } => {
            let name = module.with_window(window, |x| x.name().to_string()).unwrap_or_default();
            println!("{} 0x{:08x} {:?} {}", "changed".yellow(), window, properties, name)
        },
        DesktopEvent::CurrentDesktopChanged(d) => println!("{} {} ({})", "desktop".cyan(), d, module.desktop_name(d)),
        other => println!("{} {:?}", "event".cyan(), other),
    }
}

fn wait(s: &Session) -> Result<()> {
    let check = wait_for_manager(&*s.conn, &s.atoms).pass()?;
    let hub = s.hub();
    let module = hub.subscribe(InfoLevel::Basic).pass()?;
    println!("{} (check window 0x{:08x})", module.wm_name(), check);
    Ok(())
}

fn run() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches);

    let session = Session::connect(matches.get_one::<String>("display").map(String::as_str))?;
    match matches.subcommand() {
        Some(("info", _)) => info(&session),
        Some(("window", sub)) => window_command(&session, sub),
        Some(("desktop", sub)) => desktop_command(&session, sub),
        Some(("watch", _)) => watch(&session),
        Some(("wait", _)) => wait(&session),
        _ => Ok(()),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:?}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("0x1e00004").unwrap(), 0x1e00004);
        assert_eq!(parse_window("42").unwrap(), 42);
        assert!(parse_window("nope").is_err());
    }

    #[test]
    fn test_parse_desktop() {
        assert_eq!(parse_desktop("all").unwrap(), ON_ALL_DESKTOPS);
        assert_eq!(parse_desktop("3").unwrap(), 3);
        assert!(parse_desktop("0").is_err());
    }

    #[test]
    fn test_state_args() {
        let matches = cli().get_matches_from(["netwmctl", "window", "state", "0x10", "add", "max", "shaded"]);
        let (_, window) = matches.subcommand().unwrap();
        let (name, state) = window.subcommand().unwrap();
        assert_eq!(name, "state");
        let names: Vec<&String> = state.get_many::<String>("STATE").unwrap().collect();
        assert_eq!(names, vec!["max", "shaded"]);
    }
}
