//! Hand the board over to an external terminal emulator for interactive REPL
//! sessions.

use std::{
    env, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use log::{debug, info};

use crate::Address;

/// Terminal programs `boardcom` knows how to launch, in order of preference.
pub const SUPPORTED_TERMINALS: &[&str] = &["picocom", "minicom", "miniterm", "screen", "telnet"];

/// Look for `name` in the directories listed in `PATH`.
pub fn find_terminal(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| candidate.is_file())
}

/// Run the terminal program `name` found at `program` on `address`, waiting
/// until the user leaves it.
pub fn invoke_terminal(
    name: &str,
    program: &Path,
    address: &Address,
    baud_rate: u32,
) -> io::Result<ExitStatus> {
    let arguments = terminal_arguments(name, address, baud_rate);
    info!("Launching {} {}", program.display(), arguments.join(" "));
    Command::new(program).args(&arguments).status()
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut found = vec![dir.join(name)];
    if name == "miniterm" {
        found.push(dir.join("miniterm.py"));
    }
    if cfg!(windows) {
        found.push(dir.join(format!("{}.exe", name)));
    }
    debug!("looking for {:?}", found);
    found
}

fn terminal_arguments(name: &str, address: &Address, baud_rate: u32) -> Vec<String> {
    let baud = baud_rate.to_string();
    match address {
        Address::Telnet { host, port } => vec![host.clone(), port.to_string()],
        Address::Serial(path) => match name {
            "picocom" => vec!["-b".into(), baud, path.clone()],
            "minicom" => vec!["-D".into(), path.clone(), "-b".into(), baud],
            _ => vec![path.clone(), baud],
        },
    }
}
