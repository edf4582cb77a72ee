//! Boardcom command line interface.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
    ArgGroup, ArgMatches, SubCommand,
};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use boardcom::{self as bc, Address, Board, Error, ResetMode};

fn main() {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        // A second Ctrl+C doesn't wait for the board.
        if flag.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        eprintln!("🛑 received Ctrl+C! Stopping the board...");
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Boardcom talks to MicroPython and CircuitPython boards through \
            their REPL, over a serial port or a telnet connection. It puts \
            the interpreter in raw mode and runs small programs on the board \
            to transfer files, list and create directories, remove files and \
            directories, run scripts and reset the board.\n\
            \n\
            The board address is either a serial device (`/dev/ttyUSB0`, \
            `COM4`) or a network endpoint (`192.168.4.1`, `wipy.local:23`). \
            When no address is given and a user is at the terminal, the \
            connected serial devices are offered for selection.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .setting(SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("PORT")
                .help("the board address")
                .long_help(
                    "the board address: a serial device path or a network \
                     endpoint (`host` or `host:port`) for telnet.",
                )
                .short("p")
                .long("port")
                .takes_value(true)
                .env("BOARDCOM_PORT")
                .global(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("b")
                .long("baud")
                .takes_value(true)
                .env("BOARDCOM_BAUD")
                .default_value("115200")
                .global(true),
        )
        .arg(
            Arg::with_name("DELAY")
                .help("seconds to wait before entering raw mode")
                .long_help(
                    "seconds to wait before entering raw mode; some boards \
                     reset when the serial port is opened and need time to \
                     boot.",
                )
                .short("d")
                .long("delay")
                .takes_value(true)
                .env("BOARDCOM_DELAY")
                .default_value("0")
                .global(true),
        )
        .arg(
            Arg::with_name("CHUNK_SIZE")
                .help("bytes transferred per round trip")
                .long("chunk-size")
                .takes_value(true)
                .env("BOARDCOM_CHUNK_SIZE")
                .global(true),
        )
        .arg(
            Arg::with_name("TIMEOUT")
                .help("seconds of silence from the board before giving up")
                .long("timeout")
                .takes_value(true)
                .default_value("10")
                .global(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help(
                    "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
                ),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("Retrieve a file from the board")
                .arg(Arg::with_name("REMOTE").required(true).index(1))
                .arg(
                    Arg::with_name("LOCAL")
                        .help("where to save the file; printed on stdout when omitted")
                        .index(2),
                ),
        )
        .subcommand(
            SubCommand::with_name("put")
                .about("Put a file or a directory tree on the board")
                .arg(Arg::with_name("LOCAL").required(true).index(1))
                .arg(
                    Arg::with_name("REMOTE")
                        .help("destination on the board; the local name when omitted")
                        .index(2),
                ),
        )
        .subcommand(
            SubCommand::with_name("ls")
                .about("List the content of a directory on the board")
                .arg(Arg::with_name("DIRECTORY").default_value("/").index(1))
                .arg(
                    Arg::with_name("LONG_FORMAT")
                        .help("show file sizes")
                        .short("l")
                        .long("long_format"),
                )
                .arg(
                    Arg::with_name("RECURSIVE")
                        .help("list subdirectories too")
                        .short("r")
                        .long("recursive"),
                ),
        )
        .subcommand(
            SubCommand::with_name("mkdir")
                .about("Create a directory on the board")
                .arg(Arg::with_name("DIRECTORY").required(true).index(1))
                .arg(
                    Arg::with_name("EXISTS_OKAY")
                        .help("do not fail when the directory already exists")
                        .long("exists-okay"),
                ),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("Remove a file from the board")
                .arg(Arg::with_name("REMOTE").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("rmdir")
                .about("Remove a directory and everything in it from the board")
                .arg(Arg::with_name("DIRECTORY").required(true).index(1))
                .arg(
                    Arg::with_name("MISSING_OKAY")
                        .help("do not fail when the directory doesn't exist")
                        .long("missing-okay"),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run a local script on the board and print its output")
                .arg(Arg::with_name("FILE").required(true).index(1))
                .arg(
                    Arg::with_name("NO_OUTPUT")
                        .help("do not wait for the script to finish")
                        .short("n")
                        .long("no-output"),
                ),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("Reset the board")
                .arg(
                    Arg::with_name("REPL")
                        .help("soft reboot, ending at the REPL [default]")
                        .long("repl"),
                )
                .arg(
                    Arg::with_name("HARD")
                        .help("hard reset, running the boot scripts")
                        .long("hard"),
                )
                .arg(
                    Arg::with_name("SAFE")
                        .help("safe mode reset, no user code is run (CircuitPython)")
                        .long("safe"),
                )
                .arg(
                    Arg::with_name("BOOTLOADER")
                        .help("reset into the bootloader (CircuitPython)")
                        .long("bootloader"),
                )
                .group(ArgGroup::with_name("MODE").args(&["REPL", "HARD", "SAFE", "BOOTLOADER"])),
        )
        .subcommand(
            SubCommand::with_name("repl")
                .about("Open an interactive REPL in a terminal program")
                .arg(
                    Arg::with_name("TERMINAL")
                        .help("the terminal program to launch")
                        .short("t")
                        .long("terminal")
                        .takes_value(true)
                        .env("BOARDCOM_TERMINAL")
                        .possible_values(bc::SUPPORTED_TERMINALS),
                ),
        )
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'boardcom -v -v -v' or 'boardcom -vvv' vs 'boardcom -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("{}: could not set up logging: {}", style("warning").yellow(), e);
    }

    trace!("{:#?}", matches);

    let settings = settings(&matches);

    let exit_code = match run(&matches, settings, interrupted) {
        Ok(code) => code,
        Err(Error::Interrupted) => 130,
        Err(e) => {
            eprintln!("{}: {}", style("error").red(), e);
            1
        }
    };
    debug!("exit code: {}", exit_code);
    process::exit(exit_code);
}

/// Build the session settings from the global options, exiting on invalid
/// values.
fn settings(matches: &ArgMatches) -> bc::Settings {
    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        invalid_value(matches, "BAUD_RATE", "baud", "a numeric value")
    });
    let delay = value_t!(matches.value_of("DELAY"), f64)
        .ok()
        .filter(|delay| *delay >= 0.0)
        .unwrap_or_else(|| invalid_value(matches, "DELAY", "delay", "a positive number"));
    let timeout = value_t!(matches.value_of("TIMEOUT"), f64)
        .ok()
        .filter(|timeout| *timeout > 0.0)
        .unwrap_or_else(|| invalid_value(matches, "TIMEOUT", "timeout", "a positive number"));

    let mut builder = bc::SettingsBuilder::default()
        .baud_rate(baud_rate)
        .raw_delay(Duration::from_secs_f64(delay))
        .read_timeout(Duration::from_secs_f64(timeout));

    if matches.is_present("CHUNK_SIZE") {
        let chunk_size = value_t!(matches.value_of("CHUNK_SIZE"), usize)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or_else(|| {
                invalid_value(matches, "CHUNK_SIZE", "chunk-size", "a positive integer")
            });
        builder = builder.chunk_size(chunk_size);
    }

    let port = matches.value_of("PORT").map(String::from).or_else(|| {
        if console::user_attended() {
            bc::select_port()
        } else {
            None
        }
    });
    if let Some(port) = port {
        builder = builder.address(port);
    }

    builder.finalize()
}

fn invalid_value(matches: &ArgMatches, name: &str, option: &str, expected: &str) -> ! {
    eprintln!(
        "{}: `{}` needs to be {}",
        style("error").red(),
        style(option).cyan(),
        expected
    );
    eprintln!(
        "   {} `{}` is not a valid value",
        style("-->").cyan(),
        style(matches.value_of(name).unwrap_or_default()).on_red()
    );
    process::exit(1);
}

/// Execute the selected subcommand, returning the process exit code.
fn run(
    matches: &ArgMatches,
    settings: bc::Settings,
    interrupted: Arc<AtomicBool>,
) -> bc::Result<i32> {
    if let ("repl", Some(args)) = matches.subcommand() {
        return repl(args, &settings);
    }

    let mut board = Board::open(settings)?;
    board.cancel_on(interrupted);
    match matches.subcommand() {
        ("get", Some(args)) => {
            let remote = args.value_of("REMOTE").unwrap_or_default();
            let data = board.files().get(remote)?;
            match args.value_of("LOCAL") {
                Some(local) => fs::write(local, &data).map_err(|source| Error::LocalIo {
                    path: local.into(),
                    source,
                })?,
                None => io::stdout()
                    .write_all(&data)
                    .map_err(|source| Error::LocalIo {
                        path: "<stdout>".into(),
                        source,
                    })?,
            }
        }
        ("put", Some(args)) => {
            let local = Path::new(args.value_of("LOCAL").unwrap_or_default());
            let remote = match args.value_of("REMOTE") {
                Some(remote) => remote.to_owned(),
                None => local
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::LocalIo {
                        path: local.into(),
                        source: io::Error::new(io::ErrorKind::InvalidInput, "no file name"),
                    })?,
            };
            let mut files = board.files().with_progress(console::Term::stderr().is_term());
            if local.is_dir() {
                files.put_dir(local, &remote)?;
            } else {
                let data = fs::read(local).map_err(|source| Error::LocalIo {
                    path: local.into(),
                    source,
                })?;
                files.put(&remote, &data)?;
            }
        }
        ("ls", Some(args)) => {
            let long_format = args.is_present("LONG_FORMAT");
            let entries = board.files().ls(
                args.value_of("DIRECTORY").unwrap_or("/"),
                long_format,
                args.is_present("RECURSIVE"),
            )?;
            for entry in entries {
                if long_format {
                    println!("{}", entry.long_format());
                } else {
                    println!("{}", entry);
                }
            }
        }
        ("mkdir", Some(args)) => board.files().mkdir(
            args.value_of("DIRECTORY").unwrap_or_default(),
            args.is_present("EXISTS_OKAY"),
        )?,
        ("rm", Some(args)) => board
            .files()
            .rm(args.value_of("REMOTE").unwrap_or_default())?,
        ("rmdir", Some(args)) => board.files().rmdir(
            args.value_of("DIRECTORY").unwrap_or_default(),
            args.is_present("MISSING_OKAY"),
        )?,
        ("run", Some(args)) => {
            let script = PathBuf::from(args.value_of("FILE").unwrap_or_default());
            let output = board
                .files()
                .run(&script, !args.is_present("NO_OUTPUT"))?;
            if let Some(output) = output {
                io::stdout()
                    .write_all(&output)
                    .map_err(|source| Error::LocalIo {
                        path: "<stdout>".into(),
                        source,
                    })?;
            }
        }
        ("reset", Some(args)) => {
            let mode = if args.is_present("HARD") {
                ResetMode::Normal
            } else if args.is_present("SAFE") {
                ResetMode::SafeMode
            } else if args.is_present("BOOTLOADER") {
                ResetMode::Bootloader
            } else {
                ResetMode::Soft
            };
            board.reset(mode)?;
        }
        (name, _) => debug!("nothing to do for `{}`", name),
    }
    board.close();
    Ok(0)
}

/// Hand the board over to a terminal program. The board is not opened here,
/// the terminal needs the port for itself.
fn repl(args: &ArgMatches, settings: &bc::Settings) -> bc::Result<i32> {
    let address = Address::parse(settings.address.as_deref().unwrap_or_default())?;

    let candidates: Vec<&str> = match args.value_of("TERMINAL") {
        Some(terminal) => {
            if address.is_network() && terminal != "telnet" {
                eprintln!(
                    "{}: `{}` is a network address, it can only be opened with `{}`, not `{}`",
                    style("error").red().bold(),
                    address,
                    style("telnet").cyan(),
                    terminal
                );
                return Ok(1);
            }
            vec![terminal]
        }
        None if address.is_network() => vec!["telnet"],
        None => bc::SUPPORTED_TERMINALS.to_vec(),
    };

    for name in candidates {
        if let Some(program) = bc::find_terminal(name) {
            let status = bc::invoke_terminal(name, &program, &address, settings.baud_rate)
                .map_err(|source| Error::LocalIo {
                    path: program.clone(),
                    source,
                })?;
            return Ok(status.code().unwrap_or(1));
        }
        debug!("`{}` not found", name);
    }

    eprintln!(
        "{}",
        style("Couldn't find a suitable terminal program to launch!")
            .red()
            .bold()
    );
    eprintln!("\nboardcom can invoke one of the following terminal programs:");
    for name in bc::SUPPORTED_TERMINALS {
        eprintln!("  - {}", name);
    }
    Ok(1)
}
