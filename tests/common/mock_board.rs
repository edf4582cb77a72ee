use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use boardcom::{
    files::literal::{self, Literal},
    Transport,
};
use log::trace;

const BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

/// How the simulated firmware answers a raw-paste request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PasteSupport {
    /// Accepted, with this flow control window.
    Supported(u16),
    /// Understood and refused.
    Refused,
    /// Firmware predating raw-paste: the request is taken as input.
    Unknown,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Friendly,
    Raw,
    Paste { credit: usize },
    Running,
}

/// The simulated board, shared between the transport handed to the code under
/// test and the test itself.
pub struct Device {
    state: State,
    input: Vec<u8>,
    output: Vec<u8>,
    pub paste: PasteSupport,
    pub fs: BTreeMap<String, Node>,
    open_file: Option<String>,
    /// Leading output bytes that are not raw-paste flow control.
    grant_boundary: usize,
    /// Replies to programs matched verbatim: (stdout, stderr).
    pub scripted: HashMap<String, (Vec<u8>, Vec<u8>)>,

    /// Swallow everything, answer nothing.
    pub mute: bool,
    /// Drop the connection when the board is reset.
    pub unplug_on_reset: bool,
    /// Reset before acknowledging `reset()`, then stay silent.
    pub reset_before_ack: bool,
    /// Printed by a running program every time the host reads.
    pub chatter: Vec<u8>,
    /// The running program catches `KeyboardInterrupt`.
    pub ignore_interrupt: bool,
    /// Printed late by each program, after its output streams and before the
    /// prompt.
    pub trailing_garbage: Vec<u8>,
    unplugged: bool,
    pub closed: bool,

    /// Every program executed, in order.
    pub programs: Vec<String>,
    pub raw_entries: usize,
    pub soft_reboots: usize,
    pub chunk_writes: usize,
    pub paste_requests: usize,
    pub paste_violations: usize,
    pub exits: usize,
}
impl Device {
    fn new() -> Self {
        let mut fs = BTreeMap::new();
        fs.insert("/".to_owned(), Node::Dir);
        Device {
            state: State::Friendly,
            input: Vec::new(),
            output: b"MicroPython v1.19 on 2022-06-18; ESP32 module with ESP32\r\n>>> ".to_vec(),
            paste: PasteSupport::Unknown,
            fs,
            open_file: None,
            grant_boundary: 0,
            scripted: HashMap::new(),
            mute: false,
            unplug_on_reset: false,
            reset_before_ack: false,
            chatter: Vec::new(),
            ignore_interrupt: false,
            trailing_garbage: Vec::new(),
            unplugged: false,
            closed: false,
            programs: Vec::new(),
            raw_entries: 0,
            soft_reboots: 0,
            chunk_writes: 0,
            paste_requests: 0,
            paste_violations: 0,
            exits: 0,
        }
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        match self.fs.get(path) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    pub fn add_file(&mut self, path: &str, data: &[u8]) {
        self.fs.insert(path.to_owned(), Node::File(data.to_vec()));
    }

    pub fn add_dir(&mut self, path: &str) {
        self.fs.insert(path.to_owned(), Node::Dir);
    }

    /// Push bytes to the host as if the board printed them.
    pub fn inject(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    pub fn script(&mut self, program: &str, stdout: &[u8], stderr: &[u8]) {
        self.scripted
            .insert(program.to_owned(), (stdout.to_vec(), stderr.to_vec()));
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// A running program prints its chatter again.
    fn tick(&mut self) {
        if self.state == State::Running && !self.mute && self.output.is_empty() {
            let chatter = self.chatter.clone();
            self.output.extend_from_slice(&chatter);
        }
    }

    fn feed(&mut self, byte: u8) {
        if self.mute {
            return;
        }
        match self.state {
            State::Friendly => match byte {
                0x01 => self.enter_raw(),
                0x03 => self.output.extend_from_slice(b"\r\n>>> "),
                // Echo, the friendly prompt is noisy.
                _ => self.output.push(byte),
            },
            State::Running => match byte {
                0x03 if !self.ignore_interrupt => {
                    self.output.extend_from_slice(
                        b"\x04Traceback (most recent call last):\r\nKeyboardInterrupt: \r\n\x04>",
                    );
                    self.state = State::Raw;
                    self.input.clear();
                }
                // Queued, raw mode is left once the program ends.
                0x02 => self.exits += 1,
                _ => {}
            },
            State::Raw => match byte {
                0x01 => {
                    let paste_request = self.input == b"\x05A";
                    self.input.clear();
                    if paste_request {
                        self.paste_requests += 1;
                        match self.paste {
                            PasteSupport::Supported(window) => {
                                self.output.extend_from_slice(b"R\x01");
                                self.output.extend_from_slice(&window.to_le_bytes());
                                self.state = State::Paste {
                                    credit: usize::from(window),
                                };
                                self.grant_boundary = self.output.len();
                                return;
                            }
                            PasteSupport::Refused => {
                                self.output.extend_from_slice(b"R\x00");
                                return;
                            }
                            PasteSupport::Unknown => {}
                        }
                    }
                    self.enter_raw();
                }
                0x02 => {
                    self.exits += 1;
                    self.input.clear();
                    self.state = State::Friendly;
                    self.output.extend_from_slice(b"\r\n>>> ");
                }
                0x03 => self.input.clear(),
                0x04 if self.input.is_empty() => {
                    self.soft_reboots += 1;
                    self.open_file = None;
                    self.output
                        .extend_from_slice(b"OK\r\nMPY: soft reboot\r\nraw REPL; CTRL-B to exit\r\n>");
                }
                0x04 => {
                    let code = std::mem::take(&mut self.input);
                    if self.reset_before_ack && code == b"reset()" {
                        self.programs.push("reset()".into());
                        self.mute = true;
                        return;
                    }
                    self.output.extend_from_slice(b"OK");
                    self.execute(&code);
                }
                _ => self.input.push(byte),
            },
            State::Paste { credit } => {
                if byte == 0x04 {
                    let code = std::mem::take(&mut self.input);
                    self.state = State::Raw;
                    self.grant_boundary = self.output.len() + 1;
                    self.output.push(0x04);
                    self.execute(&code);
                    return;
                }
                if credit == 0 {
                    self.paste_violations += 1;
                }
                self.input.push(byte);
                if credit == 1 {
                    // More credit is granted once the host has read this.
                    self.output.push(0x01);
                }
                self.state = State::Paste {
                    credit: credit.saturating_sub(1),
                };
            }
        }
    }

    /// Account for `drained` having been read by the host.
    fn delivered(&mut self, drained: &[u8]) {
        let skip = self.grant_boundary.min(drained.len());
        self.grant_boundary -= skip;
        if let (State::Paste { credit }, PasteSupport::Supported(window)) = (self.state, self.paste) {
            let grants = drained[skip..].iter().filter(|b| **b == 0x01).count();
            self.state = State::Paste {
                credit: credit + grants * usize::from(window),
            };
        }
    }

    fn enter_raw(&mut self) {
        self.raw_entries += 1;
        self.state = State::Raw;
        self.input.clear();
        self.output.extend_from_slice(BANNER);
    }

    fn execute(&mut self, code: &[u8]) {
        let program = String::from_utf8_lossy(code).into_owned();
        trace!("board runs:\n{}", program);
        self.programs.push(program.clone());

        if program.contains("while True") && !program.contains("f.read(") {
            self.state = State::Running;
            return;
        }
        if program == "reset()" && self.unplug_on_reset {
            self.unplugged = true;
            return;
        }

        let (stdout, stderr) = self.run(&program);
        self.output.extend_from_slice(&stdout);
        self.output.push(0x04);
        self.output.extend_from_slice(&stderr);
        self.output.push(0x04);
        let garbage = self.trailing_garbage.clone();
        self.output.extend_from_slice(&garbage);
        self.output.push(b'>');
    }

    fn run(&mut self, program: &str) -> (Vec<u8>, Vec<u8>) {
        if let Some(reply) = self.scripted.get(program) {
            return reply.clone();
        }
        let result = if program.contains("binascii.hexlify") {
            self.read_file(string_after(program, "open("))
        } else if program.starts_with("f = open(") {
            self.open_for_write(string_after(program, "open("))
        } else if program.starts_with("f.write(") {
            self.write_chunk(program)
        } else if program == "f.close()" {
            self.open_file = None;
            Ok(Vec::new())
        } else if program.contains("print(_it)") {
            self.list(string_after(program, "_path = "))
        } else if program.contains("os.mkdir(") {
            self.mkdir(string_after(program, "os.mkdir("))
        } else if program.contains("os.remove(") {
            self.remove(string_after(program, "os.remove("))
        } else if program.contains("os.rmdir(") {
            self.rmdir(string_after(program, "os.rmdir("))
        } else if program.starts_with("print(on_next_reset(") {
            if program.contains("'NORMAL'") {
                Ok(b"\r\n".to_vec())
            } else {
                Ok(b"Reset mode only supported on CircuitPython\r\n".to_vec())
            }
        } else {
            Ok(Vec::new())
        };
        match result {
            Ok(stdout) => (stdout, Vec::new()),
            Err(error) => (
                Vec::new(),
                format!(
                    "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n{}\r\n",
                    error
                )
                .into_bytes(),
            ),
        }
    }

    fn read_file(&self, path: String) -> Result<Vec<u8>, String> {
        match self.fs.get(&path) {
            Some(Node::File(data)) => Ok(data
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<String>()
                .into_bytes()),
            Some(Node::Dir) => Err(errno(21, "EISDIR")),
            None => Err(errno(2, "ENOENT")),
        }
    }

    fn open_for_write(&mut self, path: String) -> Result<Vec<u8>, String> {
        match self.fs.get(&parent(&path)) {
            Some(Node::Dir) => {}
            _ => return Err(errno(2, "ENOENT")),
        }
        if let Some(Node::Dir) = self.fs.get(&path) {
            return Err(errno(21, "EISDIR"));
        }
        self.fs.insert(path.clone(), Node::File(Vec::new()));
        self.open_file = Some(path);
        Ok(Vec::new())
    }

    fn write_chunk(&mut self, program: &str) -> Result<Vec<u8>, String> {
        let chunk = match literal_after(program, "f.write(") {
            Some(Literal::Bytes(chunk)) => chunk,
            _ => return Err("SyntaxError: invalid syntax".into()),
        };
        let path = self
            .open_file
            .clone()
            .ok_or_else(|| String::from("NameError: name 'f' isn't defined"))?;
        self.chunk_writes += 1;
        if let Some(Node::File(data)) = self.fs.get_mut(&path) {
            data.extend_from_slice(&chunk);
        }
        Ok(Vec::new())
    }

    fn list(&self, path: String) -> Result<Vec<u8>, String> {
        match self.fs.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(errno(20, "ENOTDIR")),
            None => return Err(errno(2, "ENOENT")),
        }
        let entries: Vec<String> = self
            .children(&path)
            .into_iter()
            .map(|(child, node)| {
                let name = literal::encode_str(child.rsplit('/').next().unwrap_or_default());
                match node {
                    Node::Dir => format!("({}, 'd', 0)", name),
                    Node::File(data) => format!("({}, 'f', {})", name, data.len()),
                }
            })
            .collect();
        Ok(format!("[{}]\r\n", entries.join(", ")).into_bytes())
    }

    fn mkdir(&mut self, path: String) -> Result<Vec<u8>, String> {
        if self.fs.contains_key(&path) {
            return Err(errno(17, "EEXIST"));
        }
        match self.fs.get(&parent(&path)) {
            Some(Node::Dir) => {
                self.fs.insert(path, Node::Dir);
                Ok(Vec::new())
            }
            _ => Err(errno(2, "ENOENT")),
        }
    }

    fn remove(&mut self, path: String) -> Result<Vec<u8>, String> {
        match self.fs.get(&path) {
            Some(Node::File(_)) => {
                self.fs.remove(&path);
                Ok(Vec::new())
            }
            Some(Node::Dir) => Err(errno(21, "EISDIR")),
            None => Err(errno(2, "ENOENT")),
        }
    }

    fn rmdir(&mut self, path: String) -> Result<Vec<u8>, String> {
        match self.fs.get(&path) {
            Some(Node::Dir) if !self.children(&path).is_empty() => Err(errno(13, "EACCES")),
            Some(Node::Dir) => {
                self.fs.remove(&path);
                Ok(Vec::new())
            }
            Some(Node::File(_)) => Err(errno(20, "ENOTDIR")),
            None => Err(errno(2, "ENOENT")),
        }
    }

    fn children(&self, path: &str) -> Vec<(String, Node)> {
        self.fs
            .iter()
            .filter(|(child, _)| child.as_str() != "/" && parent(child) == path)
            .map(|(child, node)| (child.clone(), node.clone()))
            .collect()
    }
}

fn errno(number: i32, name: &str) -> String {
    format!("OSError: [Errno {}] {}", number, name)
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".into(),
        Some(index) => path[..index].into(),
        None => "/".into(),
    }
}

/// Decode the string or bytes literal following `prefix` in `program`.
fn literal_after(program: &str, prefix: &str) -> Option<Literal> {
    let start = program.find(prefix)? + prefix.len();
    let rest = &program[start..];
    let quote_at = rest.find(|c: char| c == '\'' || c == '"')?;
    let quote = rest[quote_at..].chars().next()?;
    let mut escaped = false;
    for (index, c) in rest[quote_at + 1..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            _ if c == quote => {
                let end = quote_at + 1 + index + 1;
                return literal::decode(&rest[..end]).ok();
            }
            _ => {}
        }
    }
    None
}

fn string_after(program: &str, prefix: &str) -> String {
    match literal_after(program, prefix) {
        Some(Literal::Str(path)) => path,
        _ => String::new(),
    }
}

/// The transport end of a simulated [`Device`].
pub struct MockBoard {
    name: String,
    device: Arc<Mutex<Device>>,
}
impl MockBoard {
    /// A board at its friendly prompt, and a handle on it for the test.
    pub fn new() -> (MockBoard, Arc<Mutex<Device>>) {
        let device = Arc::new(Mutex::new(Device::new()));
        (
            MockBoard {
                name: "mock".into(),
                device: device.clone(),
            },
            device,
        )
    }

    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap()
    }
}
impl Transport for MockBoard {
    fn endpoint(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut device = self.device();
        if device.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if device.unplugged {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        for &byte in data {
            device.feed(byte);
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> io::Result<usize> {
        {
            let mut device = self.device();
            if device.closed {
                return Err(io::ErrorKind::NotConnected.into());
            }
            if device.unplugged {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            device.tick();
            if !device.output.is_empty() {
                let count = buffer.len().min(device.output.len());
                let drained: Vec<u8> = device.output.drain(..count).collect();
                buffer[..count].copy_from_slice(&drained);
                device.delivered(&drained);
                return Ok(count);
            }
        }
        thread::sleep(timeout);
        Ok(0)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let mut device = self.device();
        device.output.clear();
        device.grant_boundary = 0;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.device().closed = true;
        Ok(())
    }
}
