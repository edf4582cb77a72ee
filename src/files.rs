//! Remote filesystem and execution layer.
//!
//! Every operation is a small program executed through the
//! [`RawRepl`] engine, whose printed output is decoded back into Rust values.
//! Remote `OSError`s are classified into the specific [`Error`] variants here
//! and nowhere else. Nothing is retried: a failed operation, `put` included,
//! has to be started over by the caller.
//!
//! **Example** - Uploading a file and reading it back:
//! ```no_run
//! use boardcom::{Board, SettingsBuilder};
//!
//! # fn main() -> boardcom::Result<()> {
//! let settings = SettingsBuilder::new().address("/dev/ttyUSB0").finalize();
//! let mut board = Board::open(settings)?;
//! let mut files = board.files();
//! files.mkdir("/lib", true)?;
//! files.put("/lib/hello.py", b"print('hello')\n")?;
//! assert_eq!(files.get("/lib/hello.py")?, b"print('hello')\n");
//! for entry in files.ls("/", true, true)? {
//!     println!("{}", entry.long_format());
//! }
//! # Ok(())
//! # }
//! ```

mod classify;
pub mod literal;
mod programs;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::{Error, RawRepl, Result};
use classify::{classify, Errno};
use literal::Literal;

// =============================================================================
// Public Interface
// =============================================================================

/// The kind of a directory entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A file or directory on the board.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    /// Full path on the board, the listed directory joined with the name.
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes. Always 0 for directories, and for files when not
    /// listed in long format.
    pub size: u64,
}
impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// `path - size bytes`.
    pub fn long_format(&self) -> String {
        format!("{} - {} bytes", self.path, self.size)
    }
}
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Filesystem operations on the board behind a [`RawRepl`] engine.
///
/// Raw mode is entered on demand and kept between operations.
pub struct Files<'a> {
    repl: &'a mut RawRepl,
    chunk_size: usize,
    progress: bool,
}
impl<'a> Files<'a> {
    pub fn new(repl: &'a mut RawRepl, chunk_size: usize) -> Self {
        Files {
            repl,
            chunk_size: chunk_size.max(1),
            progress: false,
        }
    }

    /// Show a progress bar during uploads.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Download the content of the file at `path`.
    pub fn get(&mut self, path: &str) -> Result<Vec<u8>> {
        debug!("get {}", path);
        let output = self
            .exec(&programs::get(path, self.chunk_size))
            .map_err(|e| {
                classify(e, |errno| match errno {
                    Errno::NotFound => Some(Error::RemoteFileNotFound(path.into())),
                    Errno::IsADirectory => Some(Error::IsADirectory(path.into())),
                    _ => None,
                })
            })?;
        Ok(literal::decode_hex(&output)?)
    }

    /// Write `data` to the file at `path`, replacing it.
    ///
    /// The file is opened once, then written one chunk per submission, each
    /// acknowledged by the board before the next one is sent. On failure the
    /// remote file is left truncated.
    pub fn put(&mut self, path: &str, data: &[u8]) -> Result<()> {
        debug!("put {} ({} bytes)", path, data.len());
        self.exec(&programs::open_write(path)).map_err(|e| {
            classify(e, |errno| match errno {
                Errno::NotFound => Some(Error::DirectoryNotFound(parent(path).into())),
                Errno::IsADirectory => Some(Error::IsADirectory(path.into())),
                _ => None,
            })
        })?;

        let pb = self.progress_bar(path, data.len());
        for chunk in data.chunks(self.chunk_size) {
            if let Err(e) = self.exec(&programs::write_chunk(chunk)) {
                pb.abandon();
                if let Error::RemoteExecution { .. } = e {
                    // The link still works, leave a consistent file behind.
                    let _ = self.exec(programs::close());
                }
                return Err(e);
            }
            pb.inc(chunk.len() as u64);
        }
        self.exec(programs::close())?;
        pb.finish_and_clear();
        info!("Uploaded {} bytes to {}", data.len(), path);
        Ok(())
    }

    /// Upload the local directory `local` and everything below it as
    /// `remote`, creating directories as needed.
    pub fn put_dir(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.mkdir(remote, true)?;
        let mut children = fs::read_dir(local)
            .and_then(|entries| entries.collect::<std::io::Result<Vec<_>>>())
            .map_err(|source| Error::LocalIo {
                path: local.into(),
                source,
            })?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            let local_child = child.path();
            let remote_child = join(remote, &child.file_name().to_string_lossy());
            if local_child.is_dir() {
                self.put_dir(&local_child, &remote_child)?;
            } else {
                let data = read_local(&local_child)?;
                self.put(&remote_child, &data)?;
            }
        }
        Ok(())
    }

    /// Create the directory `path`. Its parent must exist.
    pub fn mkdir(&mut self, path: &str, exists_okay: bool) -> Result<()> {
        debug!("mkdir {}", path);
        match self.exec(&programs::mkdir(path)) {
            Ok(_) => Ok(()),
            Err(e) => match classify(e, |errno| match errno {
                Errno::Exists => Some(Error::DirectoryExists(path.into())),
                Errno::NotFound => Some(Error::DirectoryNotFound(parent(path).into())),
                _ => None,
            }) {
                Error::DirectoryExists(_) if exists_okay => {
                    debug!("{} already exists", path);
                    Ok(())
                }
                e => Err(e),
            },
        }
    }

    /// Remove the file at `path`.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        debug!("rm {}", path);
        self.exec(&programs::remove(path))
            .map(|_| ())
            .map_err(|e| {
                classify(e, |errno| match errno {
                    Errno::NotFound => Some(Error::RemoteFileNotFound(path.into())),
                    Errno::IsADirectory | Errno::Access => Some(Error::IsADirectory(path.into())),
                    _ => None,
                })
            })
    }

    /// Remove the directory `path` and everything below it: files first,
    /// then subdirectories depth-first, then the directory itself.
    pub fn rmdir(&mut self, path: &str, missing_okay: bool) -> Result<()> {
        debug!("rmdir {}", path);
        match self.remove_tree(path) {
            Err(Error::DirectoryNotFound(_)) if missing_okay => {
                debug!("{} does not exist", path);
                Ok(())
            }
            result => result,
        }
    }

    /// List the directory `path`.
    ///
    /// With `recursive`, every subdirectory is listed too, one remote call per
    /// directory, each directory followed by its children.
    pub fn ls(&mut self, path: &str, long_format: bool, recursive: bool) -> Result<Vec<Entry>> {
        debug!("ls {}", path);
        let mut entries = Vec::new();
        self.walk(path, long_format, recursive, &mut entries)?;
        Ok(entries)
    }

    /// Run the local script at `path` on the board.
    ///
    /// With `wait_for_output`, returns what the script printed. Otherwise
    /// returns `None` as soon as the board accepted the script, which keeps
    /// running: use this for scripts that never end. The interpreter is then
    /// told to leave raw mode once the script is done.
    pub fn run(&mut self, path: &Path, wait_for_output: bool) -> Result<Option<Vec<u8>>> {
        let script = read_local(path)?;
        debug!("run {} ({} bytes)", path.display(), script.len());
        self.ensure_raw()?;
        if wait_for_output {
            Ok(Some(self.repl.exec_(script)?))
        } else {
            self.repl.exec_raw_no_follow(script)?;
            self.repl.exit_raw_repl()?;
            Ok(None)
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

impl<'a> Files<'a> {
    fn ensure_raw(&mut self) -> Result<()> {
        if !self.repl.mode().is_raw() {
            self.repl.enter_raw_repl()?;
        }
        Ok(())
    }

    fn exec(&mut self, program: &str) -> Result<Vec<u8>> {
        self.ensure_raw()?;
        self.repl.exec_(program)
    }

    fn list(&mut self, path: &str, long_format: bool) -> Result<Vec<Entry>> {
        let output = self.exec(&programs::list(path, long_format)).map_err(|e| {
            classify(e, |errno| match errno {
                Errno::NotFound => Some(Error::DirectoryNotFound(path.into())),
                Errno::NotADirectory => Some(Error::NotADirectory(path.into())),
                _ => None,
            })
        })?;
        let text = String::from_utf8_lossy(&output);
        let listing = literal::decode(&text)?;
        let items = listing.as_items().ok_or_else(|| malformed("a list"))?;
        items
            .iter()
            .map(|item| entry(path, item, long_format))
            .collect()
    }

    fn walk(
        &mut self,
        path: &str,
        long_format: bool,
        recursive: bool,
        entries: &mut Vec<Entry>,
    ) -> Result<()> {
        for entry in self.list(path, long_format)? {
            let subdirectory = if recursive && entry.is_dir() {
                Some(entry.path.clone())
            } else {
                None
            };
            entries.push(entry);
            if let Some(subdirectory) = subdirectory {
                self.walk(&subdirectory, long_format, recursive, entries)?;
            }
        }
        Ok(())
    }

    fn remove_tree(&mut self, path: &str) -> Result<()> {
        let (directories, files): (Vec<Entry>, Vec<Entry>) = self
            .list(path, false)?
            .into_iter()
            .partition(Entry::is_dir);
        for file in &files {
            self.rm(&file.path)?;
        }
        for directory in &directories {
            self.remove_tree(&directory.path)?;
        }
        self.exec(&programs::rmdir(path)).map(|_| ()).map_err(|e| {
            classify(e, |errno| match errno {
                Errno::NotFound => Some(Error::DirectoryNotFound(path.into())),
                Errno::NotADirectory => Some(Error::NotADirectory(path.into())),
                Errno::NotEmpty | Errno::Access => Some(Error::DirectoryNotEmpty(path.into())),
                _ => None,
            })
        })
    }

    fn progress_bar(&self, path: &str, length: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(length as u64);
        pb.set_style(ProgressStyle::default_bar()
            .template("[BC] ⏩ {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .progress_chars("=>-"));
        pb.set_message(path.to_owned());
        pb
    }
}

/// Decode one `(name, kind, size)` tuple of a listing.
fn entry(directory: &str, item: &Literal, long_format: bool) -> Result<Entry> {
    let fields = item.as_items().ok_or_else(|| malformed("a tuple"))?;
    match fields {
        [name, kind, size] => {
            let name = name.as_str().ok_or_else(|| malformed("a name"))?;
            let kind = match kind.as_str() {
                Some("d") => EntryKind::Directory,
                Some("f") => EntryKind::File,
                _ => return Err(malformed("'d' or 'f'")),
            };
            let size = size.as_int().ok_or_else(|| malformed("a size"))?;
            let size = match kind {
                EntryKind::File if long_format => size.max(0) as u64,
                _ => 0,
            };
            Ok(Entry {
                path: join(directory, name),
                kind,
                size,
            })
        }
        _ => Err(malformed("three fields")),
    }
}

fn malformed(expected: &str) -> Error {
    Error::MalformedReply(literal::DecodeError {
        offset: 0,
        message: format!("directory listing: expected {}", expected),
    })
}

fn join(directory: &str, name: &str) -> String {
    if directory.ends_with('/') {
        format!("{}{}", directory, name)
    } else {
        format!("{}/{}", directory, name)
    }
}

/// The parent directory of a remote path, `/` for top level entries.
fn parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => ".",
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::LocalIo {
        path: PathBuf::from(path),
        source,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
