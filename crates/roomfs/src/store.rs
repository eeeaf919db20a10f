//! Buffers as directories on disk.
//!
//! ```text
//! <root>/
//!   lobby/
//!     main     appended, one line per message
//!     title    replaced on every topic change
//!     members  appended, one `<membership> <user>` line per change
//!   status/
//!     main     notices addressed to the local user
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use roomfs_core::{BufferController, MemberChange, Notice};

/// Buffer that receives notices.
pub const STATUS_BUFFER: &str = "status";

/// [`BufferController`] keeping each buffer in a directory under a root.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `root`, creating it and the status buffer.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self { root: root.into() };
        fs::create_dir_all(&store.root)?;
        store.create_buffer(STATUS_BUFFER)?;
        Ok(store)
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of buffer `name`.
    pub fn buffer_dir(&self, name: &str) -> PathBuf {
        self.root.join(file_name(name))
    }

    /// Open `file` in an existing buffer.
    fn open_file(&self, name: &str, file: &str, truncate: bool) -> io::Result<File> {
        let dir = self.buffer_dir(name);
        if !dir.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no buffer {name}")));
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        options.open(dir.join(file))
    }
}

impl BufferController for DirectoryStore {
    type Writer = File;

    fn create_buffer(&self, name: &str) -> io::Result<()> {
        let dir = self.buffer_dir(name);
        fs::create_dir_all(&dir)?;
        for file in ["main", "title"] {
            OpenOptions::new().create(true).append(true).open(dir.join(file))?;
        }
        Ok(())
    }

    fn main_writer(&self, name: &str) -> io::Result<File> {
        self.open_file(name, "main", false)
    }

    fn title_writer(&self, name: &str) -> io::Result<File> {
        self.open_file(name, "title", true)
    }

    fn member_changed(&self, name: &str, change: &MemberChange) -> io::Result<()> {
        let mut members = self.open_file(name, "members", false)?;
        writeln!(members, "{} {}", change.membership.as_str(), change.user)
    }

    fn notify(&self, notice: &Notice) -> io::Result<()> {
        let mut status = self.main_writer(STATUS_BUFFER)?;
        writeln!(status, "{notice}")
    }

    fn reserved_names(&self) -> Vec<String> {
        vec![STATUS_BUFFER.to_string()]
    }
}

/// Map a buffer name to a single path component.
///
/// Room names may contain separators or be `.`/`..`; those become a plain
/// component that cannot escape the root.
fn file_name(name: &str) -> String {
    let cleaned: String =
        name.chars().map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c }).collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}
