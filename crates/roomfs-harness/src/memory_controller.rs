//! In-memory buffer controller.
//!
//! `MemoryController` records every buffer operation so tests can assert on
//! exactly which writes happened, in which order, and that every writer was
//! released. Individual buffers can be marked as failing to exercise the
//! dispatcher's drop path.

use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{Arc, Mutex},
};

use roomfs_core::{BufferController, MemberChange, Notice};

use crate::lock;

/// Stream a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Main content stream.
    Main,
    /// Title stream.
    Title,
}

/// A completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Buffer written.
    pub buffer: String,
    /// Stream written.
    pub stream: Stream,
    /// Text without the trailing newline.
    pub text: String,
}

/// Contents of one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferContents {
    /// Lines appended to the main stream.
    pub main: Vec<String>,
    /// Current title.
    pub title: String,
    /// Roster changes forwarded for this buffer.
    pub members: Vec<MemberChange>,
}

#[derive(Default)]
struct ControllerState {
    buffers: BTreeMap<String, BufferContents>,
    create_calls: Vec<String>,
    writes: Vec<WriteRecord>,
    notices: Vec<Notice>,
    failing: HashSet<String>,
    live_writers: usize,
}

/// [`BufferController`] that keeps everything in memory.
#[derive(Clone, Default)]
pub struct MemoryController {
    state: Arc<Mutex<ControllerState>>,
}

impl MemoryController {
    /// Empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `buffer` fail.
    pub fn fail_buffer(&self, buffer: &str) {
        lock(&self.state).failing.insert(buffer.to_string());
    }

    /// Let operations on `buffer` succeed again.
    pub fn heal_buffer(&self, buffer: &str) {
        lock(&self.state).failing.remove(buffer);
    }

    /// Names of existing buffers.
    pub fn buffers(&self) -> Vec<String> {
        lock(&self.state).buffers.keys().cloned().collect()
    }

    /// Contents of `buffer`.
    pub fn contents(&self, buffer: &str) -> Option<BufferContents> {
        lock(&self.state).buffers.get(buffer).cloned()
    }

    /// Every `create_buffer` call, in order.
    pub fn create_calls(&self) -> Vec<String> {
        lock(&self.state).create_calls.clone()
    }

    /// Every completed write, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state).writes.clone()
    }

    /// Main-stream lines written to `buffer`.
    pub fn main_lines(&self, buffer: &str) -> Vec<String> {
        self.contents(buffer).map(|c| c.main).unwrap_or_default()
    }

    /// Notices surfaced so far.
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.state).notices.clone()
    }

    /// Writers handed out and not yet released.
    pub fn live_writers(&self) -> usize {
        lock(&self.state).live_writers
    }

    fn writer(&self, name: &str, stream: Stream) -> io::Result<MemoryWriter> {
        let mut state = lock(&self.state);
        if state.failing.contains(name) {
            return Err(io::Error::other(format!("buffer {name} is failing")));
        }
        if !state.buffers.contains_key(name) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no buffer {name}")));
        }
        state.live_writers += 1;
        Ok(MemoryWriter {
            state: Arc::clone(&self.state),
            buffer: name.to_string(),
            stream,
            pending: Vec::new(),
        })
    }
}

impl BufferController for MemoryController {
    type Writer = MemoryWriter;

    fn create_buffer(&self, name: &str) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.create_calls.push(name.to_string());
        if state.failing.contains(name) {
            return Err(io::Error::other(format!("buffer {name} is failing")));
        }
        state.buffers.entry(name.to_string()).or_default();
        Ok(())
    }

    fn main_writer(&self, name: &str) -> io::Result<MemoryWriter> {
        self.writer(name, Stream::Main)
    }

    fn title_writer(&self, name: &str) -> io::Result<MemoryWriter> {
        self.writer(name, Stream::Title)
    }

    fn member_changed(&self, name: &str, change: &MemberChange) -> io::Result<()> {
        let mut state = lock(&self.state);
        match state.buffers.get_mut(name) {
            Some(buffer) => {
                buffer.members.push(change.clone());
                Ok(())
            },
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("no buffer {name}"))),
        }
    }

    fn notify(&self, notice: &Notice) -> io::Result<()> {
        lock(&self.state).notices.push(notice.clone());
        Ok(())
    }
}

/// Writer that commits its text when dropped.
pub struct MemoryWriter {
    state: Arc<Mutex<ControllerState>>,
    buffer: String,
    stream: Stream,
    pending: Vec<u8>,
}

impl io::Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.pending);
        let text = text.strip_suffix('\n').unwrap_or(&*text).to_string();

        let mut state = lock(&self.state);
        state.live_writers = state.live_writers.saturating_sub(1);
        if self.pending.is_empty() {
            return;
        }
        if let Some(buffer) = state.buffers.get_mut(&self.buffer) {
            match self.stream {
                Stream::Main => buffer.main.push(text.clone()),
                Stream::Title => buffer.title.clone_from(&text),
            }
        }
        state.writes.push(WriteRecord { buffer: self.buffer.clone(), stream: self.stream, text });
    }
}
