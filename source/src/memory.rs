//! In-memory [`EventStore`] holding each file as a shared slice of events.

use std::{cell::Cell, collections::BTreeMap, rc::Rc};

use bx_overlay_core::{Event, EventKey};

use crate::{EventFile, EventStore, SourceError};

/// Store whose files live in memory. Every read hands out a fresh copy, so a
/// file can be reopened and replayed any number of times.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    files: BTreeMap<String, Rc<[Event]>>,
    sequential_only: bool,
    opened: Rc<Cell<usize>>,
    closed: Rc<Cell<usize>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the file at `path`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, events: Vec<Event>) -> Self {
        self.insert_file(path, events);
        self
    }

    /// Adds or replaces the file at `path`.
    pub fn insert_file(&mut self, path: impl Into<String>, events: Vec<Event>) {
        let _ = self.files.insert(path.into(), events.into());
    }

    /// Makes every file opened afterwards reject direct access.
    #[must_use]
    pub fn sequential_only(mut self) -> Self {
        self.sequential_only = true;
        self
    }

    /// Number of files opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    /// Number of files closed so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.get()
    }

    /// Number of handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.opened.get().saturating_sub(self.closed.get())
    }
}

impl EventStore for MemoryStore {
    type File = MemoryFile;

    fn open(&self, path: &str) -> Result<MemoryFile, SourceError> {
        let events = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::FileNotFound {
                path: path.to_owned(),
            })?;
        self.opened.set(self.opened.get() + 1);
        Ok(MemoryFile {
            events,
            cursor: 0,
            direct_access: !self.sequential_only,
            closed: Rc::clone(&self.closed),
        })
    }
}

/// Open handle into a [`MemoryStore`] file.
#[derive(Debug)]
pub struct MemoryFile {
    events: Rc<[Event]>,
    cursor: usize,
    direct_access: bool,
    closed: Rc<Cell<usize>>,
}

impl EventFile for MemoryFile {
    fn read_next(&mut self) -> Result<Option<Event>, SourceError> {
        let event = self.events.get(self.cursor).cloned();
        if event.is_some() {
            self.cursor += 1;
        }
        Ok(event)
    }

    fn event_count(&self) -> Option<usize> {
        self.direct_access.then_some(self.events.len())
    }

    fn key_at(&self, index: usize) -> Option<EventKey> {
        if !self.direct_access {
            return None;
        }
        self.events.get(index).map(Event::key)
    }

    fn read_by_key(&mut self, key: EventKey) -> Result<Option<Event>, SourceError> {
        if !self.direct_access {
            return Ok(None);
        }
        Ok(self.events.iter().find(|event| event.key() == key).cloned())
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}
