use std::collections::BTreeSet;

use bx_overlay_core::{Event, EventKey};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{EventFile, EventStore, SourceError, SupplyMode};

/// Configuration of a [`BackgroundEventSource`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceConfig {
    /// Background file paths.
    pub files: Vec<String>,
    /// Strategy used to pick events.
    pub mode: SupplyMode,
    /// Allow files (or, with direct access, events) to be supplied again once
    /// every one was consumed.
    pub allow_reuse: bool,
    /// File opened first instead of a random one.
    pub start_file: Option<usize>,
    /// Number of events skipped in the first opened file.
    pub start_event: Option<usize>,
}

#[derive(Debug)]
struct OpenFile<F> {
    index: usize,
    handle: F,
}

#[derive(Debug)]
struct Catalogue<F> {
    handles: Vec<F>,
    offsets: Vec<usize>,
    total: usize,
    remaining: Vec<usize>,
}

impl<F: EventFile> Catalogue<F> {
    fn build(
        store: &impl EventStore<File = F>,
        files: &[String],
        allow_reuse: bool,
    ) -> Result<Self, SourceError> {
        let mut handles = Vec::with_capacity(files.len());
        let mut offsets = Vec::with_capacity(files.len());
        let mut total = 0;
        for path in files {
            let handle = store.open(path)?;
            let count = handle
                .event_count()
                .ok_or_else(|| SourceError::DirectAccessUnsupported { path: path.clone() })?;
            info!(path = %path, events = count, "indexed background file");
            offsets.push(total);
            total += count;
            handles.push(handle);
        }
        let remaining = if allow_reuse { Vec::new() } else { (0..total).collect() };
        Ok(Self {
            handles,
            offsets,
            total,
            remaining,
        })
    }

    fn locate(&self, global: usize) -> Option<(usize, usize)> {
        let file = self.offsets.partition_point(|&offset| offset <= global);
        let file = file.checked_sub(1)?;
        Some((file, global - self.offsets[file]))
    }
}

/// Supplies background events from a list of files under a reuse policy.
///
/// All random choices are drawn from the generator passed in by the caller,
/// so one physics event seeded identically always receives the same sequence.
pub struct BackgroundEventSource<S: EventStore> {
    store: S,
    config: SourceConfig,
    current: Option<OpenFile<S::File>>,
    used: BTreeSet<usize>,
    catalogue: Option<Catalogue<S::File>>,
    pending_start_file: Option<usize>,
    pending_start_event: Option<usize>,
    supplied: u64,
}

impl<S: EventStore> BackgroundEventSource<S> {
    /// Creates a source over `store`. Nothing is opened until first needed.
    pub fn new(store: S, config: SourceConfig) -> Result<Self, SourceError> {
        if let Some(index) = config.start_file {
            if index >= config.files.len() {
                return Err(SourceError::StartFileOutOfRange {
                    index,
                    files: config.files.len(),
                });
            }
        }
        Ok(Self {
            store,
            pending_start_file: config.start_file,
            pending_start_event: config.start_event,
            config,
            current: None,
            used: BTreeSet::new(),
            catalogue: None,
            supplied: 0,
        })
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of configured files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.config.files.len()
    }

    /// Number of events supplied since creation.
    #[must_use]
    pub const fn supplied(&self) -> u64 {
        self.supplied
    }

    /// Index of the file currently streamed, if any.
    #[must_use]
    pub fn current_file(&self) -> Option<usize> {
        self.current.as_ref().map(|open| open.index)
    }

    /// Prepares the source for a new physics event.
    ///
    /// In sequential mode the streamed file is opened if none is open yet and
    /// the set of files used by this event is reset to it.
    pub fn begin_event<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), SourceError> {
        if self.config.mode != SupplyMode::Sequential || self.config.files.is_empty() {
            return Ok(());
        }
        if self.current.is_none() {
            let index = match self.pending_start_file.take() {
                Some(index) => index,
                None => rng.gen_range(0..self.config.files.len()),
            };
            self.open_streamed(index)?;
        }
        self.used.clear();
        if let Some(open) = &self.current {
            let _ = self.used.insert(open.index);
        }
        Ok(())
    }

    /// Supplies the next background event.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SourceError> {
        if self.config.files.is_empty() {
            return Err(SourceError::NoFiles);
        }
        let event = match self.config.mode {
            SupplyMode::Sequential => self.next_sequential(rng)?,
            SupplyMode::Wraparound => self.next_wraparound()?,
            SupplyMode::RandomAccess => self.next_random(rng)?,
        };
        self.supplied += 1;
        Ok(event)
    }

    /// Reads the event identified by `key` from the first file holding it.
    pub fn read_by_key(&mut self, key: EventKey) -> Result<Option<Event>, SourceError> {
        let catalogue = ensure_catalogue(&mut self.catalogue, &self.store, &self.config)?;
        for handle in &mut catalogue.handles {
            if let Some(event) = handle.read_by_key(key)? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Closes every open file.
    pub fn close(&mut self) {
        if let Some(open) = self.current.take() {
            info!(path = %self.config.files[open.index], "closing background file");
        }
        if let Some(catalogue) = self.catalogue.take() {
            debug!(files = catalogue.handles.len(), "closing direct-access files");
        }
    }

    fn open_streamed(&mut self, index: usize) -> Result<(), SourceError> {
        let path = &self.config.files[index];
        let mut handle = self.store.open(path)?;
        info!(path = %path, index, "opened background file");
        if let Some(skip) = self.pending_start_event.take() {
            info!(path = %path, skip, "skipping to start event");
            for _ in 0..skip {
                if handle.read_next()?.is_none() {
                    break;
                }
            }
        }
        self.current = Some(OpenFile { index, handle });
        Ok(())
    }

    fn next_sequential<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SourceError> {
        let files = self.config.files.len();
        let mut empty_opens = 0;
        loop {
            if self.current.is_none() {
                let index = match self.pending_start_file.take() {
                    Some(index) => index,
                    None => rng.gen_range(0..files),
                };
                self.open_streamed(index)?;
                let _ = self.used.insert(index);
            }
            if let Some(open) = self.current.as_mut() {
                if let Some(event) = open.handle.read_next()? {
                    return Ok(event);
                }
            }

            empty_opens += 1;
            if empty_opens > 2 * files {
                return Err(SourceError::NoEvents { files });
            }

            let exhausted = self.current.take().map(|open| open.index);
            if let Some(index) = exhausted {
                info!(path = %self.config.files[index], "background file exhausted");
            }
            if self.used.len() >= files {
                if !self.config.allow_reuse {
                    warn!(files, "all background files consumed");
                    return Err(SourceError::Exhausted { files });
                }
                self.used.clear();
                if files > 1 {
                    if let Some(index) = exhausted {
                        let _ = self.used.insert(index);
                    }
                }
            }
            let candidates: Vec<usize> = (0..files)
                .filter(|index| !self.used.contains(index))
                .collect();
            let index = candidates[rng.gen_range(0..candidates.len())];
            self.open_streamed(index)?;
            let _ = self.used.insert(index);
        }
    }

    fn next_wraparound(&mut self) -> Result<Event, SourceError> {
        let files = self.config.files.len();
        let mut advanced = 0;
        loop {
            if self.current.is_none() {
                let index = self.pending_start_file.take().unwrap_or(0);
                self.open_streamed(index)?;
            }
            if let Some(open) = self.current.as_mut() {
                if let Some(event) = open.handle.read_next()? {
                    return Ok(event);
                }
            }

            advanced += 1;
            if advanced > files {
                return Err(SourceError::NoEvents { files });
            }
            let next = match self.current.take() {
                Some(open) if open.index + 1 < files => open.index + 1,
                _ => {
                    warn!("overlay stream has been reset to first element");
                    0
                }
            };
            self.open_streamed(next)?;
        }
    }

    fn next_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Event, SourceError> {
        let allow_reuse = self.config.allow_reuse;
        let files = self.config.files.len();
        let catalogue = ensure_catalogue(&mut self.catalogue, &self.store, &self.config)?;
        if catalogue.total == 0 {
            return Err(SourceError::NoEvents { files });
        }
        let global = if allow_reuse {
            rng.gen_range(0..catalogue.total)
        } else {
            if catalogue.remaining.is_empty() {
                warn!(files, "all background events consumed");
                return Err(SourceError::Exhausted { files });
            }
            let slot = rng.gen_range(0..catalogue.remaining.len());
            catalogue.remaining.swap_remove(slot)
        };
        let Some((file, local)) = catalogue.locate(global) else {
            return Err(SourceError::NoEvents { files });
        };
        let path = &self.config.files[file];
        let handle = &mut catalogue.handles[file];
        let key = handle
            .key_at(local)
            .ok_or_else(|| SourceError::DirectAccessUnsupported { path: path.clone() })?;
        handle
            .read_by_key(key)?
            .ok_or_else(|| SourceError::Read {
                path: path.clone(),
                message: format!("indexed event {}/{} missing", key.run, key.event),
            })
    }
}

fn ensure_catalogue<'a, S: EventStore>(
    slot: &'a mut Option<Catalogue<S::File>>,
    store: &S,
    config: &SourceConfig,
) -> Result<&'a mut Catalogue<S::File>, SourceError> {
    if slot.is_none() {
        *slot = Some(Catalogue::build(store, &config.files, config.allow_reuse)?);
    }
    slot.as_mut().ok_or(SourceError::NoFiles)
}
