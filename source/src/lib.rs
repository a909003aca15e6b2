#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Background event supply.
//!
//! The crate owns every external resource of the overlay engine: background
//! files are reached through the [`EventStore`] capability, opened lazily by a
//! [`BackgroundEventSource`] and closed by dropping their handle. No handle is
//! ever shared between the source and its callers.

mod background;
pub mod memory;

use bx_overlay_core::{Event, EventKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use background::{BackgroundEventSource, SourceConfig};

/// Errors raised while supplying background events.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No background file is configured.
    #[error("no background files configured")]
    NoFiles,
    /// The store does not know the path.
    #[error("background file '{path}' not found")]
    FileNotFound {
        /// Offending path.
        path: String,
    },
    /// The store failed to read from an open file.
    #[error("failed to read background file '{path}': {message}")]
    Read {
        /// Offending path.
        path: String,
        /// Store-specific description.
        message: String,
    },
    /// Random access was requested from a file without an index.
    #[error("background file '{path}' does not support direct access")]
    DirectAccessUnsupported {
        /// Offending path.
        path: String,
    },
    /// Every background file was consumed and reuse is disallowed.
    #[error("all {files} background files consumed and reuse is disallowed")]
    Exhausted {
        /// Number of configured files.
        files: usize,
    },
    /// None of the background files holds a single event.
    #[error("none of the {files} background files contains an event")]
    NoEvents {
        /// Number of configured files.
        files: usize,
    },
    /// The configured starting file does not exist.
    #[error("start file index {index} outside the {files} configured background files")]
    StartFileOutOfRange {
        /// Configured index.
        index: usize,
        /// Number of configured files.
        files: usize,
    },
}

/// Strategy used to pick the next background event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyMode {
    /// Stream one file; on exhaustion switch to a random file not yet used
    /// for the current physics event.
    #[default]
    Sequential,
    /// Stream the concatenated file list and restart from its first file at the end.
    Wraparound,
    /// Draw a uniform index over the events of all files and read it directly.
    RandomAccess,
}

/// Open background file.
///
/// Dropping the handle closes the file.
pub trait EventFile {
    /// Reads the event following the previously read one, or `None` at the end.
    fn read_next(&mut self) -> Result<Option<Event>, SourceError>;

    /// Number of events, if the file supports direct access.
    fn event_count(&self) -> Option<usize>;

    /// Key of the event at `index`, if the file supports direct access.
    fn key_at(&self, index: usize) -> Option<EventKey>;

    /// Reads the event identified by `key` without moving the stream.
    fn read_by_key(&mut self, key: EventKey) -> Result<Option<Event>, SourceError>;
}

/// Capability to open background files by path.
pub trait EventStore {
    /// Handle type of an open file.
    type File: EventFile;

    /// Opens the file at `path`.
    fn open(&self, path: &str) -> Result<Self::File, SourceError>;
}
