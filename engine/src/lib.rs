#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Host-facing overlay engine.
//!
//! [`OverlayEngine`] is driven through four calls mirroring the host event
//! loop: [`OverlayEngine::initialize`], [`OverlayEngine::on_run_start`],
//! [`OverlayEngine::overlay`] and [`OverlayEngine::finalize`]. Every physics
//! event is processed completely before the call returns.

mod accumulator;
mod config;
mod error;
mod joiner;
mod report;
mod session;
mod untimed;

use bx_overlay_core::Event;
use bx_overlay_source::EventStore;
use tracing::warn;

pub use accumulator::EventAccumulator;
pub use config::{ConfigError, OverlayConfig, OverlayMode};
pub use error::OverlayError;
pub use joiner::{EventJoiner, DEFAULT_JOIN_SUFFIX};
pub use report::OverlayReport;

use session::Session;

/// Lifecycle state of an [`OverlayEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, not configured yet.
    Uninitialized,
    /// Configured, no event processed yet.
    Ready,
    /// At least one run or event was seen.
    Running,
    /// Finalized; no further calls are accepted.
    Finalized,
}

/// Overlays background events onto physics events.
pub struct OverlayEngine<S: EventStore> {
    store: Option<S>,
    session: Option<Session<S>>,
    state: Lifecycle,
}

impl<S: EventStore> OverlayEngine<S> {
    /// Creates an engine reading background files from `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store: Some(store),
            session: None,
            state: Lifecycle::Uninitialized,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> Lifecycle {
        self.state
    }

    /// Validates `config` and prepares every component.
    pub fn initialize(&mut self, config: &OverlayConfig) -> Result<(), OverlayError> {
        self.expect_state("initialize", &[Lifecycle::Uninitialized])?;
        config.validate()?;
        let store = self.store.take().ok_or(OverlayError::Lifecycle {
            operation: "initialize",
            state: self.state,
        })?;
        let session = Session::new(store, config)?;
        if !session.has_files() {
            warn!("no background files configured, events pass through unchanged");
        }
        session.log_start();
        self.session = Some(session);
        self.state = Lifecycle::Ready;
        Ok(())
    }

    /// Notifies the engine of a new run.
    pub fn on_run_start(&mut self) -> Result<(), OverlayError> {
        let session = self.running_session("start a run")?;
        session.start_run();
        Ok(())
    }

    /// Overlays background onto `event` with a seed derived from the
    /// configured seed, processor name and run and event counters.
    ///
    /// On [`OverlayError::StopProcessing`] the event is dropped; the host must
    /// not emit it.
    pub fn overlay(&mut self, event: Event) -> Result<Event, OverlayError> {
        let session = self.running_session("overlay")?;
        let seed = session.next_seed();
        session.overlay(event, seed)
    }

    /// Overlays background onto `event` using an externally supplied seed.
    pub fn overlay_with_seed(&mut self, event: Event, seed: u64) -> Result<Event, OverlayError> {
        let session = self.running_session("overlay")?;
        let _ = session.next_seed();
        session.overlay(event, seed)
    }

    /// Closes every background file and reports job totals.
    pub fn finalize(&mut self) -> Result<OverlayReport, OverlayError> {
        self.expect_state("finalize", &[Lifecycle::Ready, Lifecycle::Running])?;
        let report = match self.session.as_mut() {
            Some(session) => session.finish(),
            None => OverlayReport::default(),
        };
        self.session = None;
        self.state = Lifecycle::Finalized;
        Ok(report)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[Lifecycle],
    ) -> Result<(), OverlayError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(OverlayError::Lifecycle {
                operation,
                state: self.state,
            })
        }
    }

    fn running_session(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut Session<S>, OverlayError> {
        self.expect_state(operation, &[Lifecycle::Ready, Lifecycle::Running])?;
        let state = self.state;
        let session = self
            .session
            .as_mut()
            .ok_or(OverlayError::Lifecycle { operation, state })?;
        self.state = Lifecycle::Running;
        Ok(session)
    }
}
