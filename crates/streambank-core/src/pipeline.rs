//! Media pipeline capability
//!
//! The adaptive-streaming transport itself lives outside this crate. The
//! session drives it through [`MediaPipeline`] and receives its signals through
//! the [`PipelineEvents`] sender handed over on `attach`.

use crate::{session::SessionInput, LoadToken, PipelineErrorKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Signal emitted by the pipeline for one load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum PipelineSignal {
    /// The source manifest was parsed and playback can start
    ManifestReady,
    /// The pipeline hit an error
    Error { kind: PipelineErrorKind, fatal: bool },
}

/// A pipeline signal tagged with the load attempt it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub token: LoadToken,
    pub signal: PipelineSignal,
}

/// Event channel into the owning session
#[derive(Debug, Clone)]
pub struct PipelineEvents {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl PipelineEvents {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Returns false once the session is gone.
    pub fn send(&self, event: PipelineEvent) -> bool {
        let delivered = self.tx.send(SessionInput::Pipeline(event)).is_ok();
        if !delivered {
            debug!(token = %event.token, "Session closed, dropping pipeline event");
        }
        delivered
    }

    pub fn ready(&self, token: LoadToken) -> bool {
        self.send(PipelineEvent {
            token,
            signal: PipelineSignal::ManifestReady,
        })
    }

    pub fn error(&self, token: LoadToken, kind: PipelineErrorKind, fatal: bool) -> bool {
        self.send(PipelineEvent {
            token,
            signal: PipelineSignal::Error { kind, fatal },
        })
    }
}

/// Commands the playback session issues to the media pipeline.
///
/// Only the owning session calls these. Implementations report progress for
/// the attempt identified by the `LoadToken` passed to `load_source` (or
/// `set_native_source`) through the events sender received in `attach`.
pub trait MediaPipeline: Send + 'static {
    /// Whether adaptive streaming is usable in this environment
    fn is_supported(&self) -> bool;

    /// Whether the host can play a URL directly when adaptive streaming is not supported
    fn supports_native(&self) -> bool {
        false
    }

    /// Bind the pipeline to its session
    fn attach(&mut self, events: PipelineEvents);

    /// Point the pipeline at a new source
    fn load_source(&mut self, url: &str, token: LoadToken);

    /// Start (or restart) fetching the current source
    fn start_load(&mut self);

    /// Abandon the current load
    fn stop_load(&mut self);

    /// In-place recovery from a media decode error
    fn recover_media_error(&mut self);

    /// Native fallback: hand the URL straight to the host player
    fn set_native_source(&mut self, url: &str, token: LoadToken) {
        let _ = (url, token);
    }

    /// Release every resource held by the pipeline
    fn destroy(&mut self);
}

impl<P: MediaPipeline + ?Sized> MediaPipeline for Box<P> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn supports_native(&self) -> bool {
        (**self).supports_native()
    }

    fn attach(&mut self, events: PipelineEvents) {
        (**self).attach(events)
    }

    fn load_source(&mut self, url: &str, token: LoadToken) {
        (**self).load_source(url, token)
    }

    fn start_load(&mut self) {
        (**self).start_load()
    }

    fn stop_load(&mut self) {
        (**self).stop_load()
    }

    fn recover_media_error(&mut self) {
        (**self).recover_media_error()
    }

    fn set_native_source(&mut self, url: &str, token: LoadToken) {
        (**self).set_native_source(url, token)
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}
