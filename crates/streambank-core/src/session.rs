//! Playback Session - source resolution and failover
//!
//! Owns the media pipeline and decides which URL it should be playing:
//! - Selection of an entry from the catalog
//! - Same-URL retries with linear backoff for fatal network errors
//! - In-place recovery for fatal media errors
//! - Cascade through the entry's backup URLs
//! - Grace-period check for backups that fail without reporting an error
//!
//! All inputs (commands, pipeline events, timer expiries) go through one
//! channel and are handled to completion in arrival order.

use crate::{
    catalog::CatalogStore,
    config::PlaybackConfig,
    history::History,
    pipeline::{MediaPipeline, PipelineEvent, PipelineEvents, PipelineSignal},
    Category, Error, LoadToken, PipelineErrorKind, PlaybackState, Result, SessionId,
    SessionSnapshot, StreamEntry,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

const NOTICE_CAPACITY: usize = 32;

/// Human-readable message for transient display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNotice {
    pub code: String,
    pub message: String,
    /// Playback of the current entry has given up
    pub terminal: bool,
}

impl SessionNotice {
    fn info(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            terminal: false,
        }
    }

    fn from_error(err: &Error) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
            terminal: err.is_terminal(),
        }
    }
}

/// Deferred work scheduled by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Reload the active URL after backoff
    Retry,
    /// Check that a freshly loaded backup started playing
    BackupCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerFired {
    token: LoadToken,
    kind: TimerKind,
}

struct PendingTimer {
    fired: TimerFired,
    handle: JoinHandle<()>,
}

/// Everything the session reacts to
#[derive(Debug)]
pub(crate) enum SessionInput {
    Select {
        category: Category,
        index: usize,
        reply: oneshot::Sender<Result<StreamEntry>>,
    },
    SelectById {
        id: String,
        reply: oneshot::Sender<Result<StreamEntry>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    AdvanceBackup {
        reply: oneshot::Sender<Result<String>>,
    },
    Pipeline(PipelineEvent),
    Timer(TimerFired),
    Shutdown,
}

type StateListener = Box<dyn Fn(&SessionSnapshot) + Send>;
type ErrorListener = Box<dyn Fn(&SessionNotice) + Send>;

/// Playback session managing the selected entry and its sources
pub struct PlaybackSession<P: MediaPipeline> {
    /// Unique session ID
    id: SessionId,
    /// Retry and cascade configuration
    config: PlaybackConfig,
    /// Catalog entries are resolved against
    catalog: CatalogStore,
    /// Exclusively owned media pipeline
    pipeline: P,
    state: PlaybackState,
    current_entry: Option<StreamEntry>,
    /// URL currently loaded into the pipeline
    active_url: Option<String>,
    retry_count: u32,
    /// Next backup to try
    backup_cursor: usize,
    /// Token of the current load attempt
    token: LoadToken,
    /// At most one pending timer
    timer: Option<PendingTimer>,
    last_error: Option<String>,
    history: History,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    inputs_rx: mpsc::UnboundedReceiver<SessionInput>,
    state_tx: watch::Sender<SessionSnapshot>,
    notice_tx: broadcast::Sender<SessionNotice>,
    state_listeners: Vec<StateListener>,
    error_listeners: Vec<ErrorListener>,
}

impl<P: MediaPipeline> PlaybackSession<P> {
    /// Create a session and attach the pipeline to it
    pub fn new(config: PlaybackConfig, catalog: CatalogStore, mut pipeline: P) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionSnapshot::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        pipeline.attach(PipelineEvents::new(inputs_tx.clone()));

        let session = Self {
            id: SessionId::new(),
            config,
            catalog,
            pipeline,
            state: PlaybackState::Idle,
            current_entry: None,
            active_url: None,
            retry_count: 0,
            backup_cursor: 0,
            token: LoadToken::default(),
            timer: None,
            last_error: None,
            history: History::new(),
            inputs_tx,
            inputs_rx,
            state_tx,
            notice_tx,
            state_listeners: Vec::new(),
            error_listeners: Vec::new(),
        };
        info!(session_id = %session.id, "Playback session created");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_entry(&self) -> Option<&StreamEntry> {
        self.current_entry.as_ref()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active_url.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn backup_cursor(&self) -> usize {
        self.backup_cursor
    }

    /// Token of the load attempt currently owned by the pipeline
    pub fn load_token(&self) -> LoadToken {
        self.token
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            current_entry: self.current_entry.clone(),
            active_url: self.active_url.clone(),
            error: self.last_error.clone(),
        }
    }

    /// Subscribe to state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Subscribe to user-facing notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    /// Register a state change callback
    pub fn on_state_change(&mut self, listener: impl Fn(&SessionSnapshot) + Send + 'static) {
        self.state_listeners.push(Box::new(listener));
    }

    /// Register a callback for failure descriptions
    pub fn on_error(&mut self, listener: impl Fn(&SessionNotice) + Send + 'static) {
        self.error_listeners.push(Box::new(listener));
    }

    /// Cloneable handle for driving a session running in its own task
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.inputs_tx.clone(),
            state_rx: self.state_tx.subscribe(),
            notice_tx: self.notice_tx.clone(),
        }
    }

    /// Select the entry at `index` of `category` and start loading it.
    ///
    /// An unknown entry leaves the session untouched. A load still in flight
    /// is superseded.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn select(&mut self, category: &Category, index: usize) -> Result<StreamEntry> {
        let catalog = self.catalog.snapshot();
        let entry = match catalog.get(category, index) {
            Ok(entry) => entry.clone(),
            Err(err) => {
                warn!(error = %err, "Selection not found");
                self.emit_notice(SessionNotice::from_error(&err));
                return Err(err);
            }
        };

        info!(id = %entry.id, name = %entry.name, url = %entry.url, "Stream selected");

        self.cancel_timer();
        self.current_entry = Some(entry.clone());
        self.retry_count = 0;
        self.backup_cursor = 0;
        self.last_error = None;
        self.history.record(&entry);

        self.begin_load(entry.url.clone())?;
        Ok(entry)
    }

    /// Select an entry by its catalog id
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn select_by_id(&mut self, id: &str) -> Result<StreamEntry> {
        let position = self.catalog.snapshot().position(id);
        match position {
            Some((category, index)) => self.select(&category, index),
            None => {
                let err = Error::UnknownEntry(id.to_string());
                warn!(error = %err, "Selection not found");
                self.emit_notice(SessionNotice::from_error(&err));
                Err(err)
            }
        }
    }

    /// The pipeline parsed the source and playback can start
    pub fn on_pipeline_ready(&mut self, token: LoadToken) {
        if !self.is_current(token) || self.state != PlaybackState::Loading {
            debug!(token = %token, current = %self.token, "Ignoring stale ready signal");
            return;
        }

        info!(url = ?self.active_url, "Stream ready");
        self.retry_count = 0;
        self.last_error = None;
        self.cancel_timer();
        self.set_state(PlaybackState::Playing);
    }

    /// The pipeline reported an error for the attempt `token`
    pub fn on_pipeline_error(&mut self, token: LoadToken, kind: PipelineErrorKind, fatal: bool) {
        if !self.is_current(token) || !self.state.is_active() {
            debug!(token = %token, current = %self.token, %kind, "Ignoring stale pipeline error");
            return;
        }

        if !fatal {
            warn!(%kind, url = ?self.active_url, "Non-fatal pipeline error");
            return;
        }

        error!(%kind, url = ?self.active_url, retry = self.retry_count, "Fatal pipeline error");
        self.last_error = Some(Error::Pipeline { kind, fatal }.to_string());
        self.notify();

        let budget_left = self.retry_count < self.config.max_retries;
        match kind {
            PipelineErrorKind::Network if budget_left => {
                self.retry_count += 1;
                let delay = self.config.retry_delay(self.retry_count);
                info!(
                    attempt = self.retry_count,
                    max = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.schedule(TimerKind::Retry, delay);
                if self.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Loading);
                }
            }
            PipelineErrorKind::Media if budget_left => {
                self.retry_count += 1;
                info!(attempt = self.retry_count, "Recovering media error");
                self.pipeline.recover_media_error();
            }
            _ => self.advance_cascade(),
        }
    }

    /// Halt playback. The current entry stays selected for display.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn stop(&mut self) {
        info!("Stopping playback");
        self.cancel_timer();
        self.pipeline.stop_load();
        // Late events from the abandoned load must not match
        self.token = self.token.next();
        self.active_url = None;
        self.retry_count = 0;
        self.set_state(PlaybackState::Idle);
    }

    /// Switch to the next backup URL on demand
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn advance_backup(&mut self) -> Result<String> {
        let remaining = self
            .current_entry
            .as_ref()
            .map(|e| e.backup_urls.len().saturating_sub(self.backup_cursor))
            .unwrap_or(0);

        if remaining == 0 {
            let err = Error::NoAlternativeSource;
            warn!("No alternative source left");
            self.emit_notice(SessionNotice::from_error(&err));
            return Err(err);
        }

        self.advance_cascade();
        self.active_url.clone().ok_or(Error::NoAlternativeSource)
    }

    /// Process inputs until shutdown
    pub async fn run(mut self) {
        while self.process_next().await {}
        info!(session_id = %self.id, "Playback session finished");
    }

    /// Wait for the next input and handle it. Returns false on shutdown.
    pub async fn process_next(&mut self) -> bool {
        match self.inputs_rx.recv().await {
            Some(input) => self.handle_input(input),
            None => false,
        }
    }

    fn handle_input(&mut self, input: SessionInput) -> bool {
        match input {
            SessionInput::Select { category, index, reply } => {
                let _ = reply.send(self.select(&category, index));
            }
            SessionInput::SelectById { id, reply } => {
                let _ = reply.send(self.select_by_id(&id));
            }
            SessionInput::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            SessionInput::AdvanceBackup { reply } => {
                let _ = reply.send(self.advance_backup());
            }
            SessionInput::Pipeline(event) => match event.signal {
                PipelineSignal::ManifestReady => self.on_pipeline_ready(event.token),
                PipelineSignal::Error { kind, fatal } => {
                    self.on_pipeline_error(event.token, kind, fatal)
                }
            },
            SessionInput::Timer(fired) => self.on_timer(fired),
            SessionInput::Shutdown => {
                self.cancel_timer();
                self.pipeline.destroy();
                return false;
            }
        }
        true
    }

    fn on_timer(&mut self, fired: TimerFired) {
        let expected = self.timer.as_ref().map(|t| t.fired);
        if expected != Some(fired) || !self.is_current(fired.token) {
            debug!(token = %fired.token, kind = ?fired.kind, "Ignoring superseded timer");
            return;
        }
        self.timer = None;

        match fired.kind {
            TimerKind::Retry => {
                if self.state != PlaybackState::Loading {
                    return;
                }
                if let Some(url) = self.active_url.clone() {
                    info!(url = %url, attempt = self.retry_count, "Reconnecting");
                    if let Err(err) = self.begin_load(url) {
                        debug!(error = %err, "Reconnect failed");
                    }
                }
            }
            TimerKind::BackupCheck => {
                if self.state != PlaybackState::Playing {
                    warn!(url = ?self.active_url, "Backup source did not start in time");
                    self.advance_cascade();
                }
            }
        }
    }

    /// Move to the next backup URL, or fail when none is left
    fn advance_cascade(&mut self) {
        let Some(entry) = self.current_entry.as_ref() else {
            return;
        };
        let total = entry.backup_urls.len();

        let next = entry.backup_urls.get(self.backup_cursor).cloned();
        match next {
            Some(url) => {
                self.backup_cursor += 1;
                self.retry_count = 0;
                info!(
                    backup = self.backup_cursor,
                    total,
                    url = %url,
                    "Trying alternative source"
                );
                self.emit_notice(SessionNotice::info(
                    "BACKUP",
                    format!("Trying alternative source {} of {}...", self.backup_cursor, total),
                ));
                if let Err(err) = self.begin_load(url) {
                    debug!(error = %err, "Alternative source could not be loaded");
                }
            }
            None => self.fail(Error::SourcesExhausted),
        }
    }

    /// Hand `url` to the pipeline under a fresh token
    fn begin_load(&mut self, url: String) -> Result<()> {
        self.cancel_timer();
        self.token = self.token.next();
        let token = self.token;

        if self.pipeline.is_supported() {
            self.pipeline.stop_load();
            self.pipeline.load_source(&url, token);
            self.pipeline.start_load();
        } else if self.pipeline.supports_native() {
            debug!("Adaptive pipeline unavailable, using native playback");
            self.pipeline.set_native_source(&url, token);
        } else {
            let err = Error::UnsupportedEnvironment;
            self.fail(Error::UnsupportedEnvironment);
            return Err(err);
        }

        info!(url = %url, token = %token, "Loading stream");
        self.active_url = Some(url);
        self.set_state(PlaybackState::Loading);

        if self.backup_cursor > 0 {
            self.schedule(TimerKind::BackupCheck, self.config.backup_grace_period);
        }
        Ok(())
    }

    /// Terminal failure for the current entry
    fn fail(&mut self, err: Error) {
        error!(error = %err, code = err.error_code(), "Playback failed");
        self.cancel_timer();
        self.pipeline.stop_load();
        self.active_url = self.current_entry.as_ref().map(|e| e.url.clone());
        self.last_error = Some(err.to_string());
        self.set_state(PlaybackState::Failed);
        self.emit_notice(SessionNotice::from_error(&err));
    }

    fn is_current(&self, token: LoadToken) -> bool {
        token == self.token
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel_timer();
        let fired = TimerFired {
            token: self.token,
            kind,
        };
        let tx = self.inputs_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionInput::Timer(fired));
        });
        debug!(kind = ?kind, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        self.timer = Some(PendingTimer { fired, handle });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
            debug!(kind = ?timer.fired.kind, "Timer cancelled");
        }
    }

    #[cfg(test)]
    pub(crate) fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    fn set_state(&mut self, next: PlaybackState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Invalid state transition");
            return;
        }
        if self.state != next {
            info!(from = %self.state, to = %next, "State transition");
        }
        self.state = next;
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        for listener in &self.state_listeners {
            listener(&snapshot);
        }
        self.state_tx.send_replace(snapshot);
    }

    fn emit_notice(&self, notice: SessionNotice) {
        for listener in &self.error_listeners {
            listener(&notice);
        }
        let _ = self.notice_tx.send(notice);
    }
}

/// Handle to a session running in its own task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
    state_rx: watch::Receiver<SessionSnapshot>,
    notice_tx: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    pub async fn select(&self, category: impl Into<Category>, index: usize) -> Result<StreamEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Select {
            category: category.into(),
            index,
            reply,
        })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    pub async fn select_by_id(&self, id: impl Into<String>) -> Result<StreamEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::SelectById { id: id.into(), reply })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Stop { reply })?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    pub async fn advance_backup(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::AdvanceBackup { reply })?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Ask the session to destroy its pipeline and exit
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionInput::Shutdown);
    }

    /// Event sender for an externally driven pipeline
    pub fn pipeline_events(&self) -> PipelineEvents {
        PipelineEvents::new(self.tx.clone())
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.tx.send(input).map_err(|_| Error::SessionClosed)
    }
}
