//! Session controller and multi-source fan-in.
//!
//! One [`Session`] governs one logical viewing session: it resolves its
//! target to concrete sources once per connect, runs one reader task per
//! source, and routes every framed line into the session's dedup buffer.
//! Reader tasks live behind a per-generation cancellation token; a reset
//! cancels the old generation before replacing the buffer, and every append
//! re-checks its generation, so a stale reader can never write into a buffer
//! its session has abandoned.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use migtail_types::{
    FetchOptions, FilterCriteria, LogLine, LogTarget, ReconnectPolicy, SessionState, Source,
};

use crate::buffer::{DEFAULT_CAPACITY, DedupBuffer};
use crate::export::{self, DebugLogSource};
use crate::filter::apply_filter;
use crate::framing::LineFramer;
use crate::transport::{LocatorError, LogTransport};

/// Resolves a logical target to one or more concrete sources.
///
/// Consulted once per connect; sources are not re-resolved mid-session.
pub trait SourceLocator: Send + Sync + 'static {
    fn resolve(&self, target: &LogTarget) -> BoxFuture<'static, Result<Vec<Source>, LocatorError>>;
}

/// Static configuration for one session.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub capacity: usize,
    pub reconnect: ReconnectPolicy,
    pub fetch: FetchOptions,
}

impl SessionConfig {
    /// Capacity and fetch defaults with the reconnect policy the target
    /// shape calls for: manual for a single pod, fixed backoff for a
    /// selector fan-out.
    pub fn for_target(target: &LogTarget) -> Self {
        Self {
            reconnect: ReconnectPolicy::default_for(target),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            reconnect: ReconnectPolicy::Manual,
            fetch: FetchOptions::default(),
        }
    }
}

struct Ctl {
    target: LogTarget,
    enabled: bool,
    live: bool,
    session_key: u64,
    /// Connect-attempt counter; appends from older generations are dropped
    generation: u64,
    state: SessionState,
    error: Option<String>,
    /// Set once the first connect requested backlog; later connects within
    /// the same session only ask for new lines
    history_fetched: bool,
    buffer: Arc<DedupBuffer>,
    criteria: FilterCriteria,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    sources: Vec<Source>,
    active_readers: usize,
}

struct SessionInner {
    locator: Arc<dyn SourceLocator>,
    transport: Arc<dyn LogTransport>,
    config: SessionConfig,
    ctl: Mutex<Ctl>,
    revision: watch::Sender<u64>,
}

/// One logical viewing session over a target.
///
/// Must be used from within a tokio runtime; lifecycle calls spawn and
/// abort reader tasks. Dropping the session aborts everything it owns.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(
        target: LogTarget,
        locator: Arc<dyn SourceLocator>,
        transport: Arc<dyn LogTransport>,
        config: SessionConfig,
    ) -> Self {
        let (revision, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(SessionInner {
                locator,
                transport,
                config,
                revision,
                ctl: Mutex::new(Ctl {
                    target,
                    enabled: false,
                    live: true,
                    session_key: 0,
                    generation: 0,
                    state: SessionState::Idle,
                    error: None,
                    history_fetched: false,
                    buffer: Arc::new(DedupBuffer::new(config.capacity)),
                    criteria: FilterCriteria::pass_all(),
                    cancel: CancellationToken::new(),
                    tasks: Vec::new(),
                    sources: Vec::new(),
                    active_readers: 0,
                }),
            }),
        }
    }

    /// Enable or disable streaming. Enabling with a non-empty target moves
    /// the session to `Connecting`; disabling aborts all transports and
    /// returns to `Idle`, keeping the buffer.
    pub fn enable(&self, on: bool) {
        if on {
            {
                let mut ctl = self.inner.ctl.lock();
                if ctl.enabled {
                    return;
                }
                ctl.enabled = true;
                ctl.live = true;
            }
            self.inner.start();
        } else {
            self.inner.halt(SessionState::Idle);
        }
    }

    /// Toggle "live". Pausing aborts the transports but retains the buffer
    /// and dedup set; resuming reconnects without re-requesting history.
    pub fn set_live(&self, on: bool) {
        if on {
            {
                let mut ctl = self.inner.ctl.lock();
                if !ctl.enabled || ctl.live {
                    return;
                }
                ctl.live = true;
            }
            self.inner.start();
        } else {
            let enabled = self.inner.ctl.lock().enabled;
            if enabled {
                self.inner.halt(SessionState::Paused);
            }
        }
    }

    /// Manual reconnect: bump the session key, abort all transports, and
    /// replace the buffer together with its dedup set, then connect again
    /// if enabled. The next connect replays history.
    pub fn reconnect(&self) {
        {
            let mut ctl = self.inner.ctl.lock();
            if ctl.enabled {
                ctl.live = true;
            }
        }
        self.inner.reset();
    }

    /// Change the logical target; implies a full reset.
    pub fn set_target(&self, target: LogTarget) {
        self.inner.ctl.lock().target = target;
        self.inner.reset();
    }

    pub fn set_filter(&self, criteria: FilterCriteria) {
        self.inner.ctl.lock().criteria = criteria;
        self.inner.notify();
    }

    /// Serialize the current filtered view.
    pub fn export_text(&self) -> String {
        export::render_lines(&self.filtered())
    }

    /// Serialize the filtered view plus whatever the debug fallback yields.
    pub fn export_bundle(&self, debug: Option<(&dyn DebugLogSource, &str)>) -> String {
        export::bundle(&self.filtered(), debug)
    }

    pub fn state(&self) -> SessionState {
        self.inner.ctl.lock().state
    }

    pub fn error(&self) -> Option<String> {
        self.inner.ctl.lock().error.clone()
    }

    pub fn session_key(&self) -> u64 {
        self.inner.ctl.lock().session_key
    }

    pub fn sources(&self) -> Vec<Source> {
        self.inner.ctl.lock().sources.clone()
    }

    pub fn is_live(&self) -> bool {
        self.inner.ctl.lock().live
    }

    /// Readers still attached to the current generation
    pub fn active_readers(&self) -> usize {
        self.inner.ctl.lock().active_readers
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.inner.buffer().snapshot()
    }

    /// Current filtered view
    pub fn filtered(&self) -> Vec<LogLine> {
        let (buffer, criteria) = {
            let ctl = self.inner.ctl.lock();
            (Arc::clone(&ctl.buffer), ctl.criteria.clone())
        };
        apply_filter(&buffer.snapshot(), &criteria)
    }

    /// Lines appended after the given buffer sequence number
    pub fn lines_since(&self, sequence: u64) -> Vec<LogLine> {
        self.inner.buffer().since(sequence)
    }

    pub fn len(&self) -> usize {
        self.inner.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.buffer().is_empty()
    }

    /// Revision counter bumped on every append and state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut ctl = self.inner.ctl.lock();
        ctl.enabled = false;
        ctl.cancel.cancel();
        for task in ctl.tasks.drain(..) {
            task.abort();
        }
    }
}

impl SessionInner {
    fn buffer(&self) -> Arc<DedupBuffer> {
        Arc::clone(&self.ctl.lock().buffer)
    }

    fn notify(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    /// Abort the current generation's transports without touching the
    /// buffer. Used by disable and pause.
    fn halt(&self, state: SessionState) {
        {
            let mut ctl = self.ctl.lock();
            ctl.cancel.cancel();
            for task in ctl.tasks.drain(..) {
                task.abort();
            }
            ctl.cancel = CancellationToken::new();
            ctl.active_readers = 0;
            match state {
                SessionState::Idle => ctl.enabled = false,
                SessionState::Paused => ctl.live = false,
                _ => {}
            }
            ctl.state = state;
        }
        self.notify();
    }

    /// Full reset: abort everything, replace buffer + dedup set, clear the
    /// history flag, bump the session key, then reconnect if enabled.
    fn reset(self: &Arc<Self>) {
        {
            let mut ctl = self.ctl.lock();
            ctl.cancel.cancel();
            for task in ctl.tasks.drain(..) {
                task.abort();
            }
            ctl.cancel = CancellationToken::new();
            // Invalidate in-flight appends before the new buffer exists.
            ctl.generation += 1;
            ctl.session_key += 1;
            ctl.buffer = Arc::new(DedupBuffer::new(self.config.capacity));
            ctl.history_fetched = false;
            ctl.error = None;
            ctl.sources.clear();
            ctl.active_readers = 0;
            ctl.state = SessionState::Idle;
        }
        self.notify();
        self.start();
    }

    /// Begin a new connect generation. No-op unless the session is enabled,
    /// live, and targeted.
    fn start(self: &Arc<Self>) {
        let (generation, cancel, replay, target) = {
            let mut ctl = self.ctl.lock();
            if !ctl.enabled || !ctl.live || ctl.target.is_empty() {
                return;
            }
            ctl.cancel.cancel();
            for task in ctl.tasks.drain(..) {
                task.abort();
            }
            ctl.cancel = CancellationToken::new();
            ctl.generation += 1;
            ctl.state = SessionState::Connecting;
            ctl.sources.clear();
            ctl.active_readers = 0;
            (
                ctl.generation,
                ctl.cancel.clone(),
                !ctl.history_fetched,
                ctl.target.clone(),
            )
        };
        self.notify();

        let inner = Arc::clone(self);
        let handle =
            tokio::spawn(async move { inner.connect(generation, cancel, replay, target).await });

        let mut ctl = self.ctl.lock();
        if ctl.generation == generation {
            ctl.tasks.push(handle);
        } else {
            handle.abort();
        }
    }

    async fn connect(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        replay: bool,
        target: LogTarget,
    ) {
        let sources = match self.locator.resolve(&target).await {
            Ok(sources) if sources.is_empty() => {
                self.escalate(generation, LocatorError::Empty(target.describe()).to_string());
                return;
            }
            Ok(sources) => sources,
            Err(e) => {
                self.escalate(generation, e.to_string());
                return;
            }
        };

        let options = {
            let mut ctl = self.ctl.lock();
            if ctl.generation != generation {
                return;
            }
            ctl.sources = sources.clone();
            ctl.active_readers = sources.len();
            ctl.history_fetched = true;
            let mut options = self.config.fetch;
            if !replay {
                options.tail_lines = None;
            }
            options
        };

        debug!(session_target = %target.describe(), sources = sources.len(), "opening log streams");

        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let inner = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                inner.run_reader(generation, cancel, source, options).await;
            }));
        }

        {
            let mut ctl = self.ctl.lock();
            if ctl.generation == generation {
                ctl.tasks.extend(handles);
                // The aggregated variant is streaming as soon as the source
                // list resolves; the single-source variant waits for its
                // first byte chunk.
                if target.is_aggregated() {
                    ctl.state = SessionState::Streaming;
                    ctl.error = None;
                }
            } else {
                for handle in handles {
                    handle.abort();
                }
                return;
            }
        }
        self.notify();
    }

    /// One reader: open the transport, frame chunks into lines, append.
    /// Cancellation is silent; a clean end-of-stream flushes the tail;
    /// anything else is reported as this source's failure.
    async fn run_reader(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        source: Source,
        options: FetchOptions,
    ) {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = self.transport.open(&source, &options) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                self.reader_finished(generation, &source.id, Some(e.to_string()));
                return;
            }
        };

        let mut framer = LineFramer::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        self.mark_streaming(generation);
                        for line in framer.push(&bytes) {
                            self.append(generation, &source.id, &line);
                        }
                    }
                    Some(Err(e)) if e.is_cancelled() => return,
                    Some(Err(e)) => {
                        self.reader_finished(generation, &source.id, Some(e.to_string()));
                        return;
                    }
                    None => {
                        if let Some(tail) = framer.finish() {
                            self.append(generation, &source.id, &tail);
                        }
                        self.reader_finished(generation, &source.id, None);
                        return;
                    }
                },
            }
        }
    }

    fn append(&self, generation: u64, source_id: &str, text: &str) {
        let buffer = {
            let ctl = self.ctl.lock();
            if ctl.generation != generation {
                return;
            }
            Arc::clone(&ctl.buffer)
        };
        if buffer.append(source_id, text) {
            self.notify();
        }
    }

    fn mark_streaming(&self, generation: u64) {
        let changed = {
            let mut ctl = self.ctl.lock();
            if ctl.generation != generation || ctl.state == SessionState::Streaming {
                false
            } else {
                ctl.state = SessionState::Streaming;
                ctl.error = None;
                true
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Bookkeeping for one reader ending. A failure is surfaced on the
    /// session's error field but only escalates the session state once no
    /// reader of this generation is left running.
    fn reader_finished(self: &Arc<Self>, generation: u64, source_id: &str, error: Option<String>) {
        let escalation = {
            let mut ctl = self.ctl.lock();
            if ctl.generation != generation {
                return;
            }
            ctl.active_readers = ctl.active_readers.saturating_sub(1);
            match error {
                Some(e) => {
                    warn!(source = source_id, error = %e, "log stream failed");
                    ctl.error = Some(e);
                    if ctl.active_readers == 0 {
                        ctl.error.clone()
                    } else {
                        None
                    }
                }
                None => {
                    debug!(source = source_id, "log stream ended");
                    None
                }
            }
        };
        if let Some(message) = escalation {
            self.escalate(generation, message);
        } else {
            self.notify();
        }
    }

    /// Session-level failure. Manual policy waits for `reconnect()`; the
    /// backoff policy schedules `Error -> Reconnecting -> Connecting` after
    /// its interval, indefinitely, as long as the session stays enabled.
    fn escalate(self: &Arc<Self>, generation: u64, message: String) {
        {
            let mut ctl = self.ctl.lock();
            if ctl.generation != generation {
                return;
            }
            ctl.state = SessionState::Error;
            ctl.error = Some(message);
        }
        self.notify();

        if let ReconnectPolicy::Backoff(interval) = self.config.reconnect {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let proceed = {
                    let mut ctl = inner.ctl.lock();
                    if ctl.generation == generation
                        && ctl.enabled
                        && ctl.live
                        && ctl.state == SessionState::Error
                    {
                        ctl.state = SessionState::Reconnecting;
                        true
                    } else {
                        false
                    }
                };
                if proceed {
                    inner.notify();
                    inner.start();
                }
            });
        }
    }
}
