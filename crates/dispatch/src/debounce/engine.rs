use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    parley_channels::{Context, Presence},
    parley_config::TimerConfig,
    moka::sync::Cache,
    parley_sessions::{Session, SessionStore},
    tokio::{sync::watch, time::Instant},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, debounce as debounce_metrics, gauge, histogram, labels};

use {
    super::{
        scheduler::{Scheduler, TimerHandle},
        window::{PresenceCaps, TimerIntent, Window},
    },
    crate::{
        batch::Batch,
        error_sink::{ErrorSink, Lane},
        handlers::Handlers,
    },
};

/// Sessions remembered as already seen, at most this many.
const SEEN_CAPACITY: u64 = 10_000;
/// A remembered session is forgotten after this long without a new window.
const SEEN_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

fn seen_memory(capacity: u64) -> Cache<String, ()> {
    Cache::builder()
        .max_capacity(capacity)
        .time_to_idle(SEEN_IDLE)
        .build()
}

struct Timer {
    token: u64,
    handle: TimerHandle,
}

impl Timer {
    fn cancel(&self) {
        self.handle.cancel();
    }
}

/// One open window and everything it collected.
struct HandlingState<C> {
    window: Window,
    pending: Vec<C>,
    last_session: Option<Session>,
    presence: Option<Arc<dyn Presence>>,
    completion: Option<Timer>,
    seen: Option<Timer>,
    typing: Option<Timer>,
    done: watch::Sender<bool>,
}

impl<C> HandlingState<C> {
    fn cancel_all(&mut self) {
        for timer in [
            self.completion.take(),
            self.seen.take(),
            self.typing.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.cancel();
        }
    }
}

#[derive(Clone, Copy)]
enum TimerKind {
    Seen,
    Typing,
}

struct Inner<C> {
    config: TimerConfig,
    scheduler: Arc<dyn Scheduler>,
    handlers: Arc<Handlers<C>>,
    store: Arc<dyn SessionStore>,
    errors: ErrorSink,
    registry: Mutex<HashMap<String, HandlingState<C>>>,
    seen_sessions: Cache<String, ()>,
    tokens: AtomicU64,
}

/// Resolves once the window a context joined has been handled, whether the
/// handler succeeded or not.
#[derive(Debug, Clone)]
pub struct Completion(watch::Receiver<bool>);

impl Completion {
    pub async fn wait(mut self) {
        // A dropped sender means the window was abandoned.
        let _ = self.0.wait_for(|done| *done).await;
    }
}

/// Collects text events per session into timed windows and hands each
/// window to the handler as one batch.
pub struct DebounceEngine<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for DebounceEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Context> DebounceEngine<C> {
    pub fn new(
        config: TimerConfig,
        scheduler: Arc<dyn Scheduler>,
        handlers: Arc<Handlers<C>>,
        store: Arc<dyn SessionStore>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                scheduler,
                handlers,
                store,
                errors,
                registry: Mutex::new(HashMap::new()),
                seen_sessions: seen_memory(SEEN_CAPACITY),
                tokens: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.inner.config
    }

    /// Add one delivery's `contexts` to the window of `session_id`, opening
    /// one if needed. The whole group counts as a single event for the
    /// window timing; the last context supplies presence and session.
    pub fn enqueue(&self, session_id: &str, contexts: Vec<C>) -> Completion {
        let inner = &self.inner;
        let Some(last) = contexts.last() else {
            return Completion(watch::channel(true).1);
        };
        let presence = last.presence();
        let last_session = last.session().cloned();
        let caps = presence
            .as_ref()
            .map(|p| PresenceCaps {
                seen: p.supports_seen(),
                typing: p.supports_typing(),
            })
            .unwrap_or(PresenceCaps::NONE);

        let seen_earlier = inner.seen_earlier(session_id);
        let Ok(mut registry) = inner.registry.lock() else {
            // Poisoned registry: nothing will ever fire.
            return Completion(watch::channel(true).1);
        };

        let now = Instant::now();
        let intents = match registry.get_mut(session_id) {
            Some(state) => state.window.on_event(&inner.config, now, caps, seen_earlier),
            None => {
                let (window, intents) = Window::open(&inner.config, now, caps, seen_earlier);
                let (done, _) = watch::channel(false);
                registry.insert(session_id.to_string(), HandlingState {
                    window,
                    pending: Vec::new(),
                    last_session: None,
                    presence: None,
                    completion: None,
                    seen: None,
                    typing: None,
                    done,
                });
                info!(
                    session_id,
                    mode = %inner.config.mode,
                    delay_ms = inner.config.initial_duration,
                    "debounce window opened"
                );
                #[cfg(feature = "metrics")]
                {
                    counter!(debounce_metrics::WINDOWS_OPENED_TOTAL, labels::MODE => inner.config.mode.to_string())
                        .increment(1);
                    gauge!(debounce_metrics::WINDOWS_OPEN).increment(1.0);
                }
                intents
            },
        };

        let Some(state) = registry.get_mut(session_id) else {
            return Completion(watch::channel(true).1);
        };
        if presence.is_some() {
            state.presence = presence;
        }
        state.last_session = last_session;
        state.pending.extend(contexts);
        debug!(session_id, pending = state.pending.len(), "contexts joined window");
        inner.apply(session_id, state, intents);

        Completion(state.done.subscribe())
    }

    /// Replace the snapshot the window will hand to its last context, if a
    /// window is open for `session_id`.
    pub fn update_last_session(&self, session_id: &str, session: Session) {
        if let Ok(mut registry) = self.inner.registry.lock()
            && let Some(state) = registry.get_mut(session_id)
        {
            state.last_session = Some(session);
        }
    }

    /// Session ids with an open window.
    pub fn open_windows(&self) -> Vec<String> {
        self.inner
            .registry
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Abandon every open window without handling it and forget seen
    /// sessions. Waiting completions resolve.
    pub fn shutdown(&self) {
        let abandoned: Vec<_> = match self.inner.registry.lock() {
            Ok(mut registry) => registry.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (session_id, mut state) in abandoned {
            state.cancel_all();
            warn!(
                session_id,
                pending = state.pending.len(),
                "abandoning open debounce window"
            );
            #[cfg(feature = "metrics")]
            gauge!(debounce_metrics::WINDOWS_OPEN).decrement(1.0);
            state.done.send_replace(true);
        }
        self.inner.seen_sessions.invalidate_all();
    }
}

impl<C: Context> Inner<C> {
    fn next_token(&self) -> u64 {
        self.tokens.fetch_add(1, Ordering::Relaxed)
    }

    fn seen_earlier(&self, session_id: &str) -> bool {
        self.seen_sessions.contains_key(session_id)
    }

    /// Carry out transition intents. Called with the registry locked.
    fn apply(
        self: &Arc<Self>,
        session_id: &str,
        state: &mut HandlingState<C>,
        intents: Vec<TimerIntent>,
    ) {
        for intent in intents {
            match intent {
                TimerIntent::ArmCompletion(delay) => {
                    if let Some(old) = state.completion.take() {
                        old.cancel();
                    }
                    let token = self.next_token();
                    let this = Arc::clone(self);
                    let id = session_id.to_string();
                    debug!(session_id, delay_ms = delay.as_millis() as u64, "completion armed");
                    let handle = self
                        .scheduler
                        .schedule(delay, Box::pin(async move { this.fire(&id, token).await }));
                    state.completion = Some(Timer { token, handle });
                },
                TimerIntent::ArmSeen(delay) => {
                    if let Some(old) = state.seen.take() {
                        old.cancel();
                    }
                    state.seen = Some(self.arm_presence(session_id, TimerKind::Seen, delay));
                },
                TimerIntent::ArmTyping(delay) => {
                    state.typing = Some(self.arm_presence(session_id, TimerKind::Typing, delay));
                },
                TimerIntent::CancelTyping => {
                    if let Some(old) = state.typing.take() {
                        old.cancel();
                    }
                },
                TimerIntent::MarkSeenNow => {
                    if let Some(presence) = state.presence.clone() {
                        self.signal(session_id, "seen", async move { presence.mark_seen().await });
                    }
                },
                TimerIntent::TypingOffNow => {
                    if let Some(presence) = state.presence.clone() {
                        self.signal(session_id, "typing_off", async move {
                            presence.typing_off().await
                        });
                    }
                },
            }
        }
    }

    fn arm_presence(self: &Arc<Self>, session_id: &str, kind: TimerKind, delay: Duration) -> Timer {
        let token = self.next_token();
        let this = Arc::clone(self);
        let id = session_id.to_string();
        let handle = self.scheduler.schedule(
            delay,
            Box::pin(async move { this.fire_presence(&id, kind, token).await }),
        );
        Timer { token, handle }
    }

    /// Send a presence signal without waiting for it.
    fn signal(
        &self,
        session_id: &str,
        what: &'static str,
        fut: impl Future<Output = anyhow::Result<()>> + Send + 'static,
    ) {
        let errors = self.errors.clone();
        let id = session_id.to_string();
        self.scheduler.schedule(
            Duration::ZERO,
            Box::pin(async move {
                debug!(session_id = %id, signal = what, "presence");
                if let Err(err) = fut.await {
                    errors.report(&err, Some(&id), Lane::Background);
                }
            }),
        );
    }

    async fn fire_presence(&self, session_id: &str, kind: TimerKind, token: u64) {
        let presence = {
            let Ok(mut registry) = self.registry.lock() else {
                return;
            };
            let Some(state) = registry.get_mut(session_id) else {
                return;
            };
            let current = match kind {
                TimerKind::Seen => &state.seen,
                TimerKind::Typing => &state.typing,
            };
            if current.as_ref().map(|t| t.token) != Some(token) {
                return;
            }
            match kind {
                TimerKind::Seen => {
                    state.seen = None;
                    state.window.mark_seen();
                },
                TimerKind::Typing => {
                    state.typing = None;
                    state.window.mark_typing_on();
                },
            }
            state.presence.clone()
        };

        let Some(presence) = presence else {
            return;
        };
        let (what, result) = match kind {
            TimerKind::Seen => ("seen", presence.mark_seen().await),
            TimerKind::Typing => ("typing_on", presence.typing_on().await),
        };
        debug!(session_id, signal = what, "presence");
        if let Err(err) = result {
            self.errors.report(&err, Some(session_id), Lane::Background);
        }
    }

    /// The completion timer fired: hand the whole window to the handler.
    async fn fire(&self, session_id: &str, token: u64) {
        let state = {
            let Ok(mut registry) = self.registry.lock() else {
                return;
            };
            match registry.get(session_id) {
                Some(state) if state.completion.as_ref().map(|t| t.token) == Some(token) => {},
                _ => return,
            }
            registry.remove(session_id)
        };
        let Some(mut state) = state else {
            return;
        };

        #[cfg(feature = "metrics")]
        {
            gauge!(debounce_metrics::WINDOWS_OPEN).decrement(1.0);
            histogram!(debounce_metrics::BATCH_SIZE).record(state.pending.len() as f64);
        }

        // The completion timer is the task running this; only the others
        // need cancelling.
        state.completion = None;
        state.cancel_all();

        if state.window.marked_seen() && self.config.seen_always_after_first {
            self.seen_sessions.insert(session_id.to_string(), ());
        }

        let pending = std::mem::take(&mut state.pending);
        info!(session_id, contexts = pending.len(), "debounce window closed");

        if let Some(mut batch) = Batch::batched(pending) {
            if let Some(session) = state.last_session.take() {
                batch.last_mut().replace_session(session);
            }
            match self.handlers.invoke(&mut batch, Lane::Batched).await {
                Ok(()) => {
                    if state.window.typing_on()
                        && let Some(presence) = &state.presence
                        && let Err(err) = presence.typing_off().await
                    {
                        self.errors.report(&err, Some(session_id), Lane::Background);
                    }
                    if let Err(err) = self.persist(&mut batch).await {
                        self.errors
                            .report(&anyhow::Error::from(err), Some(session_id), Lane::Batched);
                    }
                },
                Err(err) => self.errors.report(&err, Some(session_id), Lane::Batched),
            }
        }

        state.done.send_replace(true);
    }

    async fn persist(&self, batch: &mut Batch<C>) -> parley_sessions::Result<()> {
        let last = batch.last_mut();
        last.set_session_written(true);
        let Some(session) = last.session_mut() else {
            return Ok(());
        };
        session.touch();
        let Some(key) = session.id().map(str::to_string) else {
            return Ok(());
        };
        self.store.write(&key, session).await
    }
}
