//! The bot: builder, handler registration and per-request orchestration.

use std::sync::{Arc, Mutex, OnceLock};

use {
    futures::{StreamExt, TryStreamExt, future::join_all},
    parley_channels::{Connector, Context, ContextParams, Event},
    parley_common::{RequestContext, Response},
    parley_config::TimerConfig,
    parley_sessions::{MemorySessionStore, Session, SessionStore, session_id},
    serde_json::{Map, Value},
    tokio::sync::OnceCell,
    tokio_util::task::TaskTracker,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, labels, session as session_metrics};

use crate::{
    Error, Result,
    action::ActionRef,
    batch::Batch,
    debounce::{DebounceEngine, Scheduler, TokioScheduler},
    error_sink::{ErrorSink, Lane},
    grouper,
    handlers::{Handlers, Plugin},
    keys::camelcase_keys_deep,
};

/// Contexts built concurrently per request.
const CONTEXT_CONCURRENCY: usize = 5;

/// Called with every converted request body before events are mapped.
pub type RequestObserver = Arc<dyn Fn(&Value, Option<&RequestContext>) + Send + Sync>;

struct Shared<K: Connector> {
    connector: K,
    store: Arc<dyn SessionStore>,
    store_ready: OnceCell<()>,
    sync: bool,
    on_request: Option<RequestObserver>,
    timer: TimerConfig,
    initial_state: Map<String, Value>,
    scheduler: Arc<dyn Scheduler>,
    errors: ErrorSink,
    tracker: TaskTracker,
    engines: Mutex<Vec<DebounceEngine<K::Context>>>,
}

pub struct BotBuilder<K: Connector> {
    connector: K,
    session_store: Option<Arc<dyn SessionStore>>,
    sync: bool,
    on_request: Option<RequestObserver>,
    timer: TimerConfig,
    initial_state: Map<String, Value>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<K: Connector> BotBuilder<K> {
    /// Defaults to an in-memory store.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Wait for handlers and return the first context's response.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn on_request(
        mut self,
        observer: impl Fn(&Value, Option<&RequestContext>) + Send + Sync + 'static,
    ) -> Self {
        self.on_request = Some(Arc::new(observer));
        self
    }

    pub fn timer_config(mut self, timer: TimerConfig) -> Self {
        self.timer = timer;
        self
    }

    /// State a conversation starts with.
    pub fn initial_state(mut self, state: Map<String, Value>) -> Self {
        self.initial_state = state;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Bot<K> {
        Bot {
            shared: Arc::new(Shared {
                connector: self.connector,
                store: self
                    .session_store
                    .unwrap_or_else(|| Arc::new(MemorySessionStore::default())),
                store_ready: OnceCell::new(),
                sync: self.sync,
                on_request: self.on_request,
                timer: self.timer,
                initial_state: self.initial_state,
                scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
                errors: ErrorSink::new(),
                tracker: TaskTracker::new(),
                engines: Mutex::new(Vec::new()),
            }),
            on_event: None,
            on_error: None,
            plugins: Vec::new(),
            handler: OnceLock::new(),
        }
    }
}

/// A chat bot for one platform connector.
pub struct Bot<K: Connector> {
    shared: Arc<Shared<K>>,
    on_event: Option<ActionRef<K::Context>>,
    on_error: Option<ActionRef<K::Context>>,
    plugins: Vec<Arc<dyn Plugin<K::Context>>>,
    handler: OnceLock<RequestHandler<K>>,
}

impl<K: Connector> Bot<K> {
    pub fn builder(connector: K) -> BotBuilder<K> {
        BotBuilder {
            connector,
            session_store: None,
            sync: false,
            on_request: None,
            timer: TimerConfig::default(),
            initial_state: Map::new(),
            scheduler: None,
        }
    }

    pub fn on_event(&mut self, action: ActionRef<K::Context>) -> &mut Self {
        self.on_event = Some(action);
        self.handler = OnceLock::new();
        self
    }

    /// Runs when the event handler fails, with the failure in `props.error`.
    pub fn on_error(&mut self, action: ActionRef<K::Context>) -> &mut Self {
        self.on_error = Some(action);
        self.handler = OnceLock::new();
        self
    }

    pub fn use_plugin(&mut self, plugin: impl Plugin<K::Context> + 'static) -> &mut Self {
        self.plugins.push(Arc::new(plugin));
        self.handler = OnceLock::new();
        self
    }

    pub fn connector(&self) -> &K {
        &self.shared.connector
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.shared.store)
    }

    /// Failures that have no caller to return to end up here.
    pub fn error_sink(&self) -> &ErrorSink {
        &self.shared.errors
    }

    /// The entry point for webhook bodies. Fails when no event handler is
    /// registered.
    pub fn request_handler(&self) -> Result<RequestHandler<K>> {
        if let Some(handler) = self.handler.get() {
            return Ok(handler.clone());
        }
        let on_event = self.on_event.clone().ok_or(Error::MissingHandler)?;
        let handlers = Arc::new(Handlers {
            on_event,
            on_error: self.on_error.clone(),
        });
        let engine = DebounceEngine::new(
            self.shared.timer.clone(),
            Arc::clone(&self.shared.scheduler),
            Arc::clone(&handlers),
            Arc::clone(&self.shared.store),
            self.shared.errors.clone(),
        );
        if let Ok(mut engines) = self.shared.engines.lock() {
            engines.push(engine.clone());
        }
        let handler = RequestHandler {
            shared: Arc::clone(&self.shared),
            dispatch: Arc::new(Dispatch {
                handlers,
                plugins: self.plugins.clone(),
                engine,
            }),
        };
        let _ = self.handler.set(handler.clone());
        Ok(handler)
    }

    /// Abandon open debounce windows and wait for background work.
    pub async fn shutdown(&self) {
        let engines = self
            .shared
            .engines
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default();
        for engine in engines {
            engine.shutdown();
        }
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        info!(platform = self.shared.connector.platform(), "bot shut down");
    }
}

struct Dispatch<C> {
    handlers: Arc<Handlers<C>>,
    plugins: Vec<Arc<dyn Plugin<C>>>,
    engine: DebounceEngine<C>,
}

/// Cloneable handle that processes webhook bodies for a [`Bot`].
pub struct RequestHandler<K: Connector> {
    shared: Arc<Shared<K>>,
    dispatch: Arc<Dispatch<K::Context>>,
}

impl<K: Connector> Clone for RequestHandler<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<K: Connector> RequestHandler<K> {
    pub fn connector(&self) -> &K {
        &self.shared.connector
    }

    pub fn is_sync(&self) -> bool {
        self.shared.sync
    }

    /// Session ids with an open debounce window.
    pub fn open_windows(&self) -> Vec<String> {
        self.dispatch.engine.open_windows()
    }

    /// Process one webhook body.
    ///
    /// In sync mode the first context's response is returned once every
    /// handler, including debounced ones, has finished. In async mode work
    /// continues in the background and `None` comes back at once.
    pub async fn handle(
        &self,
        body: Value,
        request: Option<RequestContext>,
    ) -> Result<Option<Response>> {
        if body.is_null() {
            return Err(Error::MissingBody);
        }
        let shared = &self.shared;
        let platform = shared.connector.platform();

        shared
            .store_ready
            .get_or_try_init(|| shared.store.init())
            .await?;

        let body = camelcase_keys_deep(body);
        if let Some(observer) = &shared.on_request {
            observer(&body, request.as_ref());
        }

        let events = shared.connector.map_request_to_events(&body)?;
        debug!(platform, events = events.len(), "mapped request");

        #[cfg(feature = "metrics")]
        {
            counter!(dispatch_metrics::REQUESTS_TOTAL, labels::PLATFORM => platform.to_string())
                .increment(1);
            counter!(dispatch_metrics::EVENTS_TOTAL, labels::PLATFORM => platform.to_string())
                .increment(events.len() as u64);
        }

        let mut contexts: Vec<K::Context> = futures::stream::iter(events)
            .map(|event| self.build_context(&body, event, request.as_ref()))
            .buffered(CONTEXT_CONCURRENCY)
            .try_collect()
            .await?;

        let plugins = &self.dispatch.plugins;
        if !plugins.is_empty() {
            futures::future::try_join_all(contexts.iter_mut().map(|context| async move {
                for plugin in plugins {
                    plugin.apply(context).await?;
                }
                anyhow::Ok(())
            }))
            .await?;
        }

        let first_response = contexts.first().map(Context::response);
        let groups = grouper::group(contexts, shared.timer.enabled);

        let mut completions = Vec::with_capacity(groups.waiting.len());
        for (id, waiting) in groups.waiting {
            if let Some(session) = waiting.last().and_then(|c| c.session()).cloned() {
                self.write_in_background(id.clone(), session);
            }
            completions.push(self.dispatch.engine.enqueue(&id, waiting));
        }

        let lanes = ImmediateLanes {
            dispatch: Arc::clone(&self.dispatch),
            store: Arc::clone(&shared.store),
            errors: shared.errors.clone(),
            keyed: groups.run_now,
            unkeyed: groups.unkeyed,
        };

        if !shared.sync {
            shared.tracker.spawn(async move {
                lanes.run().await;
            });
            return Ok(None);
        }

        if !lanes.run().await {
            return Ok(None);
        }
        for completion in completions {
            completion.wait().await;
        }
        Ok(first_response.and_then(|slot| slot.get()))
    }

    async fn build_context(
        &self,
        body: &Value,
        event: Event,
        request: Option<&RequestContext>,
    ) -> Result<K::Context> {
        let shared = &self.shared;
        let connector = &shared.connector;
        let platform = connector.platform();

        let session = match connector.unique_session_key(body, &event, request).await? {
            Some(key) => {
                let id = session_id(platform, &key);
                let mut session = match shared.store.read(&id).await? {
                    Some(session) => session,
                    None => {
                        debug!(session_id = %id, "new session");
                        #[cfg(feature = "metrics")]
                        counter!(session_metrics::CREATED_TOTAL, labels::PLATFORM => platform.to_string())
                            .increment(1);
                        Session::new()
                    },
                };
                session.ensure_identity(platform, &key);
                connector.update_session(&mut session, body, &event).await?;
                Some(session)
            },
            None => None,
        };

        Ok(connector.create_context(ContextParams {
            event,
            session,
            initial_state: shared.initial_state.clone(),
            request: request.cloned(),
        }))
    }

    /// Record activity for a session whose events wait in a window.
    fn write_in_background(&self, id: String, session: Session) {
        let store = Arc::clone(&self.shared.store);
        let errors = self.shared.errors.clone();
        self.shared.tracker.spawn(async move {
            if let Err(err) = store.write(&id, &session).await {
                errors.report(&anyhow::Error::from(err), Some(&id), Lane::Background);
            }
        });
    }
}

/// Contexts handled right away: one sequential chain per session id, all
/// chains concurrent.
struct ImmediateLanes<C> {
    dispatch: Arc<Dispatch<C>>,
    store: Arc<dyn SessionStore>,
    errors: ErrorSink,
    keyed: Vec<(String, Vec<C>)>,
    unkeyed: Vec<C>,
}

impl<C: Context> ImmediateLanes<C> {
    /// `false` when any chain failed. Failures go to the error sink.
    async fn run(self) -> bool {
        let Self {
            dispatch,
            store,
            errors,
            keyed,
            unkeyed,
        } = self;

        let mut chains: Vec<(Option<String>, Vec<C>)> = keyed
            .into_iter()
            .map(|(id, contexts)| (Some(id), contexts))
            .collect();
        if !unkeyed.is_empty() {
            chains.push((None, unkeyed));
        }

        let results = join_all(chains.into_iter().map(|(id, contexts)| {
            let dispatch = Arc::clone(&dispatch);
            let store = Arc::clone(&store);
            async move {
                let result = run_chain(&dispatch, store.as_ref(), id.as_deref(), contexts).await;
                (id, result)
            }
        }))
        .await;

        let mut ok = true;
        for (id, result) in results {
            if let Err(err) = result {
                errors.report(&err, id.as_deref(), Lane::Immediate);
                ok = false;
            }
        }
        ok
    }
}

/// Handle `contexts` one after another, each starting from the session the
/// previous handler left, then persist the final session. Nothing is
/// written when a handler fails.
async fn run_chain<C: Context>(
    dispatch: &Dispatch<C>,
    store: &dyn SessionStore,
    session_id: Option<&str>,
    contexts: Vec<C>,
) -> anyhow::Result<()> {
    let mut previous: Option<C> = None;

    for mut context in contexts {
        if let Some(prev) = previous.as_mut()
            && let Some(session) = prev.take_session()
        {
            context.replace_session(session);
        }
        let mut batch = Batch::single(context);
        dispatch
            .handlers
            .invoke(&mut batch, Lane::Immediate)
            .await?;
        previous = Some(batch.into_first());
    }

    if let (Some(id), Some(mut last)) = (session_id, previous) {
        last.set_session_written(true);
        if let Some(session) = last.session_mut() {
            session.touch();
            store.write(id, session).await?;
            dispatch.engine.update_last_session(id, session.clone());
        }
    }
    Ok(())
}
