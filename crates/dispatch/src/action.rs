//! Handler actions and the trampoline that resolves them.
//!
//! An action either finishes, yields a value, or names the next action to
//! run. [`run`] keeps invoking until something other than `Next` comes back,
//! so arbitrarily long chains never grow the stack.

use std::sync::Arc;

use {
    async_trait::async_trait,
    futures::future::BoxFuture,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::batch::Batch;

pub type ActionRef<C> = Arc<dyn Action<C>>;

/// What an action hands back to the trampoline.
pub enum Step<C> {
    Done,
    Value(Value),
    Next(ActionRef<C>),
}

/// Arguments passed alongside the contexts.
pub struct Props<C> {
    /// Rest of the chain, set by [`chain`].
    pub next: Option<ActionRef<C>>,
    /// The failure an error handler is recovering from.
    pub error: Option<Arc<anyhow::Error>>,
    pub values: Map<String, Value>,
}

impl<C> Default for Props<C> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            values: Map::new(),
        }
    }
}

impl<C> Clone for Props<C> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            error: self.error.clone(),
            values: self.values.clone(),
        }
    }
}

impl<C> Props<C> {
    pub fn with_error(error: anyhow::Error) -> Self {
        Self {
            error: Some(Arc::new(error)),
            ..Self::default()
        }
    }

    pub fn value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// `self` overrides `base`.
    fn merged_over(&self, base: Props<C>) -> Self {
        let mut values = base.values;
        values.extend(self.values.clone());
        Self {
            next: self.next.clone().or(base.next),
            error: self.error.clone().or(base.error),
            values,
        }
    }
}

#[async_trait]
pub trait Action<C>: Send + Sync {
    fn name(&self) -> &str {
        "action"
    }

    async fn call(&self, batch: &mut Batch<C>, props: Props<C>) -> anyhow::Result<Step<C>>;
}

/// Run `action` and every action it hands back.
///
/// Only the entry action receives `props`; continuations start empty.
pub async fn run<C: Send + 'static>(
    action: ActionRef<C>,
    batch: &mut Batch<C>,
    props: Props<C>,
) -> anyhow::Result<Option<Value>> {
    let mut current = action;
    let mut props = props;
    loop {
        debug!(action = current.name(), contexts = batch.len(), "running action");
        match current.call(batch, props).await? {
            Step::Done => return Ok(None),
            Step::Value(value) => return Ok(Some(value)),
            Step::Next(next) => {
                current = next;
                props = Props::default();
            },
        }
    }
}

type ActionFn<C> = dyn for<'a> Fn(&'a mut Batch<C>, Props<C>) -> BoxFuture<'a, anyhow::Result<Step<C>>>
    + Send
    + Sync;

struct FnAction<C> {
    name: String,
    f: Box<ActionFn<C>>,
}

#[async_trait]
impl<C: Send + 'static> Action<C> for FnAction<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, batch: &mut Batch<C>, props: Props<C>) -> anyhow::Result<Step<C>> {
        (self.f)(batch, props).await
    }
}

/// Wrap a closure as an action.
///
/// ```ignore
/// let echo = fn_action("echo", |batch: &mut Batch<ConsoleContext>, _props| {
///     Box::pin(async move {
///         let text = batch.last().event().text.clone().unwrap_or_default();
///         batch.last_mut().send_text(text);
///         Ok(Step::Done)
///     })
/// });
/// ```
pub fn fn_action<C, F>(name: impl Into<String>, f: F) -> ActionRef<C>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut Batch<C>, Props<C>) -> BoxFuture<'a, anyhow::Result<Step<C>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnAction {
        name: name.into(),
        f: Box::new(f),
    })
}

struct WithProps<C> {
    action: ActionRef<C>,
    props: Props<C>,
}

#[async_trait]
impl<C: Send + 'static> Action<C> for WithProps<C> {
    fn name(&self) -> &str {
        self.action.name()
    }

    async fn call(&self, batch: &mut Batch<C>, props: Props<C>) -> anyhow::Result<Step<C>> {
        self.action.call(batch, self.props.merged_over(props)).await
    }
}

/// Bind `props` to `action`; they win over props supplied at call time.
pub fn with_props<C: Send + 'static>(action: ActionRef<C>, props: Props<C>) -> ActionRef<C> {
    Arc::new(WithProps { action, props })
}

struct Chain<C> {
    actions: Vec<ActionRef<C>>,
}

#[async_trait]
impl<C: Send + 'static> Action<C> for Chain<C> {
    fn name(&self) -> &str {
        "chain"
    }

    async fn call(&self, _batch: &mut Batch<C>, props: Props<C>) -> anyhow::Result<Step<C>> {
        let mut next = props.next.clone();
        for action in self.actions.iter().rev() {
            let bound = Props {
                next,
                ..props.clone()
            };
            next = Some(with_props(Arc::clone(action), bound));
        }
        Ok(next.map_or(Step::Done, Step::Next))
    }
}

/// Compose actions: each receives the rest of the chain as `props.next` and
/// decides whether to continue by returning it.
pub fn chain<C: Send + 'static>(actions: Vec<ActionRef<C>>) -> ActionRef<C> {
    Arc::new(Chain { actions })
}
