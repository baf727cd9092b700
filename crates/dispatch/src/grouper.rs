use std::collections::HashMap;

use parley_channels::Context;

/// Contexts of one delivery, split by lane.
pub struct Groups<C> {
    /// Session id → contexts to handle now, in arrival order.
    pub run_now: Vec<(String, Vec<C>)>,
    /// Session id → text contexts for the debounce window.
    pub waiting: Vec<(String, Vec<C>)>,
    /// Contexts that belong to no session.
    pub unkeyed: Vec<C>,
}

impl<C> Default for Groups<C> {
    fn default() -> Self {
        Self {
            run_now: Vec::new(),
            waiting: Vec::new(),
            unkeyed: Vec::new(),
        }
    }
}

fn push_keyed<C>(
    groups: &mut Vec<(String, Vec<C>)>,
    index: &mut HashMap<String, usize>,
    key: &str,
    context: C,
) {
    match index.get(key) {
        Some(&i) => groups[i].1.push(context),
        None => {
            index.insert(key.to_string(), groups.len());
            groups.push((key.to_string(), vec![context]));
        },
    }
}

/// Split `contexts` into lanes. Text messages wait in a debounce window only
/// when `batching` is on; keys keep the order they first appeared in.
pub fn group<C: Context>(contexts: Vec<C>, batching: bool) -> Groups<C> {
    let mut groups = Groups::default();
    let mut run_now_index = HashMap::new();
    let mut waiting_index = HashMap::new();

    for context in contexts {
        let Some(session_id) = context.session_id().map(str::to_string) else {
            groups.unkeyed.push(context);
            continue;
        };
        if batching && context.event().is_text() {
            push_keyed(&mut groups.waiting, &mut waiting_index, &session_id, context);
        } else {
            push_keyed(&mut groups.run_now, &mut run_now_index, &session_id, context);
        }
    }
    groups
}
