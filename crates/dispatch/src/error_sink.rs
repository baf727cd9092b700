use std::sync::{Arc, RwLock};

use tracing::error;

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Handled right away, one context at a time.
    Immediate,
    /// Delivered by a closing debounce window.
    Batched,
    /// Bookkeeping outside a handler (session writes, plugins).
    Background,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Batched => "batched",
            Self::Background => "background",
        }
    }
}

/// One reported failure.
#[derive(Debug)]
pub struct ErrorReport<'a> {
    pub error: &'a anyhow::Error,
    pub session_id: Option<&'a str>,
    pub lane: Lane,
}

type Listener = Arc<dyn Fn(&ErrorReport<'_>) + Send + Sync>;

/// Bot-owned destination for failures that have no caller to return to.
///
/// Without listeners, reports are logged.
#[derive(Clone, Default)]
pub struct ErrorSink {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&ErrorReport<'_>) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(Arc::new(listener));
        }
    }

    pub fn report(&self, err: &anyhow::Error, session_id: Option<&str>, lane: Lane) {
        let listeners = self
            .listeners
            .read()
            .map(|l| l.clone())
            .unwrap_or_default();
        if listeners.is_empty() {
            error!(session_id, lane = lane.as_str(), error = %err, "unhandled dispatch error");
            return;
        }
        let report = ErrorReport {
            error: err,
            session_id,
            lane,
        };
        for listener in &listeners {
            listener(&report);
        }
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.listeners.read().map(|l| l.len()).unwrap_or_default();
        f.debug_struct("ErrorSink")
            .field("listeners", &count)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::sync::Mutex};

    #[test]
    fn listeners_receive_reports() {
        let sink = ErrorSink::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            sink.subscribe(move |report| {
                seen.lock().unwrap().push((
                    report.error.to_string(),
                    report.session_id.map(str::to_string),
                    report.lane,
                ));
            });
        }

        sink.report(
            &anyhow::anyhow!("boom"),
            Some("console:1"),
            Lane::Batched,
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("boom".into(), Some("console:1".into()), Lane::Batched)]
        );
    }

    #[test]
    fn reporting_without_listeners_does_not_panic() {
        ErrorSink::new().report(&anyhow::anyhow!("lost"), None, Lane::Immediate);
    }
}
