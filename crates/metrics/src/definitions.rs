//! Metric name and label definitions.
//!
//! This module defines all metric names and common label keys used throughout parley.
//! Centralizing these definitions ensures consistency and makes it easier to document
//! what metrics are available.

/// HTTP webhook server metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "parley_http_requests_total";
    /// HTTP request duration in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "parley_http_request_duration_seconds";
    /// Number of HTTP requests currently being processed
    pub const REQUESTS_IN_FLIGHT: &str = "parley_http_requests_in_flight";
}

/// Request orchestration metrics
pub mod dispatch {
    /// Total number of webhook deliveries handled
    pub const REQUESTS_TOTAL: &str = "parley_dispatch_requests_total";
    /// Total number of events mapped from deliveries
    pub const EVENTS_TOTAL: &str = "parley_dispatch_events_total";
    /// Total number of handler invocations (immediate and batched)
    pub const HANDLER_RUNS_TOTAL: &str = "parley_dispatch_handler_runs_total";
    /// Total number of handler invocations that ended in an unrecovered error
    pub const HANDLER_ERRORS_TOTAL: &str = "parley_dispatch_handler_errors_total";
    /// Handler invocation duration in seconds
    pub const HANDLER_DURATION_SECONDS: &str = "parley_dispatch_handler_duration_seconds";
}

/// Debounce window metrics
pub mod debounce {
    /// Total number of debounce windows opened
    pub const WINDOWS_OPENED_TOTAL: &str = "parley_debounce_windows_opened_total";
    /// Number of currently open windows
    pub const WINDOWS_OPEN: &str = "parley_debounce_windows_open";
    /// Number of contexts delivered per batched handler call
    pub const BATCH_SIZE: &str = "parley_debounce_batch_size";
}

/// Session store metrics
pub mod session {
    /// Total number of session reads
    pub const READS_TOTAL: &str = "parley_session_reads_total";
    /// Total number of session writes
    pub const WRITES_TOTAL: &str = "parley_session_writes_total";
    /// Total number of sessions created on first contact
    pub const CREATED_TOTAL: &str = "parley_session_created_total";
}

/// Common label keys
pub mod labels {
    pub const PLATFORM: &str = "platform";
    pub const LANE: &str = "lane";
    pub const DRIVER: &str = "driver";
    pub const MODE: &str = "mode";
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
}
