use serde::Serialize;

/// Structured trace events emitted across all adb crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RequestCompleted {
        method: String,
        endpoint: String,
        host: String,
        status: u16,
        attempts: usize,
        duration_ms: u64,
    },
    HostFailover {
        host: String,
        attempt: usize,
        reason: String,
    },
    TokenRefreshed {
        generation: u64,
    },
    CursorFetched {
        cursor_id: String,
        batch_len: usize,
        has_more: bool,
    },
    CursorClosed {
        cursor_id: String,
        released: bool,
    },
    JobSubmitted {
        job_id: String,
    },
    JobFinished {
        job_id: String,
        status: u16,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "adb_event");
    }
}
