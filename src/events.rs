//! In-process event fan-out.
//!
//! Two channels decouple the protocol engine from its observers: the
//! transaction channel carries masked operation records for the secure
//! transaction log, and the dashboard channel carries leveled log lines for
//! the live dashboard. Both are `tokio::sync::broadcast` channels — bounded,
//! order-preserving per sender, and lossy for receivers that fall behind
//! (oldest events are dropped first), so a stuck subscriber can never stall
//! a SIP2 operation.
//!
//! Raw SIP2 frames routinely appear in dashboard details. Before an event is
//! forwarded, every string-valued `raw` or `message` field has its sensitive
//! tag runs redacted: credentials (`CN`, `CO`, `AD`) become asterisks, and
//! identifiers (`AA`, `AE`, `AB`) become their deterministic mask when a
//! master key is available. The caller's value is cloned first and never
//! mutated.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::masking::MaskingService;

/// Broadcast capacity of each channel. Receivers that lag beyond this lose
/// the oldest events.
const CHANNEL_CAPACITY: usize = 256;

/// Credential tag runs are flattened unconditionally.
static SECRET_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(CN|CO|AD)[^|]*").expect("secret tag regex"));

/// Identifier tag runs are replaced with their deterministic mask.
static IDENTIFIER_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(AA|AE|AB)([^|]*)").expect("identifier tag regex"));

/// Severity of a dashboard line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line on the dashboard stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEvent {
    /// RFC 3339 UTC emission time
    pub timestamp: String,
    /// Severity
    pub level: DashboardLevel,
    /// Short human-readable message
    pub message: String,
    /// Structured context, already redacted
    pub details: Value,
}

/// The gateway's in-process event bus.
///
/// Constructed once per process via [`EventBus::new`], which also spawns the
/// forwarder that mirrors every transaction event onto the dashboard stream
/// tagged `SIP2 Transaction`.
#[derive(Debug)]
pub struct EventBus {
    transactions: broadcast::Sender<Value>,
    dashboard: broadcast::Sender<DashboardEvent>,
    masking: MaskingService,
}

impl EventBus {
    /// Creates the bus and spawns the transaction→dashboard forwarder.
    ///
    /// The masking service is used only for dashboard redaction; without a
    /// key, identifier tags fall back to asterisks.
    #[must_use]
    pub fn new(masking: MaskingService) -> Arc<Self> {
        let (transactions, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (dashboard, _) = broadcast::channel(CHANNEL_CAPACITY);
        let bus = Arc::new(Self {
            transactions,
            dashboard,
            masking,
        });

        let forwarder = bus.clone();
        let mut rx = forwarder.transactions.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        forwarder.log_to_dashboard(
                            DashboardLevel::Info,
                            "SIP2 Transaction",
                            payload,
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "dashboard forwarder lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        bus
    }

    /// Publishes a (pre-masked) transaction record.
    ///
    /// Delivery is asynchronous: subscribers observe the event on their next
    /// poll, in emission order. Absence of subscribers is not an error.
    pub fn emit_log(&self, payload: Value) {
        let _ = self.transactions.send(payload);
    }

    /// Publishes a dashboard line after redacting its details.
    pub fn log_to_dashboard(&self, level: DashboardLevel, message: &str, details: Value) {
        let event = DashboardEvent {
            timestamp: Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            details: self.redact_details(details),
        };
        let _ = self.dashboard.send(event);
    }

    /// Subscribes to masked transaction records.
    #[must_use]
    pub fn subscribe_transactions(&self) -> broadcast::Receiver<Value> {
        self.transactions.subscribe()
    }

    /// Subscribes to dashboard lines.
    #[must_use]
    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardEvent> {
        self.dashboard.subscribe()
    }

    /// Walks a details value and redacts SIP2 tag runs inside every
    /// string-valued `raw` or `message` field. Operates on an owned clone of
    /// the caller's data.
    fn redact_details(&self, mut details: Value) -> Value {
        self.redact_in_place(&mut details, 0);
        details
    }

    fn redact_in_place(&self, value: &mut Value, depth: usize) {
        if depth > 64 {
            return;
        }
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if key == "raw" || key == "message" {
                        let redacted = entry.as_str().map(|s| self.redact_frame_text(s));
                        match redacted {
                            Some(text) => *entry = Value::String(text),
                            None => self.redact_in_place(entry, depth + 1),
                        }
                    } else {
                        self.redact_in_place(entry, depth + 1);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.redact_in_place(item, depth + 1);
                }
            }
            _ => {}
        }
    }

    /// Redacts sensitive SIP2 tag runs within a single string.
    fn redact_frame_text(&self, text: &str) -> String {
        let step1 = SECRET_TAG_RE.replace_all(text, "$1********");
        IDENTIFIER_TAG_RE
            .replace_all(&step1, |caps: &Captures<'_>| {
                let tag = &caps[1];
                match self.masking.mask(&caps[2]) {
                    Ok(masked) => format!("{tag}{masked}"),
                    Err(_) => format!("{tag}********"),
                }
            })
            .into_owned()
    }
}
