//! # sip2gate
//!
//! Protocol gateway core bridging structured request/response calls to
//! legacy Library Management Systems speaking SIP2 — a fixed-position,
//! pipe-delimited, checksum-framed ASCII protocol over persistent TCP or
//! TLS sockets.
//!
//! One gateway instance fronts one or more LMS *branches*, each addressed
//! by a stable branch id. The crate provides:
//!
//! - the SIP2 codec: framing, sanitization, checksum and sequence handling,
//!   request formatting, and response parsing with unknown-tag passthrough
//!   ([`protocol`]);
//! - a per-branch client owning one socket, with frame reassembly, a
//!   sequence-keyed pending table, and per-request timeouts
//!   ([`transport::client`]);
//! - a connection manager serializing operations per branch behind a
//!   circuit breaker with exponential backoff ([`transport::manager`]);
//! - deterministic HMAC masking of patron/item identifiers and an event bus
//!   that delivers masked transaction records and redacted dashboard lines
//!   without ever blocking the protocol path ([`masking`], [`events`]).
//!
//! HTTP routing, dashboards, configuration persistence, and log rotation
//! are external collaborators: they feed [`transport::ConnectionManager`]
//! and consume its typed records and events.
//!
//! ```no_run
//! use sip2gate::config::{BranchConfig, GatewayConfig};
//! use sip2gate::events::EventBus;
//! use sip2gate::masking::MaskingService;
//! use sip2gate::transport::ConnectionManager;
//! use sip2gate::transport::manager::PatronStatusParams;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let masking = MaskingService::from_env()?;
//! let events = EventBus::new(masking.clone());
//! let manager = ConnectionManager::new(
//!     GatewayConfig {
//!         branches: vec![BranchConfig {
//!             id: "main".into(),
//!             host: "lms.example.org".into(),
//!             port: 6001,
//!             timeout_ms: 10_000,
//!             institution_id: "MAIN".into(),
//!             tls: false,
//!             tls_verify: true,
//!             credentials: None,
//!             profile: None,
//!         }],
//!         location_code: "SC".into(),
//!     },
//!     masking,
//!     events,
//! )?;
//!
//! let record = manager
//!     .patron_status("main", PatronStatusParams {
//!         patron_barcode: "P12345".into(),
//!         language: None,
//!     })
//!     .await?;
//! println!("valid: {}", record.valid_patron);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod masking;
pub mod protocol;
pub mod transport;

pub use config::{BranchConfig, GatewayConfig};
pub use error::{GatewayError, ProtocolError};
pub use events::{DashboardEvent, DashboardLevel, EventBus};
pub use masking::MaskingService;
pub use transport::{ConnectionManager, SipClient};
