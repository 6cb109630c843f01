//! Per-branch SIP2 client.
//!
//! One client owns one socket to one LMS endpoint. The write path runs under
//! the caller's task; a spawned reader task owns the read half, reassembles
//! `\r`-terminated frames out of the byte stream (interpreted as ISO-8859-1,
//! which is lossless per byte), and completes the matching pending request.
//!
//! Requests and responses are correlated by the single-digit SIP2 sequence
//! number, so at most ten requests can ever be outstanding. The connection
//! manager serializes operations per branch, which keeps the pending table
//! effectively single-writer in steady state; the table still tolerates
//! concurrent use because direct clients (tests, tools) may pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, error, warn};

use crate::config::BranchConfig;
use crate::error::GatewayError;
use crate::events::{DashboardLevel, EventBus};
use crate::protocol::formatter::{self, HoldMode, PatronInfoSummary, SecurityMarker};
use crate::protocol::records::{
    AcsStatusRecord, CheckinRecord, CheckoutRecord, EndSessionRecord, FeePaidRecord, HoldRecord,
    ItemInfoRecord, ItemStatusUpdateRecord, PatronInfoRecord, PatronStatusRecord, RenewAllRecord,
};
use crate::protocol::sanitize::to_ascii;
use crate::protocol::{checksum, parser};

/// Immutable connection settings, snapshotted from the branch configuration
/// when the client is created.
#[derive(Debug, Clone)]
pub struct SipClientConfig {
    /// Branch id, for logs and dashboard events.
    pub branch_id: String,
    /// LMS host.
    pub host: String,
    /// LMS port.
    pub port: u16,
    /// Connect and per-request timeout.
    pub timeout: std::time::Duration,
    /// Institution id sent as `AO`.
    pub institution_id: String,
    /// Wrap the socket in TLS.
    pub tls: bool,
    /// Strict certificate validation.
    pub tls_verify: bool,
    /// Reject inbound frames that fail checksum verification.
    pub checksum_required: bool,
}

impl SipClientConfig {
    /// Builds a client config from a branch configuration.
    #[must_use]
    pub fn from_branch(branch: &BranchConfig) -> Self {
        Self {
            branch_id: branch.id.clone(),
            host: branch.host.clone(),
            port: branch.port,
            timeout: branch.timeout(),
            institution_id: branch.institution_id.clone(),
            tls: branch.tls,
            tls_verify: branch.tls_verify,
            checksum_required: branch.checksum_required(),
        }
    }
}

type PendingSender = oneshot::Sender<Result<String, GatewayError>>;

/// Pending requests keyed by sequence number, plus the round-robin cursor
/// for allocation.
#[derive(Debug, Default)]
struct PendingTable {
    entries: HashMap<u8, PendingSender>,
    cursor: u8,
}

impl PendingTable {
    /// Allocates the next free sequence number, scanning ten candidates from
    /// the cursor.
    fn allocate(&mut self) -> Result<u8, GatewayError> {
        for offset in 0..10 {
            let candidate = (self.cursor + offset) % 10;
            if !self.entries.contains_key(&candidate) {
                self.cursor = (candidate + 1) % 10;
                return Ok(candidate);
            }
        }
        Err(GatewayError::ClientAtCapacity)
    }
}

/// State shared between the client handle and its reader task.
struct Shared {
    pending: StdMutex<PendingTable>,
    /// Bumped on every teardown so a stale reader cannot fail requests that
    /// belong to a newer connection.
    generation: AtomicU64,
    checksum_required: bool,
    branch_id: String,
    events: Arc<EventBus>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending(&self, seq: u8) -> Option<PendingSender> {
        self.lock_pending().entries.remove(&seq)
    }

    /// Rejects every pending request. Runs when the socket closes or errors.
    fn fail_all_pending(&self, error: &GatewayError) {
        let entries: Vec<PendingSender> = {
            let mut pending = self.lock_pending();
            pending.entries.drain().map(|(_, tx)| tx).collect()
        };
        for tx in entries {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Routes one reassembled frame to its pending request.
    fn handle_message(&self, message: &str) {
        let verified = matches!(checksum::verify(message), Ok(true));

        if !verified {
            if self.checksum_required {
                self.events.log_to_dashboard(
                    DashboardLevel::Error,
                    "SIP2 checksum verification failed",
                    json!({"branch": self.branch_id, "raw": message}),
                );
                if let Some(seq) = parser::extract_sequence(message) {
                    if let Some(tx) = self.take_pending(seq) {
                        let _ = tx.send(Err(GatewayError::ChecksumMismatch));
                        return;
                    }
                }
                warn!(
                    branch = %self.branch_id,
                    "unverifiable frame matched no pending request, discarding"
                );
                return;
            }
            self.events.log_to_dashboard(
                DashboardLevel::Warn,
                "SIP2 checksum mismatch tolerated",
                json!({"branch": self.branch_id, "raw": message}),
            );
        }

        match parser::extract_sequence(message) {
            Some(seq) => {
                if let Some(tx) = self.take_pending(seq) {
                    let _ = tx.send(Ok(message.to_string()));
                } else {
                    warn!(
                        branch = %self.branch_id,
                        seq,
                        "response carries a sequence with no pending request, discarding"
                    );
                }
            }
            None => {
                // Legacy systems may omit the trailer. With exactly one
                // request outstanding the answer is unambiguous; with more
                // than one, delivering to the wrong caller would be a
                // correctness violation, so the frame is dropped.
                let tx = {
                    let mut pending = self.lock_pending();
                    match pending.entries.len() {
                        1 => {
                            let seq = *pending
                                .entries
                                .keys()
                                .next()
                                .expect("len checked above");
                            pending.entries.remove(&seq)
                        }
                        0 => {
                            debug!(
                                branch = %self.branch_id,
                                "unsolicited frame with no pending requests, discarding"
                            );
                            None
                        }
                        n => {
                            error!(
                                branch = %self.branch_id,
                                pending = n,
                                "untagged frame while multiple requests pending, discarding"
                            );
                            None
                        }
                    }
                };
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(message.to_string()));
                }
            }
        }
    }
}

/// Write half of a plain or TLS socket.
enum SipWriter {
    Plain(OwnedWriteHalf),
    Tls(WriteHalf<TlsStream<TcpStream>>),
}

impl SipWriter {
    async fn write_all_flush(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => {
                w.write_all(bytes).await?;
                w.flush().await
            }
            Self::Tls(w) => {
                w.write_all(bytes).await?;
                w.flush().await
            }
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.shutdown().await,
            Self::Tls(w) => w.shutdown().await,
        }
    }
}

/// One live connection: the write half, the reader task, and a liveness
/// flag the reader clears on exit.
struct Connection {
    writer: SipWriter,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

/// SIP2 client for a single branch.
pub struct SipClient {
    config: SipClientConfig,
    shared: Arc<Shared>,
    conn: Mutex<Option<Connection>>,
}

impl SipClient {
    /// Creates a disconnected client. The socket is opened lazily on first
    /// use and re-opened after any teardown.
    #[must_use]
    pub fn new(config: SipClientConfig, events: Arc<EventBus>) -> Self {
        let shared = Arc::new(Shared {
            pending: StdMutex::new(PendingTable::default()),
            generation: AtomicU64::new(0),
            checksum_required: config.checksum_required,
            branch_id: config.branch_id.clone(),
            events,
        });
        Self {
            config,
            shared,
            conn: Mutex::new(None),
        }
    }

    /// The configuration snapshot this client runs with.
    #[must_use]
    pub fn config(&self) -> &SipClientConfig {
        &self.config
    }

    /// Ensures a live connection, dialing if necessary. Idempotent: an
    /// already-connected client returns immediately.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectTimeout`] when the TCP or TLS handshake does
    /// not finish in time, [`GatewayError::ConnectFailed`] on refusal.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if conn.alive.load(Ordering::Acquire) {
                return Ok(());
            }
        }
        // A dead connection may still hold remnants; clear them first.
        Self::teardown(&self.shared, &mut guard, "stale connection replaced").await;

        let host = self.config.host.clone();
        let port = self.config.port;
        let timeout = self.config.timeout;

        debug!(branch = %self.config.branch_id, %host, port, "connecting to LMS");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| GatewayError::ConnectTimeout {
                host: host.clone(),
                port,
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| GatewayError::ConnectFailed {
                host: host.clone(),
                port,
                reason: e.to_string(),
            })?;
        let _ = stream.set_nodelay(true);

        let alive = Arc::new(AtomicBool::new(true));
        let generation = self.shared.generation.load(Ordering::Acquire);

        let connection = if self.config.tls {
            let connector = tls_connector(self.config.tls_verify);
            let server_name = rustls::pki_types::ServerName::try_from(host.clone()).map_err(
                |e| GatewayError::ConnectFailed {
                    host: host.clone(),
                    port,
                    reason: format!("invalid TLS server name: {e}"),
                },
            )?;
            let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, stream))
                .await
                .map_err(|_| GatewayError::ConnectTimeout {
                    host: host.clone(),
                    port,
                    timeout_ms: timeout.as_millis() as u64,
                })?
                .map_err(|e| GatewayError::ConnectFailed {
                    host: host.clone(),
                    port,
                    reason: e.to_string(),
                })?;
            let (read_half, write_half) = tokio::io::split(tls_stream);
            let reader = tokio::spawn(run_reader(
                read_half,
                self.shared.clone(),
                generation,
                alive.clone(),
            ));
            Connection {
                writer: SipWriter::Tls(write_half),
                reader,
                alive,
            }
        } else {
            let (read_half, write_half) = stream.into_split();
            let reader = tokio::spawn(run_reader(
                read_half,
                self.shared.clone(),
                generation,
                alive.clone(),
            ));
            Connection {
                writer: SipWriter::Plain(write_half),
                reader,
                alive,
            }
        };

        *guard = Some(connection);
        Ok(())
    }

    /// Destroys the socket if present. Pending requests are rejected by the
    /// close handling this triggers, not here.
    pub async fn disconnect(&self) {
        let mut guard = self.conn.lock().await;
        Self::teardown(&self.shared, &mut guard, "connection closed locally").await;
    }

    /// Tears down a connection slot: bumps the generation (fencing the old
    /// reader), stops it, closes the writer, and rejects all pending
    /// requests on its behalf.
    async fn teardown(shared: &Arc<Shared>, slot: &mut Option<Connection>, reason: &str) {
        if let Some(mut conn) = slot.take() {
            shared.generation.fetch_add(1, Ordering::AcqRel);
            conn.reader.abort();
            let _ = conn.writer.shutdown().await;
            shared.fail_all_pending(&GatewayError::SocketClosed {
                reason: reason.to_string(),
            });
        }
    }

    /// Allocates a free sequence number for the next request.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ClientAtCapacity`] when all ten are in flight.
    pub fn allocate_sequence(&self) -> Result<u8, GatewayError> {
        self.shared.lock_pending().allocate()
    }

    /// Sends one frame and awaits the response correlated by `seq`.
    ///
    /// Installs the pending entry, emits a redacted dashboard event,
    /// transliterates the frame to ASCII, and writes it. A response, a
    /// checksum rejection, a socket close, or the timeout resolves the
    /// entry — exactly one of them. On timeout the socket is destroyed so
    /// the next call starts fresh.
    ///
    /// # Errors
    ///
    /// [`GatewayError::SequenceInUse`] when `seq` is already pending, plus
    /// every connect/transport failure.
    pub async fn send_raw(&self, frame: &str, seq: u8) -> Result<String, GatewayError> {
        self.connect().await?;

        let rx = {
            let mut pending = self.shared.lock_pending();
            if pending.entries.contains_key(&seq) {
                return Err(GatewayError::SequenceInUse { seq });
            }
            let (tx, rx) = oneshot::channel();
            pending.entries.insert(seq, tx);
            rx
        };

        // Transliterate first so the dashboard event shows the exact bytes
        // that go out on the wire.
        let wire = to_ascii(frame);
        self.shared.events.log_to_dashboard(
            DashboardLevel::Debug,
            "SIP2 request",
            json!({"branch": self.config.branch_id, "seq": seq, "raw": &wire}),
        );

        if let Err(e) = self.write_frame(wire.as_bytes()).await {
            self.shared.take_pending(seq);
            self.disconnect().await;
            return Err(GatewayError::SocketClosed {
                reason: e.to_string(),
            });
        }

        match tokio::time::timeout(self.config.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::SocketClosed {
                reason: "connection closed".to_string(),
            }),
            Err(_) => {
                self.shared.take_pending(seq);
                // Force fresh connection setup on the next call; siblings
                // are rejected by the teardown.
                self.disconnect().await;
                Err(GatewayError::RequestTimeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn write_frame(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut guard = self.conn.lock().await;
        match guard.as_mut() {
            Some(conn) => conn.writer.write_all_flush(bytes).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no live connection",
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // High-level operations, one per SIP2 command
    // ─────────────────────────────────────────────────────────────────────

    /// `93` Login. Always uses sequence 0: the handshake runs on a fresh
    /// connection before any other traffic. Returns the raw response frame;
    /// the manager checks for the `941` acknowledgement.
    pub async fn login(
        &self,
        user: &str,
        password: &str,
        location: &str,
    ) -> Result<String, GatewayError> {
        let frame = formatter::login(user, password, location, 0)?;
        self.send_raw(&frame, 0).await
    }

    /// `23` Patron Status.
    pub async fn patron_status(
        &self,
        barcode: &str,
        language: Option<&str>,
    ) -> Result<PatronStatusRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::patron_status(
            &self.config.institution_id,
            barcode,
            language,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_patron_status(&raw)?)
    }

    /// `11` Checkout.
    pub async fn checkout(
        &self,
        patron_barcode: &str,
        item_barcode: &str,
        patron_pin: Option<&str>,
    ) -> Result<CheckoutRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::checkout(
            &self.config.institution_id,
            patron_barcode,
            item_barcode,
            patron_pin,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_checkout(&raw)?)
    }

    /// `09` Checkin.
    pub async fn checkin(&self, item_barcode: &str) -> Result<CheckinRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame =
            formatter::checkin(&self.config.institution_id, item_barcode, Utc::now(), seq)?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_checkin(&raw)?)
    }

    /// `17` Item Information.
    pub async fn item_information(
        &self,
        item_barcode: &str,
    ) -> Result<ItemInfoRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::item_information(
            &self.config.institution_id,
            item_barcode,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_item_information(&raw)?)
    }

    /// `29` Renew. The response shares the Checkout record shape.
    pub async fn renew(
        &self,
        patron_barcode: &str,
        item_barcode: &str,
        patron_pin: Option<&str>,
    ) -> Result<CheckoutRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::renew(
            &self.config.institution_id,
            patron_barcode,
            item_barcode,
            patron_pin,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_renew(&raw)?)
    }

    /// `37` Fee Paid.
    pub async fn fee_paid(
        &self,
        patron_barcode: &str,
        fee_id: &str,
        amount: &str,
        fee_type: Option<&str>,
        payment_type: Option<&str>,
        currency: Option<&str>,
    ) -> Result<FeePaidRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::fee_paid(
            &self.config.institution_id,
            patron_barcode,
            fee_id,
            amount,
            fee_type,
            payment_type,
            currency,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_fee_paid(&raw)?)
    }

    /// `63` Patron Information.
    pub async fn patron_information(
        &self,
        patron_barcode: &str,
        summary: PatronInfoSummary,
        start_item: Option<u16>,
        end_item: Option<u16>,
        language: Option<&str>,
    ) -> Result<PatronInfoRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::patron_information(
            &self.config.institution_id,
            patron_barcode,
            summary,
            start_item,
            end_item,
            language,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_patron_information(&raw)?)
    }

    /// `15` Hold.
    #[allow(clippy::too_many_arguments)]
    pub async fn hold(
        &self,
        patron_barcode: &str,
        mode: HoldMode,
        item_barcode: Option<&str>,
        title_id: Option<&str>,
        pickup_location: Option<&str>,
        expiry_date: Option<&str>,
    ) -> Result<HoldRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::hold(
            &self.config.institution_id,
            patron_barcode,
            mode,
            item_barcode,
            title_id,
            pickup_location,
            expiry_date,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_hold(&raw)?)
    }

    /// `65` Renew All.
    pub async fn renew_all(&self, patron_barcode: &str) -> Result<RenewAllRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame =
            formatter::renew_all(&self.config.institution_id, patron_barcode, Utc::now(), seq)?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_renew_all(&raw)?)
    }

    /// `35` End Session.
    pub async fn end_session(
        &self,
        patron_barcode: &str,
    ) -> Result<EndSessionRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame =
            formatter::end_session(&self.config.institution_id, patron_barcode, Utc::now(), seq)?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_end_session(&raw)?)
    }

    /// `99` SC Status.
    pub async fn sc_status(&self) -> Result<AcsStatusRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::sc_status(seq)?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_acs_status(&raw)?)
    }

    /// `01` Block Patron. SIP2 defines no response for this command: the
    /// frame is written without a pending entry and the call returns as soon
    /// as the bytes are out. Whether the LMS honored it is unobservable.
    pub async fn block_patron(
        &self,
        patron_barcode: &str,
        card_retained: bool,
        message: &str,
    ) -> Result<(), GatewayError> {
        self.connect().await?;
        let seq = self.allocate_sequence()?;
        let frame = formatter::block_patron(
            &self.config.institution_id,
            patron_barcode,
            card_retained,
            message,
            Utc::now(),
            seq,
        )?;

        let wire = to_ascii(&frame);
        self.shared.events.log_to_dashboard(
            DashboardLevel::Debug,
            "SIP2 request",
            json!({"branch": self.config.branch_id, "seq": seq, "raw": &wire}),
        );

        if let Err(e) = self.write_frame(wire.as_bytes()).await {
            self.disconnect().await;
            return Err(GatewayError::SocketClosed {
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// `19` Item Status Update.
    pub async fn item_status_update(
        &self,
        item_barcode: &str,
        marker: SecurityMarker,
    ) -> Result<ItemStatusUpdateRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::item_status_update(
            &self.config.institution_id,
            item_barcode,
            marker,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_item_status_update(&raw)?)
    }

    /// `25` Patron Enable. The response shares the Patron Status shape.
    pub async fn patron_enable(
        &self,
        patron_barcode: &str,
        patron_pin: Option<&str>,
    ) -> Result<PatronStatusRecord, GatewayError> {
        let seq = self.allocate_sequence()?;
        let frame = formatter::patron_enable(
            &self.config.institution_id,
            patron_barcode,
            patron_pin,
            Utc::now(),
            seq,
        )?;
        let raw = self.send_raw(&frame, seq).await?;
        Ok(parser::parse_patron_enable(&raw)?)
    }
}

/// Reader task: reassembles `\r`-terminated frames and dispatches them.
///
/// Bound to one connection generation; on exit it rejects pending requests
/// only if its connection is still the current one (a teardown has not
/// already done so).
async fn run_reader<R>(mut reader: R, shared: Arc<Shared>, generation: u64, alive: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut buffer = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let reason = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break "connection closed by peer".to_string(),
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buffer.iter().position(|&b| b == b'\r') {
                    let raw = buffer.split_to(pos + 1);
                    // ISO-8859-1: each byte maps 1:1 to the same code point.
                    let message: String = raw.iter().map(|&b| b as char).collect();
                    let message = message
                        .strip_prefix('\n')
                        .unwrap_or(&message)
                        .trim_start();
                    if message.is_empty() {
                        continue;
                    }
                    shared.handle_message(message.trim_end_matches('\r'));
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    alive.store(false, Ordering::Release);
    if shared.generation.load(Ordering::Acquire) == generation {
        debug!(branch = %shared.branch_id, %reason, "LMS connection ended");
        shared.fail_all_pending(&GatewayError::SocketClosed { reason });
    }
}

/// Builds a TLS connector. Strict validation uses the bundled webpki roots;
/// only an explicit opt-out installs the accept-anything verifier for
/// self-signed LMS certificates.
fn tls_connector(verify: bool) -> TlsConnector {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = if verify {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
            .with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

/// Certificate verifier that accepts any chain. Signature verification is
/// still delegated to the real provider so the handshake itself stays
/// well-formed.
#[derive(Debug)]
struct NoVerification {
    provider: rustls::crypto::CryptoProvider,
}

impl NoVerification {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_allocation_round_robin() {
        let mut table = PendingTable::default();
        assert_eq!(table.allocate().unwrap(), 0);
        assert_eq!(table.allocate().unwrap(), 1);
        // Allocation without installation does not reserve: cursor advances
        // but freed numbers become reusable after wraparound.
        assert_eq!(table.allocate().unwrap(), 2);
    }

    #[test]
    fn test_sequence_allocation_skips_pending() {
        let mut table = PendingTable::default();
        for seq in [0u8, 1, 2] {
            let (tx, _rx) = oneshot::channel();
            table.entries.insert(seq, tx);
        }
        assert_eq!(table.allocate().unwrap(), 3);

        // Occupy everything except 7.
        for seq in [3u8, 4, 5, 6, 8, 9] {
            let (tx, _rx) = oneshot::channel();
            table.entries.insert(seq, tx);
        }
        assert_eq!(table.allocate().unwrap(), 7);
    }

    #[test]
    fn test_sequence_allocation_at_capacity() {
        let mut table = PendingTable::default();
        for seq in 0..10u8 {
            let (tx, _rx) = oneshot::channel();
            table.entries.insert(seq, tx);
        }
        assert_eq!(table.allocate(), Err(GatewayError::ClientAtCapacity));
    }

    #[test]
    fn test_pending_table_never_exceeds_ten() {
        let mut table = PendingTable::default();
        for _ in 0..50 {
            if let Ok(seq) = table.allocate() {
                let (tx, _rx) = oneshot::channel();
                table.entries.insert(seq, tx);
            }
        }
        assert_eq!(table.entries.len(), 10);
        assert!(table.entries.keys().all(|&s| s <= 9));
    }
}
