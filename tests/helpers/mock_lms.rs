//! Scriptable mock LMS for integration testing.
//!
//! Listens on an ephemeral TCP port and answers SIP2 request frames with
//! preconfigured response bodies, echoing the request's sequence number into
//! the trailer. Faults are opt-in per server: corrupt checksums, omitted
//! trailers, fragmented writes, delays, silence, and coalesced writes for
//! pipelining tests.
//!
//! Note: some knobs are provided for future test expansion and may not be
//! used by every test binary.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use sip2gate::protocol::checksum;

/// Default login acknowledgement body.
const LOGIN_OK: &str = "941";

/// A configurable mock LMS.
#[derive(Debug, Clone)]
pub struct MockLms {
    /// Response bodies (without trailer) keyed by request command code.
    responses: HashMap<String, String>,
    /// Body returned for Login (`93`) requests.
    login_response: String,
    /// Replace the computed checksum with `0000`.
    corrupt_checksum: bool,
    /// Send responses without any `AY…AZ` trailer.
    omit_trailer: bool,
    /// Request codes that never get an answer.
    silent: HashSet<String>,
    /// Write responses in chunks of this many bytes with small pauses.
    fragment_size: Option<usize>,
    /// Pause before answering each request.
    response_delay: Option<Duration>,
    /// Hold the first response until a second request arrives, then write
    /// both in a single syscall.
    coalesce_pairs: bool,
}

impl MockLms {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            login_response: LOGIN_OK.to_string(),
            corrupt_checksum: false,
            omit_trailer: false,
            silent: HashSet::new(),
            fragment_size: None,
            response_delay: None,
            coalesce_pairs: false,
        }
    }

    /// Sets the response body (without trailer) for a request code.
    #[must_use]
    pub fn with_response(mut self, request_code: &str, body: &str) -> Self {
        self.responses
            .insert(request_code.to_string(), body.to_string());
        self
    }

    #[must_use]
    pub fn with_login_response(mut self, body: &str) -> Self {
        self.login_response = body.to_string();
        self
    }

    #[must_use]
    pub fn with_corrupt_checksum(mut self) -> Self {
        self.corrupt_checksum = true;
        self
    }

    #[must_use]
    pub fn with_omitted_trailer(mut self) -> Self {
        self.omit_trailer = true;
        self
    }

    /// The given request code is read but never answered.
    #[must_use]
    pub fn with_silence(mut self, request_code: &str) -> Self {
        self.silent.insert(request_code.to_string());
        self
    }

    #[must_use]
    pub fn with_fragmentation(mut self, chunk_bytes: usize) -> Self {
        self.fragment_size = Some(chunk_bytes);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_coalesced_pairs(mut self) -> Self {
        self.coalesce_pairs = true;
        self
    }

    /// Binds an ephemeral port and starts serving.
    pub async fn start(self) -> MockLmsHandle {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock LMS");
        let addr = listener.local_addr().expect("mock LMS addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_for_task = received.clone();
        let config = Arc::new(self);

        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let config = config.clone();
                let received = received_for_task.clone();
                tokio::spawn(async move {
                    serve_connection(socket, config, received).await;
                });
            }
        });

        MockLmsHandle {
            addr,
            received,
            task,
        }
    }
}

/// A running mock LMS.
pub struct MockLmsHandle {
    pub addr: SocketAddr,
    /// Every request frame received, in arrival order, across connections.
    pub received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockLmsHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn received_frames(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }
}

impl Drop for MockLmsHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    config: Arc<MockLms>,
    received: Arc<Mutex<Vec<String>>>,
) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut held_response: Option<Vec<u8>> = None;

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\r') {
            let frame_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            let frame: String = frame_bytes.iter().map(|&b| b as char).collect();
            let frame = frame.trim_end_matches('\r').to_string();
            if frame.is_empty() {
                continue;
            }
            received.lock().await.push(frame.clone());

            let code: String = frame.chars().take(2).collect();
            if config.silent.contains(&code) {
                continue;
            }
            let Some(response) = config.render_response(&code, &frame) else {
                continue;
            };

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }

            if config.coalesce_pairs {
                match held_response.take() {
                    None => held_response = Some(response),
                    Some(mut first) => {
                        first.extend_from_slice(&response);
                        write_response(&mut socket, &first, None).await;
                    }
                }
            } else {
                write_response(&mut socket, &response, config.fragment_size).await;
            }
        }
    }
}

impl MockLms {
    /// Builds the wire bytes for one response, echoing the request sequence.
    fn render_response(&self, code: &str, request: &str) -> Option<Vec<u8>> {
        let body = if code == "93" {
            self.login_response.clone()
        } else {
            self.responses.get(code)?.clone()
        };
        let seq = extract_request_sequence(request).unwrap_or(0);

        let frame = if self.omit_trailer {
            format!("{body}\r")
        } else if self.corrupt_checksum {
            format!("{body}AY{seq}AZ0000\r")
        } else {
            checksum::append(&body, seq).expect("mock trailer")
        };
        // ISO-8859-1 on the wire: one byte per char.
        Some(frame.chars().map(|c| c as u8).collect())
    }
}

async fn write_response(socket: &mut TcpStream, bytes: &[u8], fragment: Option<usize>) {
    match fragment {
        None => {
            let _ = socket.write_all(bytes).await;
            let _ = socket.flush().await;
        }
        Some(size) => {
            for piece in bytes.chunks(size.max(1)) {
                let _ = socket.write_all(piece).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
    }
}

fn extract_request_sequence(frame: &str) -> Option<u8> {
    let idx = frame.rfind("AY")?;
    frame[idx + 2..].chars().next()?.to_digit(10).map(|d| d as u8)
}
